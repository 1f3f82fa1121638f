// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-cycle sync reports.

use crate::models::Domain;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How one (user, domain) pair ended a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairOutcome {
    /// Fetched through `now`.
    CaughtUp,
    /// Still lagging after the per-cycle window budget; retried next cycle.
    Behind,
    /// A call or batch failed; the watermark stayed where the last commit left it.
    Failed { kind: String, message: String },
    /// Shutdown interrupted the pair.
    Cancelled,
}

/// Result of syncing one (user, domain) pair in one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub user_id: String,
    pub domain: Domain,
    pub outcome: PairOutcome,
    /// Rows inserted or overwritten
    pub records_written: u64,
    /// Fetch windows completed (profile counts as one)
    pub windows: u32,
}

/// Summary of a whole sync cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub behind: usize,
    pub cancelled: usize,
    pub records_written: u64,
    /// Set when the cycle stopped early on a fatal condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub pairs: Vec<PairReport>,
}

impl CycleSummary {
    /// Tally pair reports into a summary.
    pub fn from_reports(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        users: usize,
        pairs: Vec<PairReport>,
    ) -> Self {
        let mut summary = Self::empty(started_at, finished_at, users);
        for report in &pairs {
            summary.records_written += report.records_written;
            match report.outcome {
                PairOutcome::CaughtUp => summary.succeeded += 1,
                PairOutcome::Behind => {
                    summary.succeeded += 1;
                    summary.behind += 1;
                }
                PairOutcome::Failed { .. } => summary.failed += 1,
                PairOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary.pairs = pairs;
        summary
    }

    /// A cycle that stopped before syncing anything.
    pub fn aborted(started_at: DateTime<Utc>, finished_at: DateTime<Utc>, reason: String) -> Self {
        let mut summary = Self::empty(started_at, finished_at, 0);
        summary.aborted = Some(reason);
        summary
    }

    fn empty(started_at: DateTime<Utc>, finished_at: DateTime<Utc>, users: usize) -> Self {
        Self {
            started_at,
            finished_at,
            users,
            succeeded: 0,
            failed: 0,
            behind: 0,
            cancelled: 0,
            records_written: 0,
            aborted: None,
            pairs: Vec::new(),
        }
    }

    /// Whether any pair still has backlog to fetch.
    pub fn has_backlog(&self) -> bool {
        self.behind > 0
    }

    /// Report for a specific pair, if it ran.
    pub fn pair(&self, user_id: &str, domain: Domain) -> Option<&PairReport> {
        self.pairs
            .iter()
            .find(|p| p.user_id == user_id && p.domain == domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(domain: Domain, outcome: PairOutcome, written: u64) -> PairReport {
        PairReport {
            user_id: "u1".to_string(),
            domain,
            outcome,
            records_written: written,
            windows: 1,
        }
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let summary = CycleSummary::from_reports(
            now,
            now,
            1,
            vec![
                report(Domain::Cycle, PairOutcome::CaughtUp, 3),
                report(Domain::Sleep, PairOutcome::Behind, 25),
                report(
                    Domain::Workout,
                    PairOutcome::Failed {
                        kind: "rate_limited".to_string(),
                        message: "429".to_string(),
                    },
                    0,
                ),
                report(Domain::Recovery, PairOutcome::Cancelled, 0),
            ],
        );

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.behind, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.records_written, 28);
        assert!(summary.has_backlog());
        assert_eq!(
            summary.pair("u1", Domain::Sleep).map(|p| p.records_written),
            Some(25)
        );
    }
}
