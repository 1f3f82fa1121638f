// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync cycle orchestration.
//!
//! One cycle syncs every (user, domain) pair. Pairs run concurrently up to a
//! configured limit and are fully isolated: a pair's failure is recorded in
//! its report and never stops its siblings.
//!
//! Per pair, the cycle walks fetch windows forward from the stored watermark:
//!
//! ```text
//! Pending -> Fetching -> Upserting -> CaughtUp
//!                     -> Upserting -> Behind -> Fetching ...
//!         -> Failed
//! ```
//!
//! Each window's pages are accumulated and upserted as one batch, so the
//! watermark only moves past records that were durably written.
//!
//! Empty windows never move the watermark, so a pair that ends a cycle
//! `Behind` keeps an in-memory resume point at its next window's start.

use crate::config::Config;
use crate::db::SqliteDb;
use crate::error::{SyncError, SyncResult};
use crate::models::{CycleSummary, Domain, PairOutcome, PairReport, Record, Window};
use crate::services::{TokenRefresher, TokenStore, WatermarkTracker, WhoopClient, WhoopService};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;

/// Start of the next uncommitted window per (user, domain), for pairs left behind.
type ResumePoints = Arc<DashMap<(String, Domain), DateTime<Utc>>>;

/// Engine settings taken from `Config`.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Users to sync; empty means every user with an active token
    pub user_ids: Vec<String>,
    pub max_data_range: Duration,
    pub max_concurrent_pairs: usize,
    /// Zero means no cap
    pub max_windows_per_cycle: u32,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_ids: config.user_ids.clone(),
            max_data_range: config.max_data_range,
            max_concurrent_pairs: config.max_concurrent_pairs.max(1),
            max_windows_per_cycle: config.max_windows_per_cycle,
        }
    }
}

/// Progress of one pair, kept outside the pair future so a cancelled pair
/// still reports what it committed.
#[derive(Debug, Default)]
struct PairProgress {
    records_written: u64,
    windows: u32,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    db: SqliteDb,
    whoop: WhoopService,
    watermarks: WatermarkTracker,
    refresher: TokenRefresher,
    settings: SyncSettings,
    resume: ResumePoints,
}

impl SyncOrchestrator {
    pub fn new(
        db: SqliteDb,
        whoop: WhoopService,
        watermarks: WatermarkTracker,
        refresher: TokenRefresher,
        settings: SyncSettings,
    ) -> Self {
        Self {
            db,
            whoop,
            watermarks,
            refresher,
            settings,
            resume: Arc::new(DashMap::new()),
        }
    }

    /// Wire the whole engine from configuration over an open store.
    pub fn from_config(config: &Config, db: SqliteDb) -> anyhow::Result<Self> {
        let client = WhoopClient::from_config(config)?;
        let tokens = TokenStore::new(client.clone(), db.clone(), config.retry.clone());
        let whoop = WhoopService::new(client, tokens.clone(), config.retry.clone());
        let watermarks = WatermarkTracker::new(db.clone(), config.bootstrap_lookback);
        let refresher = TokenRefresher::new(db.clone(), tokens, config.token_refresh_buffer);

        Ok(Self::new(
            db,
            whoop,
            watermarks,
            refresher,
            SyncSettings::from_config(config),
        ))
    }

    pub fn tokens(&self) -> &TokenStore {
        self.whoop.tokens()
    }

    pub fn watermarks(&self) -> &WatermarkTracker {
        &self.watermarks
    }

    /// Run one full cycle against the current time.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleSummary {
        self.run_cycle_at(Utc::now(), shutdown).await
    }

    /// Run one full cycle, fetching windows up to `now`.
    pub async fn run_cycle_at(
        &self,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> CycleSummary {
        let started_at = Utc::now();

        if let Err(e) = self.db.ping().await {
            tracing::error!(error = %e, "Store unreachable, aborting sync cycle");
            return CycleSummary::aborted(started_at, Utc::now(), e.to_string());
        }

        if let Err(e) = self.refresher.run().await {
            tracing::warn!(error = %e, "Token refresh pass failed");
        }

        let users = match self.resolve_users().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "Could not list users, aborting sync cycle");
                return CycleSummary::aborted(started_at, Utc::now(), e.to_string());
            }
        };
        if users.is_empty() {
            tracing::warn!("No users to sync");
        }

        let pairs: Vec<(String, Domain)> = users
            .iter()
            .flat_map(|user_id| Domain::ALL.into_iter().map(move |d| (user_id.clone(), d)))
            .collect();

        tracing::info!(
            users = users.len(),
            pairs = pairs.len(),
            now = %format_utc_rfc3339(now),
            "Starting sync cycle"
        );

        let mut reports: Vec<PairReport> = stream::iter(pairs)
            .map(|(user_id, domain)| {
                let shutdown = shutdown.clone();
                async move { self.run_pair(user_id, domain, now, shutdown).await }
            })
            .buffer_unordered(self.settings.max_concurrent_pairs)
            .collect()
            .await;
        reports.sort_by(|a, b| (&a.user_id, a.domain).cmp(&(&b.user_id, b.domain)));

        let summary = CycleSummary::from_reports(started_at, Utc::now(), users.len(), reports);
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            behind = summary.behind,
            cancelled = summary.cancelled,
            records_written = summary.records_written,
            "Sync cycle complete"
        );
        summary
    }

    async fn resolve_users(&self) -> SyncResult<Vec<String>> {
        if !self.settings.user_ids.is_empty() {
            return Ok(self.settings.user_ids.clone());
        }
        self.db.active_user_ids().await
    }

    /// Sync one pair, racing it against shutdown.
    async fn run_pair(
        &self,
        user_id: String,
        domain: Domain,
        now: DateTime<Utc>,
        shutdown: watch::Receiver<bool>,
    ) -> PairReport {
        let mut progress = PairProgress::default();

        // Dropping the pair future aborts its in-flight request; an open
        // transaction rolls back when dropped.
        let result = tokio::select! {
            biased;
            _ = cancelled(shutdown) => Err(SyncError::Cancelled),
            result = self.sync_pair(&user_id, domain, now, &mut progress) => result,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(SyncError::Cancelled) => {
                tracing::info!(user_id = %user_id, domain = %domain, "Pair cancelled by shutdown");
                PairOutcome::Cancelled
            }
            Err(e) => {
                self.resume.remove(&(user_id.clone(), domain));
                tracing::error!(
                    user_id = %user_id,
                    domain = %domain,
                    kind = e.kind(),
                    error = %e,
                    "Pair sync failed"
                );
                PairOutcome::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        };

        PairReport {
            user_id,
            domain,
            outcome,
            records_written: progress.records_written,
            windows: progress.windows,
        }
    }

    async fn sync_pair(
        &self,
        user_id: &str,
        domain: Domain,
        now: DateTime<Utc>,
        progress: &mut PairProgress,
    ) -> SyncResult<PairOutcome> {
        if !domain.is_ranged() {
            let record = self.whoop.fetch_profile(user_id, Utc::now()).await?;
            progress.records_written += self.db.upsert(user_id, domain, &[record]).await?;
            progress.windows += 1;
            tracing::info!(user_id, domain = %domain, records = progress.records_written, "Profile synced");
            return Ok(PairOutcome::CaughtUp);
        }

        let key = (user_id.to_string(), domain);
        let mut start = self.watermarks.fetch_start(user_id, domain, now).await?;
        if let Some(resume) = self.resume.get(&key).map(|r| *r) {
            start = start.max(resume);
        }
        loop {
            if start >= now {
                break;
            }
            let cap = self.settings.max_windows_per_cycle;
            if cap > 0 && progress.windows >= cap {
                tracing::info!(
                    user_id,
                    domain = %domain,
                    windows = progress.windows,
                    resume_from = %format_utc_rfc3339(start),
                    "Window budget spent, pair still behind"
                );
                return Ok(PairOutcome::Behind);
            }

            let window = Window::clamped(start, now, self.settings.max_data_range);
            tracing::debug!(
                user_id,
                domain = %domain,
                window_start = %format_utc_rfc3339(window.start),
                window_end = %format_utc_rfc3339(window.end),
                "Fetching window"
            );

            let records = self.fetch_window(user_id, domain, window).await?;
            let written = self.db.upsert(user_id, domain, &records).await?;
            progress.records_written += written;
            progress.windows += 1;

            tracing::debug!(
                user_id,
                domain = %domain,
                records = records.len(),
                written,
                "Window committed"
            );

            if !window.is_behind(now) {
                break;
            }
            start = window.end;
            self.resume.insert(key.clone(), start);
        }
        self.resume.remove(&key);

        tracing::info!(
            user_id,
            domain = %domain,
            windows = progress.windows,
            records = progress.records_written,
            "Pair caught up"
        );
        Ok(PairOutcome::CaughtUp)
    }

    /// Fetch every page of one window, in order.
    async fn fetch_window(
        &self,
        user_id: &str,
        domain: Domain,
        window: Window,
    ) -> SyncResult<Vec<Record>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .whoop
                .fetch_page(user_id, domain, window, cursor.as_deref())
                .await?;
            records.extend(page.records);

            match page.next_cursor {
                None => return Ok(records),
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(SyncError::MalformedResponse(format!(
                        "pagination cursor {} repeated",
                        next
                    )));
                }
                Some(next) => cursor = Some(next),
            }
        }
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
pub async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
