// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Repeats sync cycles until shutdown.

use crate::models::CycleSummary;
use crate::services::orchestrator::cancelled;
use crate::services::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Latest cycle summary, shared with the status server.
pub type SharedSummary = Arc<RwLock<Option<CycleSummary>>>;

pub struct Scheduler {
    orchestrator: SyncOrchestrator,
    interval: Duration,
    last_summary: SharedSummary,
}

impl Scheduler {
    pub fn new(orchestrator: SyncOrchestrator, interval: Duration, last_summary: SharedSummary) -> Self {
        Self {
            orchestrator,
            interval,
            last_summary,
        }
    }

    /// Run cycles every `interval` until `shutdown` flips to true.
    ///
    /// A cycle that leaves a pair behind is followed immediately by the next
    /// one. Shutdown during a cycle cancels its in-flight pairs.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let summary = self.orchestrator.run_cycle(&shutdown).await;
            let backlog = summary.has_backlog();
            *self.last_summary.write().await = Some(summary);

            if *shutdown.borrow() {
                break;
            }
            if backlog {
                tracing::info!("Pairs still behind, starting next cycle immediately");
                continue;
            }

            tokio::select! {
                _ = cancelled(shutdown.clone()) => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }
}
