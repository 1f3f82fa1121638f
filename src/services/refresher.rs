// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pre-cycle token refresh.
//!
//! Refreshes every active token that expires within the configured buffer so
//! that a cycle rarely starts with a token about to lapse.

use crate::db::SqliteDb;
use crate::error::SyncResult;
use crate::services::TokenStore;
use chrono::{Duration, Utc};
use serde::Serialize;

/// Outcome counts of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct TokenRefresher {
    db: SqliteDb,
    tokens: TokenStore,
    buffer: Duration,
}

impl TokenRefresher {
    pub fn new(db: SqliteDb, tokens: TokenStore, buffer: Duration) -> Self {
        Self { db, tokens, buffer }
    }

    /// Refresh all active tokens expiring within the buffer.
    ///
    /// A failure for one user is logged and counted; it never stops the pass.
    /// Rejected refresh tokens are deactivated by the token store.
    pub async fn run(&self) -> SyncResult<RefreshReport> {
        let mut report = RefreshReport::default();
        if self.buffer <= Duration::zero() {
            return Ok(report);
        }

        let expiring = self
            .db
            .tokens_expiring_before(Utc::now() + self.buffer)
            .await?;

        for token in expiring {
            match self
                .tokens
                .refresh_if_expiring(&token.user_id, self.buffer)
                .await
            {
                Ok(true) => report.refreshed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        user_id = %token.user_id,
                        error = %e,
                        "Pre-cycle token refresh failed"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.refreshed > 0 || report.failed > 0 {
            tracing::info!(
                refreshed = report.refreshed,
                failed = report.failed,
                "Token refresh pass complete"
            );
        }
        Ok(report)
    }
}
