// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-(user, domain) watermarks.
//!
//! A watermark is never stored on its own: it is the maximum `updated_at`
//! among the records already committed for that pair. Since a batch commits
//! atomically, the watermark can only move once the records behind it are
//! durable, and it can never move backwards.

use crate::db::SqliteDb;
use crate::error::SyncResult;
use crate::models::Domain;
use crate::time_utils::EPOCH_ZERO;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    db: SqliteDb,
    bootstrap_lookback: Option<Duration>,
}

impl WatermarkTracker {
    pub fn new(db: SqliteDb, bootstrap_lookback: Option<Duration>) -> Self {
        Self {
            db,
            bootstrap_lookback,
        }
    }

    /// Latest committed `updated_at` for the pair, or epoch zero if nothing
    /// has been stored yet.
    pub async fn current(&self, user_id: &str, domain: Domain) -> SyncResult<DateTime<Utc>> {
        Ok(self
            .db
            .max_updated_at(user_id, domain)
            .await?
            .unwrap_or(EPOCH_ZERO))
    }

    /// Where the next fetch for the pair begins.
    ///
    /// Same as `current`, except that an empty pair starts `bootstrap_lookback`
    /// before `now` when a lookback is configured.
    pub async fn fetch_start(
        &self,
        user_id: &str,
        domain: Domain,
        now: DateTime<Utc>,
    ) -> SyncResult<DateTime<Utc>> {
        match (self.db.max_updated_at(user_id, domain).await?, self.bootstrap_lookback) {
            (Some(stored), _) => Ok(stored),
            (None, Some(lookback)) => Ok(now
                .checked_sub_signed(lookback)
                .map_or(EPOCH_ZERO, |start| start.max(EPOCH_ZERO))),
            (None, None) => Ok(EPOCH_ZERO),
        }
    }

    /// Every domain's stored watermark for a user (`None` when empty).
    pub async fn all(&self, user_id: &str) -> SyncResult<Vec<(Domain, Option<DateTime<Utc>>)>> {
        let mut marks = Vec::with_capacity(Domain::ALL.len());
        for domain in Domain::ALL {
            marks.push((domain, self.db.max_updated_at(user_id, domain).await?));
        }
        Ok(marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use serde_json::json;

    fn record(id: &str, secs: i64) -> Record {
        Record {
            id: id.to_string(),
            updated_at: DateTime::from_timestamp(secs, 0).unwrap(),
            payload: json!({"id": id}),
        }
    }

    #[tokio::test]
    async fn test_empty_pair_starts_at_epoch_zero() {
        let db = SqliteDb::in_memory().await.unwrap();
        let tracker = WatermarkTracker::new(db, None);

        assert_eq!(tracker.current("u1", Domain::Cycle).await.unwrap(), EPOCH_ZERO);
        assert_eq!(
            tracker.fetch_start("u1", Domain::Cycle, Utc::now()).await.unwrap(),
            EPOCH_ZERO
        );
    }

    #[tokio::test]
    async fn test_watermark_is_max_committed_updated_at() {
        let db = SqliteDb::in_memory().await.unwrap();
        db.upsert("u1", Domain::Sleep, &[record("a", 300), record("b", 900), record("c", 600)])
            .await
            .unwrap();
        let tracker = WatermarkTracker::new(db, None);

        assert_eq!(
            tracker.current("u1", Domain::Sleep).await.unwrap(),
            DateTime::from_timestamp(900, 0).unwrap()
        );
        // Other users and domains are untouched.
        assert_eq!(tracker.current("u2", Domain::Sleep).await.unwrap(), EPOCH_ZERO);
        assert_eq!(tracker.current("u1", Domain::Cycle).await.unwrap(), EPOCH_ZERO);
    }

    #[tokio::test]
    async fn test_bootstrap_lookback_only_applies_to_empty_pairs() {
        let db = SqliteDb::in_memory().await.unwrap();
        db.upsert("u1", Domain::Workout, &[record("w", 100)])
            .await
            .unwrap();
        let tracker = WatermarkTracker::new(db, Some(Duration::days(30)));
        let now = DateTime::from_timestamp(100 * 86_400, 0).unwrap();

        assert_eq!(
            tracker.fetch_start("u1", Domain::Cycle, now).await.unwrap(),
            now - Duration::days(30)
        );
        assert_eq!(
            tracker.fetch_start("u1", Domain::Workout, now).await.unwrap(),
            DateTime::from_timestamp(100, 0).unwrap()
        );
    }
}
