// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite store tests: upsert rule, batch atomicity, tokens, concurrent writers.

use serde_json::json;
use whoop_sync::db::SqliteDb;
use whoop_sync::error::SyncError;
use whoop_sync::models::{Domain, Record};

mod common;
use common::{secs, token, USER};

fn record(id: &str, updated_at: i64, note: &str) -> Record {
    Record {
        id: id.to_string(),
        updated_at: secs(updated_at),
        payload: json!({"id": id, "note": note}),
    }
}

#[tokio::test]
async fn test_upsert_tie_break() {
    let db = SqliteDb::in_memory().await.unwrap();

    assert_eq!(db.upsert(USER, Domain::Sleep, &[record("s1", 100, "first")]).await.unwrap(), 1);

    // Same updated_at: no-op, even with a different payload.
    assert_eq!(db.upsert(USER, Domain::Sleep, &[record("s1", 100, "same-ts")]).await.unwrap(), 0);
    // Older: no-op.
    assert_eq!(db.upsert(USER, Domain::Sleep, &[record("s1", 50, "older")]).await.unwrap(), 0);

    let stored = db.get_record(USER, Domain::Sleep, "s1").await.unwrap().unwrap();
    assert_eq!(stored.payload["note"], "first");
    assert_eq!(stored.updated_at, secs(100));

    // Strictly newer overwrites.
    assert_eq!(db.upsert(USER, Domain::Sleep, &[record("s1", 200, "newer")]).await.unwrap(), 1);
    let stored = db.get_record(USER, Domain::Sleep, "s1").await.unwrap().unwrap();
    assert_eq!(stored.payload["note"], "newer");
    assert_eq!(stored.updated_at, secs(200));
    assert_eq!(db.count_records(USER, Domain::Sleep).await.unwrap(), 1);
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let db = SqliteDb::in_memory().await.unwrap();
    let batch = vec![record("a", 10, "x"), record("b", 20, "y"), record("c", 30, "z")];

    assert_eq!(db.upsert(USER, Domain::Cycle, &batch).await.unwrap(), 3);
    assert_eq!(db.upsert(USER, Domain::Cycle, &batch).await.unwrap(), 0);
    assert_eq!(db.count_records(USER, Domain::Cycle).await.unwrap(), 3);
    assert_eq!(db.max_updated_at(USER, Domain::Cycle).await.unwrap(), Some(secs(30)));
}

#[tokio::test]
async fn test_rows_are_scoped_by_user_and_domain() {
    let db = SqliteDb::in_memory().await.unwrap();

    db.upsert("u1", Domain::Workout, &[record("w1", 100, "u1")]).await.unwrap();
    db.upsert("u2", Domain::Workout, &[record("w1", 50, "u2")]).await.unwrap();
    db.upsert("u1", Domain::Recovery, &[record("w1", 10, "recovery")]).await.unwrap();

    assert_eq!(db.max_updated_at("u1", Domain::Workout).await.unwrap(), Some(secs(100)));
    assert_eq!(db.max_updated_at("u2", Domain::Workout).await.unwrap(), Some(secs(50)));
    assert_eq!(db.max_updated_at("u1", Domain::Recovery).await.unwrap(), Some(secs(10)));
    assert_eq!(db.max_updated_at("u1", Domain::Sleep).await.unwrap(), None);
}

#[tokio::test]
async fn test_failed_batch_commits_nothing() {
    let db = SqliteDb::in_memory().await.unwrap();

    // The pre-epoch record violates the schema's CHECK, after a valid row
    // was already written inside the same transaction.
    let batch = vec![record("good", 500, "ok"), record("bad", -5, "pre-epoch")];
    let err = db.upsert(USER, Domain::Sleep, &batch).await.unwrap_err();
    assert!(matches!(err, SyncError::StorageWrite(_)));
    assert_eq!(err.kind(), "storage_write_failure");

    assert_eq!(db.count_records(USER, Domain::Sleep).await.unwrap(), 0);
    assert_eq!(db.max_updated_at(USER, Domain::Sleep).await.unwrap(), None);
}

#[tokio::test]
async fn test_profile_identical_payload_is_not_rewritten() {
    let db = SqliteDb::in_memory().await.unwrap();
    let profile = |fetched_at: i64, email: &str| Record {
        id: "10129".to_string(),
        updated_at: secs(fetched_at),
        payload: json!({"user_id": 10129, "email": email}),
    };

    assert_eq!(db.upsert(USER, Domain::Profile, &[profile(1_000, "a@b.c")]).await.unwrap(), 1);
    // Later fetch, same body: no write, watermark stays at the first fetch.
    assert_eq!(db.upsert(USER, Domain::Profile, &[profile(2_000, "a@b.c")]).await.unwrap(), 0);
    assert_eq!(db.max_updated_at(USER, Domain::Profile).await.unwrap(), Some(secs(1_000)));
    // Later fetch, changed body: overwritten.
    assert_eq!(db.upsert(USER, Domain::Profile, &[profile(3_000, "new@b.c")]).await.unwrap(), 1);
    assert_eq!(db.max_updated_at(USER, Domain::Profile).await.unwrap(), Some(secs(3_000)));
}

#[tokio::test]
async fn test_token_save_replaces_and_deactivates() {
    let db = SqliteDb::in_memory().await.unwrap();
    let first = token(USER, "a1", "r1", chrono::Duration::hours(1));
    db.save_token(&first).await.unwrap();

    let second = token(USER, "a2", "r2", chrono::Duration::hours(2));
    db.save_token(&second).await.unwrap();

    let stored = db.get_token(USER).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "a2");
    assert_eq!(stored.refresh_token, "r2");
    assert_eq!(
        stored.expires_at.timestamp_millis(),
        second.expires_at.timestamp_millis()
    );
    assert_eq!(db.active_user_ids().await.unwrap(), vec![USER.to_string()]);

    assert!(db.deactivate_token(USER).await.unwrap());
    assert!(!db.get_token(USER).await.unwrap().unwrap().is_active);
    assert!(db.active_user_ids().await.unwrap().is_empty());
    assert!(!db.deactivate_token("nobody").await.unwrap());
}

#[tokio::test]
async fn test_tokens_expiring_before_skips_inactive() {
    let db = SqliteDb::in_memory().await.unwrap();
    db.save_token(&token("soon", "a", "r", chrono::Duration::hours(1))).await.unwrap();
    db.save_token(&token("later", "a", "r", chrono::Duration::hours(48))).await.unwrap();
    db.save_token(&token("revoked", "a", "r", chrono::Duration::hours(1))).await.unwrap();
    db.deactivate_token("revoked").await.unwrap();

    let expiring = db
        .tokens_expiring_before(chrono::Utc::now() + chrono::Duration::hours(24))
        .await
        .unwrap();
    let users: Vec<_> = expiring.iter().map(|t| t.user_id.as_str()).collect();
    assert_eq!(users, vec!["soon"]);
}

#[tokio::test]
async fn test_concurrent_writers_on_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("whoop.db").display());
    let db = SqliteDb::connect(&url).await.unwrap();

    let mut handles = Vec::new();
    for (i, domain) in Domain::ALL.into_iter().filter(|d| d.is_ranged()).enumerate() {
        for user in ["u1", "u2"] {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                for batch in 0..5 {
                    let records: Vec<Record> = (0..20)
                        .map(|n| {
                            let id = batch * 20 + n;
                            record(&format!("{}-{}", i, id), 1_000 + id, user)
                        })
                        .collect();
                    db.upsert(user, domain, &records).await.unwrap();
                }
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for domain in Domain::ALL.into_iter().filter(|d| d.is_ranged()) {
        for user in ["u1", "u2"] {
            assert_eq!(db.count_records(user, domain).await.unwrap(), 100);
            assert_eq!(db.max_updated_at(user, domain).await.unwrap(), Some(secs(1_099)));
        }
    }

    // Reopening sees the committed data.
    db.close().await;
    let reopened = SqliteDb::connect(&url).await.unwrap();
    assert_eq!(reopened.count_records("u2", Domain::Cycle).await.unwrap(), 100);
}

#[tokio::test]
async fn test_closed_store_reports_storage_error() {
    let db = SqliteDb::in_memory().await.unwrap();
    db.close().await;

    assert!(matches!(db.ping().await, Err(SyncError::Storage(_))));
}
