// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite store with typed operations.
//!
//! Provides:
//! - Tokens (one row per user, replaced atomically on refresh)
//! - Records (one table per domain, keyed by user and remote id)
//! - Watermark queries (max stored `updated_at` per user and domain)
//!
//! Every record batch is written in a single transaction, so a failed batch
//! leaves nothing behind for the watermark query to see.

use crate::db::tables;
use crate::error::{SyncError, SyncResult};
use crate::models::{Domain, Record, Token};
use crate::time_utils::from_millis;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 8;
// Concurrent pair writers queue on SQLite's write lock for at most this long.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Local SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    user_id: String,
    access_token: String,
    refresh_token: String,
    token_type: String,
    scopes: String,
    expires_at_ms: i64,
    is_active: bool,
}

impl From<TokenRow> for Token {
    fn from(row: TokenRow) -> Self {
        Token {
            user_id: row.user_id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_type: row.token_type,
            scopes: row.scopes,
            expires_at: from_millis(row.expires_at_ms),
            is_active: row.is_active,
        }
    }
}

fn read_err(e: sqlx::Error) -> SyncError {
    SyncError::Storage(e.to_string())
}

fn write_err(e: sqlx::Error) -> SyncError {
    SyncError::StorageWrite(e.to_string())
}

impl SqliteDb {
    /// Open (creating if needed) the database at `database_url` and ensure the schema.
    pub async fn connect(database_url: &str) -> SyncResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(read_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(read_err)?;

        let db = Self { pool };
        db.create_schema().await?;

        tracing::info!(url = database_url, "Connected to SQLite store");
        Ok(db)
    }

    /// Create an isolated in-memory store (tests, dry runs).
    ///
    /// Uses a single connection that never expires, since each SQLite
    /// in-memory connection is its own database.
    pub async fn in_memory() -> SyncResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(read_err)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(read_err)?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> SyncResult<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                user_id       TEXT PRIMARY KEY,
                access_token  TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                token_type    TEXT NOT NULL DEFAULT 'Bearer',
                scopes        TEXT NOT NULL DEFAULT '',
                expires_at_ms INTEGER NOT NULL,
                is_active     INTEGER NOT NULL DEFAULT 1,
                updated_at_ms INTEGER NOT NULL
            )",
            tables::TOKENS
        ))
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        for domain in Domain::ALL {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    user_id       TEXT NOT NULL,
                    record_id     TEXT NOT NULL,
                    updated_at_ms INTEGER NOT NULL CHECK (updated_at_ms >= 0),
                    payload       TEXT NOT NULL,
                    synced_at_ms  INTEGER NOT NULL,
                    PRIMARY KEY (user_id, record_id)
                )",
                table = domain.table()
            ))
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_watermark ON {table} (user_id, updated_at_ms)",
                table = domain.table()
            ))
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)
    }

    /// Check that the store answers at all.
    pub async fn ping(&self) -> SyncResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(())
    }

    /// Close every connection; later operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get the stored token for a user (active or not).
    pub async fn get_token(&self, user_id: &str) -> SyncResult<Option<Token>> {
        let row: Option<TokenRow> = sqlx::query_as(&format!(
            "SELECT user_id, access_token, refresh_token, token_type, scopes, expires_at_ms, is_active
             FROM {} WHERE user_id = ?1",
            tables::TOKENS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(row.map(Token::from))
    }

    /// Store a token, replacing the previous one for the same user in one statement.
    pub async fn save_token(&self, token: &Token) -> SyncResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (user_id, access_token, refresh_token, token_type, scopes,
                             expires_at_ms, is_active, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                access_token  = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type    = excluded.token_type,
                scopes        = excluded.scopes,
                expires_at_ms = excluded.expires_at_ms,
                is_active     = excluded.is_active,
                updated_at_ms = excluded.updated_at_ms",
            tables::TOKENS
        ))
        .bind(&token.user_id)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(&token.token_type)
        .bind(&token.scopes)
        .bind(token.expires_at.timestamp_millis())
        .bind(token.is_active)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    /// Mark a user's token unusable until it is re-authorized.
    pub async fn deactivate_token(&self, user_id: &str) -> SyncResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET is_active = 0, updated_at_ms = ?2 WHERE user_id = ?1",
            tables::TOKENS
        ))
        .bind(user_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Users holding an active token, in stable order.
    pub async fn active_user_ids(&self) -> SyncResult<Vec<String>> {
        sqlx::query_scalar(&format!(
            "SELECT user_id FROM {} WHERE is_active = 1 ORDER BY user_id",
            tables::TOKENS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)
    }

    /// Active tokens whose access token expires before `deadline`.
    pub async fn tokens_expiring_before(&self, deadline: DateTime<Utc>) -> SyncResult<Vec<Token>> {
        let rows: Vec<TokenRow> = sqlx::query_as(&format!(
            "SELECT user_id, access_token, refresh_token, token_type, scopes, expires_at_ms, is_active
             FROM {} WHERE is_active = 1 AND expires_at_ms < ?1 ORDER BY user_id",
            tables::TOKENS
        ))
        .bind(deadline.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(rows.into_iter().map(Token::from).collect())
    }

    // ─── Record Operations ───────────────────────────────────────

    /// Insert new records and overwrite stored ones only when strictly newer.
    ///
    /// The batch commits as a unit: on any error nothing from it is visible.
    /// Returns the number of rows inserted or overwritten.
    pub async fn upsert(&self, user_id: &str, domain: Domain, records: &[Record]) -> SyncResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = upsert_sql(domain);
        let synced_at = Utc::now().timestamp_millis();
        let mut written = 0;

        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for record in records {
            let payload = serde_json::to_string(&record.payload)
                .map_err(|e| SyncError::StorageWrite(format!("payload encoding: {}", e)))?;

            let result = sqlx::query(&sql)
                .bind(user_id)
                .bind(&record.id)
                .bind(record.updated_at.timestamp_millis())
                .bind(payload)
                .bind(synced_at)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
            written += result.rows_affected();
        }
        tx.commit().await.map_err(write_err)?;

        tracing::debug!(
            user_id,
            domain = %domain,
            received = records.len(),
            written,
            "Upserted batch"
        );
        Ok(written)
    }

    /// Latest stored `updated_at` for a (user, domain), if any rows exist.
    pub async fn max_updated_at(&self, user_id: &str, domain: Domain) -> SyncResult<Option<DateTime<Utc>>> {
        let max: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(updated_at_ms) FROM {} WHERE user_id = ?1",
            domain.table()
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(max.map(from_millis))
    }

    /// Number of stored records for a (user, domain).
    pub async fn count_records(&self, user_id: &str, domain: Domain) -> SyncResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE user_id = ?1",
            domain.table()
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(count.max(0) as u64)
    }

    /// Get a single stored record.
    pub async fn get_record(
        &self,
        user_id: &str,
        domain: Domain,
        record_id: &str,
    ) -> SyncResult<Option<Record>> {
        let row: Option<(i64, String)> = sqlx::query_as(&format!(
            "SELECT updated_at_ms, payload FROM {} WHERE user_id = ?1 AND record_id = ?2",
            domain.table()
        ))
        .bind(user_id)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        row.map(|(updated_at_ms, payload)| {
            let payload = serde_json::from_str(&payload)
                .map_err(|e| SyncError::Storage(format!("stored payload: {}", e)))?;
            Ok(Record {
                id: record_id.to_string(),
                updated_at: from_millis(updated_at_ms),
                payload,
            })
        })
        .transpose()
    }
}

/// Conditional upsert: strictly newer `updated_at` wins, ties and older are no-ops.
///
/// Profiles are stamped with the fetch time, so an identical payload is also a no-op.
fn upsert_sql(domain: Domain) -> String {
    let table = domain.table();
    let mut sql = format!(
        "INSERT INTO {table} (user_id, record_id, updated_at_ms, payload, synced_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, record_id) DO UPDATE SET
            updated_at_ms = excluded.updated_at_ms,
            payload       = excluded.payload,
            synced_at_ms  = excluded.synced_at_ms
         WHERE excluded.updated_at_ms > {table}.updated_at_ms"
    );
    if !domain.is_ranged() {
        sql.push_str(&format!(" AND excluded.payload <> {table}.payload"));
    }
    sql
}
