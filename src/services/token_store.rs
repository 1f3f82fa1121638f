// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user OAuth token lifecycle.
//!
//! Tokens live in the SQLite `tokens` table. A process-wide cache avoids a
//! store read on every API call, and a per-user mutex makes refresh
//! single-flight: concurrent callers that need a new token for the same user
//! wait for one refresh and then share its result.

use crate::db::SqliteDb;
use crate::error::{SyncError, SyncResult};
use crate::models::Token;
use crate::services::backoff::{retry, RetryPolicy};
use crate::services::WhoopClient;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Shared token cache, keyed by user id.
pub type TokenCache = Arc<DashMap<String, Token>>;

/// Shared refresh locks, keyed by user id.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Token store backed by SQLite with in-memory caching.
#[derive(Clone)]
pub struct TokenStore {
    client: WhoopClient,
    db: SqliteDb,
    token_cache: TokenCache,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
    retry: RetryPolicy,
}

impl TokenStore {
    pub fn new(client: WhoopClient, db: SqliteDb, retry: RetryPolicy) -> Self {
        Self {
            client,
            db,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
            retry,
        }
    }

    /// Read a user's token from the store.
    ///
    /// Fails with `TokenNotFound` when the user never authorized and with
    /// `AuthRevoked` when the token was deactivated.
    pub async fn get(&self, user_id: &str) -> SyncResult<Token> {
        let token = self
            .db
            .get_token(user_id)
            .await?
            .ok_or_else(|| SyncError::TokenNotFound(user_id.to_string()))?;

        if !token.is_active {
            self.token_cache.remove(user_id);
            return Err(SyncError::AuthRevoked(user_id.to_string()));
        }
        Ok(token)
    }

    /// Replace a user's token. Saving an active token re-enables a
    /// previously deactivated user.
    pub async fn save(&self, token: &Token) -> SyncResult<()> {
        self.db.save_token(token).await?;
        if token.is_active {
            self.token_cache
                .insert(token.user_id.clone(), token.clone());
        } else {
            self.token_cache.remove(&token.user_id);
        }
        tracing::info!(user_id = %token.user_id, expires_at = %token.expires_at, "Token saved");
        Ok(())
    }

    /// Get a token whose access token is valid for at least the refresh margin,
    /// refreshing it first if needed.
    pub async fn access_token(&self, user_id: &str) -> SyncResult<Token> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if let Some(cached) = self.cached_valid(user_id, margin) {
            return Ok(cached);
        }

        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        if let Some(cached) = self.cached_valid(user_id, margin) {
            return Ok(cached);
        }

        let token = self.get(user_id).await?;
        if !token.expires_within(Utc::now(), margin) {
            self.token_cache.insert(user_id.to_string(), token.clone());
            return Ok(token);
        }

        tracing::info!(user_id, "Access token expiring, refreshing");
        self.refresh_locked(token).await
    }

    /// Get a replacement for an access token the API just rejected.
    ///
    /// If another caller already replaced `rejected_access_token`, in this
    /// process or another one sharing the database, the replacement is
    /// returned without a refresh call.
    pub async fn refresh_after_rejection(
        &self,
        user_id: &str,
        rejected_access_token: &str,
    ) -> SyncResult<Token> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        if let Some(cached) = self.cached_valid(user_id, margin) {
            if cached.access_token != rejected_access_token {
                return Ok(cached);
            }
        }

        let token = self.get(user_id).await?;
        if token.access_token != rejected_access_token && !token.expires_within(Utc::now(), margin) {
            tracing::info!(user_id, "Token already replaced, adopting stored token");
            self.token_cache.insert(user_id.to_string(), token.clone());
            return Ok(token);
        }

        self.refresh_locked(token).await
    }

    /// Refresh a user's token if it expires within `buffer`.
    ///
    /// Returns whether a refresh happened.
    pub async fn refresh_if_expiring(&self, user_id: &str, buffer: Duration) -> SyncResult<bool> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let token = self.get(user_id).await?;
        if !token.expires_within(Utc::now(), buffer) {
            return Ok(false);
        }
        self.refresh_locked(token).await?;
        Ok(true)
    }

    fn cached_valid(&self, user_id: &str, margin: Duration) -> Option<Token> {
        self.token_cache
            .get(user_id)
            .filter(|cached| !cached.expires_within(Utc::now(), margin))
            .map(|cached| cached.value().clone())
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Refresh `current` with the authorization server. Caller holds the user's lock.
    async fn refresh_locked(&self, current: Token) -> SyncResult<Token> {
        let user_id = current.user_id.clone();

        let result = retry(&self.retry, "token_refresh", || {
            self.client.refresh_token(&current.refresh_token)
        })
        .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if is_rejection(&e) => {
                // Another process may have rotated the refresh token first.
                if let Some(stored) = self.db.get_token(&user_id).await? {
                    if stored.is_active && stored.refresh_token != current.refresh_token {
                        tracing::info!(
                            user_id = %user_id,
                            "Refresh token race detected - another process won, using its tokens"
                        );
                        self.token_cache.insert(user_id.clone(), stored.clone());
                        return Ok(stored);
                    }
                }

                tracing::warn!(user_id = %user_id, error = %e, "Refresh token rejected, deactivating user");
                self.db.deactivate_token(&user_id).await?;
                self.token_cache.remove(&user_id);
                return Err(SyncError::AuthRevoked(user_id));
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Token refresh failed");
                return Err(e);
            }
        };

        let refreshed = current.refreshed(response, Utc::now())?;
        self.db.save_token(&refreshed).await?;
        self.token_cache.insert(user_id.clone(), refreshed.clone());

        tracing::info!(user_id = %user_id, expires_at = %refreshed.expires_at, "Token refreshed and cached");
        Ok(refreshed)
    }
}

/// The authorization server refused the refresh token itself.
fn is_rejection(err: &SyncError) -> bool {
    match err {
        SyncError::AuthExpired => true,
        SyncError::Api { status, .. } => (400..500).contains(status),
        _ => false,
    }
}
