// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WHOOP API client for fetching per-user records.
//!
//! Handles:
//! - Ranged, paginated record fetches and the singleton profile
//! - Token refresh requests against the authorization server
//! - Mapping HTTP failures onto the retry taxonomy (401, 429, 5xx)
//! - Backoff on transient failures and one refresh-and-retry on 401

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::models::{Domain, Page, Record, TokenRefreshResponse, Window};
use crate::services::backoff::{retry, RetryPolicy};
use crate::services::TokenStore;
use crate::time_utils::format_utc_rfc3339;
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Largest page the API serves.
pub const PAGE_LIMIT: u32 = 25;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw WHOOP HTTP client: one request per call, no retries.
#[derive(Clone)]
pub struct WhoopClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl WhoopClient {
    /// Create a new WHOOP client with OAuth credentials.
    pub fn new(
        client_id: String,
        client_secret: String,
        base_url: String,
        token_url: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed building WHOOP HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url,
            client_id,
            client_secret,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.api_base_url.clone(),
            config.token_url.clone(),
        )
    }

    /// Fetch one page of a ranged domain.
    pub async fn get_page(
        &self,
        access_token: &str,
        domain: Domain,
        window: Window,
        cursor: Option<&str>,
    ) -> SyncResult<Page> {
        let url = format!("{}{}", self.base_url, domain.path());

        let mut query = vec![
            ("start", format_utc_rfc3339(window.start)),
            ("end", format_utc_rfc3339(window.end)),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("nextToken", cursor.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        let body: Value = check_response_json(response).await?;
        Page::from_json(domain, body)
    }

    /// Get the user's basic profile.
    pub async fn get_profile(&self, access_token: &str) -> SyncResult<Value> {
        let url = format!("{}{}", self.base_url, Domain::Profile.path());

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(response).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh_token(&self, refresh_token: &str) -> SyncResult<TokenRefreshResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", "offline"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(response).await
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    SyncError::TransientNetwork(e.to_string())
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: DeserializeOwned>(response: reqwest::Response) -> SyncResult<T> {
    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers(), Utc::now());
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status.as_u16(), retry_after, body));
    }

    response.json().await.map_err(|e| {
        if e.is_decode() {
            SyncError::MalformedResponse(format!("JSON parse error: {}", e))
        } else {
            SyncError::TransientNetwork(format!("reading body: {}", e))
        }
    })
}

/// Map a non-success status onto the error taxonomy.
fn status_error(status: u16, retry_after: Option<Duration>, body: String) -> SyncError {
    match status {
        401 => SyncError::AuthExpired,
        429 => {
            tracing::warn!(retry_after = ?retry_after, "WHOOP rate limit hit (429)");
            SyncError::RateLimited { retry_after }
        }
        408 | 500..=599 => SyncError::TransientNetwork(format!("HTTP {}: {}", status, body)),
        _ => SyncError::Api { status, body },
    }
}

/// Read `Retry-After` as delta-seconds or an HTTP-date.
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

// ─────────────────────────────────────────────────────────────────────────────
// WhoopService - API client with retries and token lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Where a call stands with respect to the user's access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    /// Sent with the token the store handed out.
    Initial,
    /// Sent again after the one refresh a 401 is allowed to trigger.
    Refreshed,
}

/// High-level WHOOP service used by the orchestrator.
///
/// Every call:
/// - takes a valid access token from the `TokenStore`
/// - retries transient failures (connection errors, 5xx, 429) with backoff
/// - on 401, refreshes once through the store and repeats the call; a second
///   401 is reported as `AuthRevoked`
#[derive(Clone)]
pub struct WhoopService {
    client: WhoopClient,
    tokens: TokenStore,
    retry: RetryPolicy,
}

impl WhoopService {
    pub fn new(client: WhoopClient, tokens: TokenStore, retry: RetryPolicy) -> Self {
        Self {
            client,
            tokens,
            retry,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Fetch one page of `domain` records in `window`.
    ///
    /// Returns the records (possibly none) and the cursor of the next page,
    /// or `None` when the window is exhausted.
    pub async fn fetch_page(
        &self,
        user_id: &str,
        domain: Domain,
        window: Window,
        cursor: Option<&str>,
    ) -> SyncResult<Page> {
        self.authorized(user_id, domain.as_str(), |access_token| async move {
            self.client
                .get_page(&access_token, domain, window, cursor)
                .await
        })
        .await
    }

    /// Fetch the user's profile as a singleton record stamped `fetched_at`.
    pub async fn fetch_profile(&self, user_id: &str, fetched_at: DateTime<Utc>) -> SyncResult<Record> {
        let body = self
            .authorized(user_id, Domain::Profile.as_str(), |access_token| async move {
                self.client.get_profile(&access_token).await
            })
            .await?;
        Record::from_profile(user_id, body, fetched_at)
    }

    /// Run `call` with the user's access token under the retry policy and
    /// the two-state auth machine.
    async fn authorized<T, F, Fut>(&self, user_id: &str, label: &str, call: F) -> SyncResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut token = self.tokens.access_token(user_id).await?;
        let mut state = AuthState::Initial;

        loop {
            let access_token = token.access_token.clone();
            let result = retry(&self.retry, label, || call(access_token.clone())).await;

            match (result, state) {
                (Err(SyncError::AuthExpired), AuthState::Initial) => {
                    tracing::info!(user_id, call = label, "Access token rejected, refreshing");
                    token = self
                        .tokens
                        .refresh_after_rejection(user_id, &access_token)
                        .await?;
                    state = AuthState::Refreshed;
                }
                (Err(SyncError::AuthExpired), AuthState::Refreshed) => {
                    tracing::error!(
                        user_id,
                        call = label,
                        "Refreshed token rejected as well, treating authorization as revoked"
                    );
                    return Err(SyncError::AuthRevoked(user_id.to_string()));
                }
                (result, _) => return result,
            }
        }
    }
}
