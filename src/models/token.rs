// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token model.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;

/// A user's OAuth credentials as stored in the `tokens` table.
#[derive(Clone, PartialEq)]
pub struct Token {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Space-separated granted scopes
    pub scopes: String,
    /// Absolute expiry of the access token
    pub expires_at: DateTime<Utc>,
    /// Cleared when the authorization server rejects the refresh token
    pub is_active: bool,
}

impl Token {
    /// True when the access token is expired or expires within `margin`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }

    /// Build the replacement token from a refresh response.
    ///
    /// A non-positive or unrepresentable `expires_in` is a malformed response.
    pub fn refreshed(&self, response: TokenRefreshResponse, now: DateTime<Utc>) -> SyncResult<Self> {
        let expires_at = Some(response.expires_in)
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                SyncError::MalformedResponse(format!(
                    "token response expires_in {} out of range",
                    response.expires_in
                ))
            })?;

        Ok(Self {
            user_id: self.user_id.clone(),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response
                .token_type
                .unwrap_or_else(|| self.token_type.clone()),
            scopes: response.scope.unwrap_or_else(|| self.scopes.clone()),
            expires_at,
            is_active: true,
        })
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Token refresh response from the WHOOP authorization server.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds from issue
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}
