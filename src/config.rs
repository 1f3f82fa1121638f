// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daemon configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local runs.

use crate::services::backoff::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.prod.whoop.com/developer";
pub const DEFAULT_TOKEN_URL: &str = "https://api.prod.whoop.com/oauth/oauth2/token";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// WHOOP OAuth client ID
    pub client_id: String,
    /// WHOOP OAuth client secret
    pub client_secret: String,
    /// sqlx connection string for the local store
    pub database_url: String,
    /// Pause between the end of one sync cycle and the start of the next
    pub sync_interval: Duration,
    /// Widest time window requested in a single fetch
    pub max_data_range: chrono::Duration,
    /// Users to sync; empty means every user with an active token
    pub user_ids: Vec<String>,
    /// Status server port
    pub port: u16,
    pub api_base_url: String,
    pub token_url: String,
    /// Backoff applied to transient API failures
    pub retry: RetryPolicy,
    /// Upper bound on (user, domain) pairs fetched at once
    pub max_concurrent_pairs: usize,
    /// Refresh tokens expiring within this horizon before each cycle (zero disables)
    pub token_refresh_buffer: chrono::Duration,
    /// Where an empty (user, domain) starts; `None` bootstraps from epoch zero
    pub bootstrap_lookback: Option<chrono::Duration>,
    /// Catch-up windows one pair may consume per cycle before it is reported
    /// behind (zero: loop until caught up)
    pub max_windows_per_cycle: u32,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            database_url: "sqlite::memory:".to_string(),
            sync_interval: Duration::from_secs(60 * 60),
            max_data_range: chrono::Duration::seconds(604_800),
            user_ids: Vec::new(),
            port: 8080,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            retry: RetryPolicy::default(),
            max_concurrent_pairs: 8,
            token_refresh_buffer: chrono::Duration::hours(24),
            bootstrap_lookback: None,
            max_windows_per_cycle: 0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let sync_interval_minutes: u64 = parse_or(&lookup, "SYNC_INTERVAL_MINUTES", 60)?;
        let max_data_range_secs: i64 = parse_or(&lookup, "MAX_DATA_RANGE_SECS", 604_800)?;
        let max_attempts: u32 = parse_or(&lookup, "RETRY_MAX_ATTEMPTS", 5)?;
        let base_delay_ms: u64 = parse_or(&lookup, "RETRY_BASE_DELAY_MS", 1_000)?;
        let max_delay_ms: u64 = parse_or(&lookup, "RETRY_MAX_DELAY_MS", 60_000)?;
        let refresh_buffer_hours: i64 = parse_or(&lookup, "TOKEN_REFRESH_BUFFER_HOURS", 24)?;
        let lookback_days: Option<i64> = lookup("BOOTSTRAP_LOOKBACK_DAYS")
            .filter(|v| !v.trim().is_empty())
            .map(|v| parse_value("BOOTSTRAP_LOOKBACK_DAYS", &v))
            .transpose()?;

        if sync_interval_minutes == 0 {
            return Err(ConfigError::Invalid("SYNC_INTERVAL_MINUTES", "must be positive"));
        }
        if max_data_range_secs <= 0 {
            return Err(ConfigError::Invalid("MAX_DATA_RANGE_SECS", "must be positive"));
        }
        if max_attempts == 0 {
            return Err(ConfigError::Invalid("RETRY_MAX_ATTEMPTS", "must be positive"));
        }
        if base_delay_ms > max_delay_ms {
            return Err(ConfigError::Invalid(
                "RETRY_BASE_DELAY_MS",
                "must not exceed RETRY_MAX_DELAY_MS",
            ));
        }
        if refresh_buffer_hours < 0 {
            return Err(ConfigError::Invalid("TOKEN_REFRESH_BUFFER_HOURS", "must not be negative"));
        }
        if lookback_days.is_some_and(|d| d <= 0) {
            return Err(ConfigError::Invalid("BOOTSTRAP_LOOKBACK_DAYS", "must be positive"));
        }

        let max_concurrent_pairs: usize = parse_or(&lookup, "MAX_CONCURRENT_PAIRS", 8)?;
        if max_concurrent_pairs == 0 {
            return Err(ConfigError::Invalid("MAX_CONCURRENT_PAIRS", "must be positive"));
        }

        Ok(Self {
            client_id: required("WHOOP_CLIENT_ID")?,
            client_secret: required("WHOOP_CLIENT_SECRET")?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://whoop.db".to_string()),
            sync_interval: Duration::from_secs(sync_interval_minutes * 60),
            max_data_range: chrono::Duration::seconds(max_data_range_secs),
            user_ids: lookup("SYNC_USER_IDS")
                .map(|v| parse_user_ids(&v))
                .unwrap_or_default(),
            port: parse_or(&lookup, "PORT", 8080)?,
            api_base_url: lookup("WHOOP_API_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            token_url: lookup("WHOOP_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            retry: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(base_delay_ms),
                Duration::from_millis(max_delay_ms),
            ),
            max_concurrent_pairs,
            token_refresh_buffer: chrono::Duration::hours(refresh_buffer_hours),
            bootstrap_lookback: lookback_days.map(chrono::Duration::days),
            max_windows_per_cycle: parse_or(&lookup, "MAX_WINDOWS_PER_CYCLE", 0)?,
        })
    }
}

/// Split a comma-separated user list, dropping blanks and duplicates.
fn parse_user_ids(raw: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(key, "not a valid number"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
