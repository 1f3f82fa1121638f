// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exponential backoff with jitter for transient WHOOP API failures.
//!
//! The delay after the n-th failure is `base * 2^(n-1)`, capped at `max`,
//! with equal jitter (half fixed, half random). A server `Retry-After` hint
//! is a floor on the delay, even above the cap.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry configuration for one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Disable jitter (deterministic delays).
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Capped exponential delay after `failures` consecutive failures (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Delay before the next attempt, honoring a server hint as a floor.
    pub fn delay(&self, failures: u32, retry_after: Option<Duration>) -> Duration {
        let capped = self.backoff(failures);
        let delay = if self.jitter {
            let half = capped / 2;
            let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
            half + Duration::from_millis(spread)
        } else {
            capped
        };
        retry_after.map_or(delay, |hint| delay.max(hint))
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts the policy's attempts. The last error is returned unchanged.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let mut failures = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };

        failures += 1;
        if failures >= policy.max_attempts {
            tracing::error!(
                call = label,
                attempts = failures,
                error = %err,
                "Giving up after retries"
            );
            return Err(err);
        }

        let delay = policy.delay(failures, err.retry_after());
        if matches!(err, SyncError::RateLimited { .. }) {
            tracing::warn!(
                call = label,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Rate limited by WHOOP API, backing off"
            );
        } else {
            tracing::warn!(
                call = label,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );
        }
        tokio::time::sleep(delay).await;
    }
}
