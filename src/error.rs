// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types.
//!
//! `SyncError` is what the engine reports for a single (user, domain) pair.
//! `AppError` is the status server's error, converted to JSON responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Failure of one remote call, one token operation, or one storage batch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Rate limited by WHOOP API (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Access token rejected")]
    AuthExpired,

    #[error("Authorization revoked for user {0}")]
    AuthRevoked(String),

    #[error("No token stored for user {0}")]
    TokenNotFound(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("WHOOP API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the API client should back off and try the same call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TransientNetwork(_) | SyncError::RateLimited { .. }
        )
    }

    /// Server-provided minimum delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable label used in cycle reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::TransientNetwork(_) => "transient_network",
            SyncError::RateLimited { .. } => "rate_limited",
            SyncError::AuthExpired => "auth_expired",
            SyncError::AuthRevoked(_) => "auth_revoked",
            SyncError::TokenNotFound(_) => "token_not_found",
            SyncError::MalformedResponse(_) => "malformed_response",
            SyncError::Api { .. } => "api_error",
            SyncError::StorageWrite(_) => "storage_write_failure",
            SyncError::Storage(_) => "storage_error",
            SyncError::Cancelled => "cancelled",
        }
    }
}

/// Result type alias for engine operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Status server error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Storage(msg) | SyncError::StorageWrite(msg) => AppError::Database(msg),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
