// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync status routes.

use crate::error::{AppError, Result};
use crate::models::{CycleSummary, Domain};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

const MAX_USER_ID_LEN: usize = 128;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/users/{user_id}/watermarks", get(get_watermarks))
}

/// Summary of the most recent sync cycle.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<CycleSummary>> {
    let summary = state.last_summary.read().await.clone();
    summary
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No sync cycle has completed yet".to_string()))
}

// ─── Watermarks ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DomainWatermark {
    pub domain: Domain,
    /// RFC 3339, absent when nothing is stored yet
    pub watermark: Option<String>,
    pub records: u64,
}

#[derive(Debug, Serialize)]
pub struct WatermarksResponse {
    pub user_id: String,
    pub active: bool,
    pub domains: Vec<DomainWatermark>,
}

/// Per-domain watermarks for one user.
async fn get_watermarks(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<WatermarksResponse>> {
    if user_id.len() > MAX_USER_ID_LEN || user_id.chars().any(char::is_control) {
        return Err(AppError::BadRequest("Invalid user id".to_string()));
    }

    let token = state.db.get_token(&user_id).await?;

    let mut domains = Vec::with_capacity(Domain::ALL.len());
    for (domain, watermark) in state.watermarks.all(&user_id).await? {
        domains.push(DomainWatermark {
            domain,
            watermark: watermark.map(format_utc_rfc3339),
            records: state.db.count_records(&user_id, domain).await?,
        });
    }

    if token.is_none() && domains.iter().all(|d| d.records == 0) {
        return Err(AppError::NotFound(format!("User {}", user_id)));
    }

    Ok(Json(WatermarksResponse {
        user_id,
        active: token.is_some_and(|t| t.is_active),
        domains,
    }))
}
