// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! whoop-sync: keep a local SQLite store current with WHOOP per-user data.
//!
//! The sync engine tracks a watermark per (user, domain), fetches bounded
//! time windows through an OAuth-aware API client, and upserts records
//! idempotently. A small HTTP server reports sync status.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SqliteDb;
use services::{SharedSummary, WatermarkTracker};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SqliteDb,
    pub watermarks: WatermarkTracker,
    /// Latest completed cycle, written by the scheduler
    pub last_summary: SharedSummary,
}
