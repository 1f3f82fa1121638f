// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync engine logic.

pub mod backoff;
pub mod orchestrator;
pub mod refresher;
pub mod scheduler;
pub mod token_store;
pub mod watermark;
pub mod whoop;

pub use backoff::RetryPolicy;
pub use orchestrator::{SyncOrchestrator, SyncSettings};
pub use refresher::{RefreshReport, TokenRefresher};
pub use scheduler::{Scheduler, SharedSummary};
pub use token_store::TokenStore;
pub use watermark::WatermarkTracker;
pub use whoop::{WhoopClient, WhoopService};
