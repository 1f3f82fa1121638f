// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the sync engine.

pub mod domain;
pub mod record;
pub mod report;
pub mod token;

pub use domain::Domain;
pub use record::{Page, Record, Window};
pub use report::{CycleSummary, PairOutcome, PairReport};
pub use token::{Token, TokenRefreshResponse};
