// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Synced data domains.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category of per-user data kept in sync with WHOOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Cycle,
    Sleep,
    Workout,
    Recovery,
    Profile,
}

impl Domain {
    /// Every domain, in the order a cycle visits them.
    pub const ALL: [Domain; 5] = [
        Domain::Cycle,
        Domain::Sleep,
        Domain::Workout,
        Domain::Recovery,
        Domain::Profile,
    ];

    /// Endpoint path relative to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Domain::Cycle => "/v1/cycle",
            Domain::Sleep => "/v1/activity/sleep",
            Domain::Workout => "/v1/activity/workout",
            Domain::Recovery => "/v1/recovery",
            Domain::Profile => "/v1/user/profile/basic",
        }
    }

    /// Local table holding this domain's records.
    pub fn table(self) -> &'static str {
        match self {
            Domain::Cycle => "cycles",
            Domain::Sleep => "sleeps",
            Domain::Workout => "workouts",
            Domain::Recovery => "recoveries",
            Domain::Profile => "profiles",
        }
    }

    /// Whether the domain is a time-ranged record stream (everything but profile).
    pub fn is_ranged(self) -> bool {
        !matches!(self, Domain::Profile)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Cycle => "cycle",
            Domain::Sleep => "sleep",
            Domain::Workout => "workout",
            Domain::Recovery => "recovery",
            Domain::Profile => "profile",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown domain: {}", s))
    }
}
