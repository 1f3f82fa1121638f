// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fetched records, result pages, and fetch windows.

use crate::error::{SyncError, SyncResult};
use crate::models::Domain;
use crate::time_utils::parse_rfc3339;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One remote record as stored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Remote identifier, unique within (user, domain)
    pub id: String,
    /// Freshness stamp used by the upsert rule and the watermark
    pub updated_at: DateTime<Utc>,
    /// JSON body exactly as returned by the API
    pub payload: Value,
}

impl Record {
    /// Build a record from one element of a ranged page.
    pub fn from_ranged(domain: Domain, payload: Value) -> SyncResult<Self> {
        let id = match domain {
            Domain::Recovery => recovery_id(&payload)?,
            _ => id_field(&payload, "id")?.ok_or_else(|| {
                SyncError::MalformedResponse(format!("{} record without id", domain))
            })?,
        };

        let updated_at = payload
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(parse_rfc3339)
            .ok_or_else(|| {
                SyncError::MalformedResponse(format!(
                    "{} record {} has no valid updated_at",
                    domain, id
                ))
            })?;

        Ok(Self {
            id,
            updated_at,
            payload,
        })
    }

    /// Build the singleton profile record, stamped with the fetch time.
    pub fn from_profile(user_id: &str, payload: Value, fetched_at: DateTime<Utc>) -> SyncResult<Self> {
        if !payload.is_object() {
            return Err(SyncError::MalformedResponse(
                "profile body is not an object".to_string(),
            ));
        }
        let id = id_field(&payload, "user_id")?.unwrap_or_else(|| user_id.to_string());
        Ok(Self {
            id,
            updated_at: fetched_at,
            payload,
        })
    }
}

/// Read an identifier that WHOOP may send as a number or a string.
fn id_field(payload: &Value, field: &str) -> SyncResult<Option<String>> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(other) => Err(SyncError::MalformedResponse(format!(
            "unexpected {} value: {}",
            field, other
        ))),
    }
}

/// Recoveries have no id of their own; they belong to a (cycle, sleep) pair.
fn recovery_id(payload: &Value) -> SyncResult<String> {
    let cycle_id = id_field(payload, "cycle_id")?.ok_or_else(|| {
        SyncError::MalformedResponse("recovery record without cycle_id".to_string())
    })?;
    Ok(match id_field(payload, "sleep_id")? {
        Some(sleep_id) => format!("{}:{}", cycle_id, sleep_id),
        None => cycle_id,
    })
}

/// Raw paginated body from a ranged endpoint.
#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default)]
    next_token: Option<String>,
}

/// One decoded page of records plus the cursor for the next one.
#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<Record>,
    pub next_cursor: Option<String>,
}

impl Page {
    /// Decode a page body; any undecodable record rejects the whole page.
    pub fn from_json(domain: Domain, body: Value) -> SyncResult<Self> {
        let raw: RawPage = serde_json::from_value(body)
            .map_err(|e| SyncError::MalformedResponse(format!("page body: {}", e)))?;

        let records = raw
            .records
            .into_iter()
            .map(|payload| Record::from_ranged(domain, payload))
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(Self {
            records,
            next_cursor: raw.next_token.filter(|t| !t.is_empty()),
        })
    }
}

/// A bounded `[start, end)` range submitted in one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// The window beginning at `start`, clamped to `now` and to `max_range`.
    pub fn clamped(start: DateTime<Utc>, now: DateTime<Utc>, max_range: Duration) -> Self {
        let end = start
            .checked_add_signed(max_range)
            .map_or(now, |limit| limit.min(now));
        Self {
            start,
            end: end.max(start),
        }
    }

    /// True when the clamp cut the window short of `now`.
    pub fn is_behind(&self, now: DateTime<Utc>) -> bool {
        self.end < now
    }
}
