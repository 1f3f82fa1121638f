// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use whoop_sync::config::Config;
use whoop_sync::db::SqliteDb;
use whoop_sync::models::{Domain, Token};
use whoop_sync::routes::create_router;
use whoop_sync::services::{RetryPolicy, SyncOrchestrator, WatermarkTracker};
use whoop_sync::time_utils::{format_utc_rfc3339, parse_rfc3339};
use whoop_sync::AppState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

#[allow(dead_code)]
pub const USER: &str = "u1";

#[allow(dead_code)]
pub const TOKEN_PATH: &str = "/oauth/oauth2/token";

/// Seconds since the epoch as a timestamp.
#[allow(dead_code)]
pub fn secs(s: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(s, 0).expect("valid timestamp")
}

/// Fast retries so exhausted-retry tests finish quickly.
#[allow(dead_code)]
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(
        3,
        std::time::Duration::from_millis(5),
        std::time::Duration::from_millis(20),
    )
}

/// Create a test config pointing at the mock server.
#[allow(dead_code)]
pub fn test_config(server: &MockServer) -> Config {
    Config {
        api_base_url: server.uri(),
        token_url: format!("{}{}", server.uri(), TOKEN_PATH),
        user_ids: vec![USER.to_string()],
        retry: fast_retry(),
        token_refresh_buffer: Duration::zero(),
        ..Config::default()
    }
}

/// A token for `user_id` expiring `expires_in` from now.
#[allow(dead_code)]
pub fn token(user_id: &str, access: &str, refresh: &str, expires_in: Duration) -> Token {
    Token {
        user_id: user_id.to_string(),
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        token_type: "Bearer".to_string(),
        scopes: "offline read:cycles read:sleep".to_string(),
        expires_at: Utc::now() + expires_in,
        is_active: true,
    }
}

/// In-memory store seeded with tokens.
#[allow(dead_code)]
pub async fn seeded_db(tokens: &[Token]) -> SqliteDb {
    let db = SqliteDb::in_memory()
        .await
        .expect("Failed to open in-memory store");
    for token in tokens {
        db.save_token(token).await.expect("Failed to seed token");
    }
    db
}

/// Token endpoint success body.
#[allow(dead_code)]
pub fn refresh_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600,
        "scope": "offline read:cycles read:sleep",
        "token_type": "bearer"
    }))
}

/// A ranged record updated at `updated_at` seconds.
///
/// Carries `cycle_id`/`sleep_id` so the same shape decodes for recovery.
#[allow(dead_code)]
pub fn record_json(id: i64, updated_at: i64) -> Value {
    json!({
        "id": id,
        "cycle_id": id,
        "sleep_id": id + 1,
        "user_id": 10129,
        "created_at": format_utc_rfc3339(secs(updated_at)),
        "updated_at": format_utc_rfc3339(secs(updated_at)),
        "score_state": "SCORED",
        "score": {"strain": 5.2}
    })
}

/// A page body.
#[allow(dead_code)]
pub fn page(records: Vec<Value>, next_token: Option<&str>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "records": records,
        "next_token": next_token
    }))
}

/// Mount a fixed profile response.
#[allow(dead_code)]
pub async fn mount_profile(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(Domain::Profile.path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": 10129,
            "email": "jsmith123@whoop.com",
            "first_name": "John",
            "last_name": "Smith"
        })))
        .mount(server)
        .await;
}

/// Remote dataset served through the ranged endpoints.
///
/// Returns the records whose `updated_at` falls in the requested
/// `[start, end)` window, 25 per page, with the offset as cursor.
#[allow(dead_code)]
#[derive(Clone)]
pub struct Backlog {
    pub updated_at: Vec<i64>,
}

impl Backlog {
    /// One record every `step` seconds in `(0, until)`.
    #[allow(dead_code)]
    pub fn every(step: i64, until: i64) -> Self {
        Self {
            updated_at: (1..)
                .map(|i| i * step)
                .take_while(|t| *t < until)
                .collect(),
        }
    }

    /// Mount on every ranged endpoint.
    #[allow(dead_code)]
    pub async fn mount(self, server: &MockServer) {
        for domain in Domain::ALL.into_iter().filter(|d| d.is_ranged()) {
            Mock::given(method("GET"))
                .and(path(domain.path()))
                .respond_with(self.clone())
                .mount(server)
                .await;
        }
    }
}

impl Respond for Backlog {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let bound = |key: &str| {
            params
                .get(key)
                .and_then(|raw| parse_rfc3339(raw))
                .map(|t| t.timestamp())
        };
        let (Some(start), Some(end)) = (bound("start"), bound("end")) else {
            return ResponseTemplate::new(400);
        };
        let offset: usize = params
            .get("nextToken")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);

        let in_window: Vec<i64> = self
            .updated_at
            .iter()
            .copied()
            .filter(|t| *t >= start && *t < end)
            .collect();
        let records = in_window
            .iter()
            .skip(offset)
            .take(25)
            .map(|t| record_json(*t, *t))
            .collect();
        let next = (offset + 25 < in_window.len()).then(|| (offset + 25).to_string());

        page(records, next.as_deref())
    }
}

/// A shutdown receiver that never fires.
#[allow(dead_code)]
pub fn no_shutdown() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Wire an orchestrator against the mock server.
#[allow(dead_code)]
pub fn orchestrator(config: &Config, db: &SqliteDb) -> SyncOrchestrator {
    SyncOrchestrator::from_config(config, db.clone()).unwrap()
}

/// Create a test app over an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let db = seeded_db(&[]).await;

    let state = Arc::new(AppState {
        config,
        watermarks: WatermarkTracker::new(db.clone(), None),
        db,
        last_summary: Arc::new(RwLock::new(None)),
    });

    (create_router(state.clone()), state)
}
