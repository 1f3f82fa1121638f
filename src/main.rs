// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! whoop-sync daemon
//!
//! Runs sync cycles on a fixed interval and serves sync status over HTTP
//! until interrupted.

use anyhow::Context;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use whoop_sync::{
    config::Config,
    db::SqliteDb,
    services::{orchestrator::cancelled, Scheduler, SharedSummary, SyncOrchestrator},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        interval_secs = config.sync_interval.as_secs(),
        max_data_range_secs = config.max_data_range.num_seconds(),
        configured_users = config.user_ids.len(),
        "Starting whoop-sync"
    );

    let db = SqliteDb::connect(&config.database_url)
        .await
        .context("Failed to open database")?;

    let orchestrator = SyncOrchestrator::from_config(&config, db.clone())
        .context("Failed to build sync engine")?;
    let last_summary: SharedSummary = Arc::new(RwLock::new(None));

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db: db.clone(),
        watermarks: orchestrator.watermarks().clone(),
        last_summary: last_summary.clone(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    // Start status server
    let app = whoop_sync::routes::create_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Status server listening");

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(cancelled(shutdown_rx.clone()))
        .into_future();

    let scheduler = Scheduler::new(orchestrator, config.sync_interval, last_summary);
    let (server_result, ()) = tokio::join!(server, scheduler.run(shutdown_rx));
    server_result.context("Status server failed")?;

    db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    if let Ok(directive) = "whoop_sync=debug".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::registry().with(filter).with(format).init();
}
