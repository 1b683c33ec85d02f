use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{compression_service::CommandCompressor, session_service::SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting squeeze with config: {:?}", cfg);

    // --- Ensure storage root exists ---
    tokio::fs::create_dir_all(&cfg.storage_dir)
        .await
        .with_context(|| format!("creating storage directory {}", cfg.storage_dir.display()))?;
    tracing::info!("Session storage at {}", cfg.storage_dir.display());

    // --- Initialize core service ---
    let compressor = Arc::new(CommandCompressor::new(cfg.compression.clone()));
    let store = SessionStore::new(cfg.storage_dir.clone(), cfg.retention, compressor);

    // --- Optional in-process janitor ---
    if !cfg.cleanup_interval.is_zero() {
        spawn_janitor(store.clone(), cfg.cleanup_interval);
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(store);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Sweep expired session files every `every`, for the life of the process.
fn spawn_janitor(store: SessionStore, every: std::time::Duration) {
    tracing::info!("Janitor sweeping every {:?}", every);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = store.sweep_expired().await;
            tracing::debug!(
                "scheduled sweep removed {} files",
                report.deleted_count()
            );
        }
    });
}
