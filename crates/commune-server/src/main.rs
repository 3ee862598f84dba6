//! # commune-server
//!
//! Backend for the Commune group chat.
//!
//! This binary provides:
//! - **REST API** (axum) for accounts, groups, messages, events and statuses
//! - **WebSocket** realtime delivery of new messages and presence
//! - **Media storage** for status uploads on the local filesystem
//! - **Background purge** of statuses past their 24 hour window

mod api;
mod auth;
mod config;
mod dispatch;
mod error;
mod media;
mod registry;
mod rooms;
mod ws;

use std::time::Duration;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use commune_shared::constants::APP_NAME;
use commune_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::media::MediaStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,commune_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;

    let media = MediaStore::new(
        config.media_storage_path.clone(),
        config.public_base_url.clone(),
        config.max_media_size,
    )
    .await?;

    let purge_every = Duration::from_secs(config.status_purge_interval_secs);
    let http_addr = config.http_addr;
    let app_state = AppState::new(db, media, config);

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Expired statuses are already hidden from reads; this reclaims the rows
    // and their media.
    let purge_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            if let Err(e) = api::purge_expired(&purge_state, Utc::now()).await {
                tracing::warn!(error = %e, "Status purge failed");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
