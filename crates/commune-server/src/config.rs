//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use commune_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_OUTBOUND_QUEUE, MAX_MEDIA_SIZE};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:4002`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./commune.db`
    pub database_path: PathBuf,

    /// Directory where uploaded media is written.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Base URL prepended to media links handed to clients.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:4002`
    pub public_base_url: String,

    /// Maximum upload size in bytes.
    /// Env: `MAX_MEDIA_SIZE`
    pub max_media_size: usize,

    /// How often expired statuses are deleted.
    /// Env: `STATUS_PURGE_INTERVAL_SECS`
    /// Default: `600`
    pub status_purge_interval_secs: u64,

    /// Frames buffered per realtime connection.
    /// Env: `OUTBOUND_QUEUE_SIZE`
    pub outbound_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./commune.db"),
            media_storage_path: PathBuf::from("./media"),
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            max_media_size: MAX_MEDIA_SIZE,
            status_purge_interval_secs: 600,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "HTTP_ADDR", &mut config.http_addr);

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("MEDIA_STORAGE_PATH") {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                tracing::warn!("Empty PUBLIC_BASE_URL, using default");
            } else {
                config.public_base_url = url.to_string();
            }
        }

        parse_into(&lookup, "MAX_MEDIA_SIZE", &mut config.max_media_size);
        parse_into(
            &lookup,
            "STATUS_PURGE_INTERVAL_SECS",
            &mut config.status_purge_interval_secs,
        );
        parse_into(&lookup, "OUTBOUND_QUEUE_SIZE", &mut config.outbound_queue_size);

        // tokio's interval and mpsc::channel both panic on zero.
        if config.status_purge_interval_secs == 0 {
            tracing::warn!("STATUS_PURGE_INTERVAL_SECS must be positive, using default");
            config.status_purge_interval_secs = Self::default().status_purge_interval_secs;
        }
        if config.outbound_queue_size == 0 {
            tracing::warn!("OUTBOUND_QUEUE_SIZE must be positive, using default");
            config.outbound_queue_size = DEFAULT_OUTBOUND_QUEUE;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
        }
    }
}
