/// Application name
pub const APP_NAME: &str = "Commune";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 4002;

/// Statuses disappear this many seconds after creation (24 hours)
pub const STATUS_TTL_SECS: i64 = 86_400;

/// Maximum chat message body in bytes (16 KiB)
pub const MAX_MESSAGE_LEN: usize = 16 * 1024;

/// Maximum media upload size in bytes (50 MiB)
pub const MAX_MEDIA_SIZE: usize = 50 * 1024 * 1024;

/// Cookie that carries the session token for browser clients
pub const SESSION_COOKIE: &str = "jwt";

/// Session token length in bytes before hex encoding
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Outbound frames buffered per realtime connection before pushes are dropped
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;
