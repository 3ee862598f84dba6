//! # commune-store
//!
//! Durable storage for Commune, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed operations for every domain
//! model. Set-like collections (group members, event attendees, status
//! viewers) use composite primary keys so appends are idempotent, and
//! status expiry is applied at read time plus a periodic purge.

pub mod database;
pub mod events;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod sessions;
pub mod statuses;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
