//! Opaque bearer-token sessions.

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};

use commune_shared::constants::SESSION_TOKEN_BYTES;
use commune_shared::types::UserId;

use crate::database::{decode_uuid, encode_ts, Database};
use crate::error::Result;

impl Database {
    /// Issue a fresh random token for `user_id`.
    pub fn create_session(&self, user_id: UserId) -> Result<String> {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.conn().execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id.to_string(), encode_ts(&Utc::now())],
        )?;
        Ok(token)
    }

    /// Resolve a token to its user, if the session exists.
    pub fn session_user(&self, token: &str) -> Result<Option<UserId>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT user_id FROM sessions WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| decode_uuid(0, &s).map(UserId))
            .transpose()
            .map_err(Into::into)
    }

    /// Returns `true` if a session was removed.
    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(affected > 0)
    }
}
