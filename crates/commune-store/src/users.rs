//! CRUD operations for [`User`] records.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use commune_shared::types::UserId;
use commune_shared::DomainError;

use crate::database::{decode_ts, decode_uuid, encode_ts, is_constraint_violation, Database};
use crate::error::{Result, StoreError};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, fullname, email, profile_pic, created_at";

impl Database {
    /// Register a new account. Emails are unique.
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let id = UserId::new();

        self.conn()
            .execute(
                "INSERT INTO users (id, fullname, email, password_hash, profile_pic, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    new.fullname,
                    new.email,
                    new.password_hash,
                    new.profile_pic,
                    encode_ts(&Utc::now()),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::Rejected(DomainError::conflict("User already registered"))
                } else {
                    StoreError::Sqlite(e)
                }
            })?;

        self.get_user(id)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(StoreError::from_query)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        user_exists(self.conn(), id)
    }

    /// Look up a user and their password hash for login.
    pub fn find_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
                params![email],
                |row| Ok((row_to_user(row)?, row.get::<_, String>(5)?)),
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Every user except `exclude`, oldest account first.
    pub fn list_users_except(&self, exclude: UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![exclude.to_string()], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

pub(crate) fn user_exists(conn: &Connection, id: UserId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(4)?;

    Ok(User {
        id: UserId(decode_uuid(0, &id_str)?),
        fullname: row.get(1)?,
        email: row.get(2)?,
        profile_pic: row.get(3)?,
        created_at: decode_ts(4, &created_str)?,
    })
}
