//! Ephemeral group statuses.
//!
//! A status is visible for [`STATUS_TTL_SECS`] after creation. Reads filter
//! on `created_at > now - ttl`, so an expired status disappears the moment
//! its window closes even if [`Database::purge_expired_statuses`] has not
//! run yet.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use commune_shared::constants::STATUS_TTL_SECS;
use commune_shared::types::{GroupId, MediaType, StatusId, UserId};
use commune_shared::DomainError;

use crate::database::{decode_ts, decode_uuid, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{NewStatus, Status};

const STATUS_COLUMNS: &str =
    "id, user_id, group_id, media_url, media_type, caption, music_track, created_at";

/// Oldest `created_at` that is still visible at `now`.
fn visible_after(now: DateTime<Utc>) -> String {
    encode_ts(&(now - Duration::seconds(STATUS_TTL_SECS)))
}

impl Database {
    /// Post a status to a group the author belongs to.
    pub fn create_status(&self, new: &NewStatus, now: DateTime<Utc>) -> Result<Status> {
        if new.media_url.trim().is_empty() {
            return Err(DomainError::validation("Media is required").into());
        }
        if !self.is_group_member(new.group_id, new.user_id)? {
            return Err(DomainError::unauthorized("You must be a member of the group").into());
        }

        let id = StatusId::new();
        self.conn().execute(
            &format!("INSERT INTO statuses ({STATUS_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                id.to_string(),
                new.user_id.to_string(),
                new.group_id.to_string(),
                new.media_url,
                new.media_type.as_str(),
                new.caption,
                new.music_track,
                encode_ts(&now),
            ],
        )?;

        tracing::debug!(status = %id, group = %new.group_id, "status posted");
        load_status(self.conn(), id)
    }

    /// Unexpired statuses of a group, newest first.
    pub fn list_statuses_for_group(&self, group: GroupId, now: DateTime<Utc>) -> Result<Vec<Status>> {
        let ids = {
            let mut stmt = self.conn().prepare(
                "SELECT id FROM statuses
                 WHERE group_id = ?1 AND created_at > ?2
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![group.to_string(), visible_after(now)], |row| {
                let raw: String = row.get(0)?;
                decode_uuid(0, &raw).map(StatusId)
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        ids.into_iter().map(|id| load_status(self.conn(), id)).collect()
    }

    /// A single status, treating expired ones as missing.
    pub fn get_status(&self, id: StatusId, now: DateTime<Utc>) -> Result<Status> {
        let status = load_status(self.conn(), id)?;
        if status.is_expired_at(now) {
            return Err(StoreError::NotFound);
        }
        Ok(status)
    }

    /// Record that `viewer` saw the status. Viewing again changes nothing.
    pub fn view_status(&self, id: StatusId, viewer: UserId, now: DateTime<Utc>) -> Result<Status> {
        self.get_status(id, now).map_err(status_not_found)?;
        self.conn().execute(
            "INSERT OR IGNORE INTO status_viewers (status_id, user_id) VALUES (?1, ?2)",
            params![id.to_string(), viewer.to_string()],
        )?;
        load_status(self.conn(), id)
    }

    /// Delete a status, expired or not. Only its author may do so.
    /// Returns the removed row so the caller can drop its media.
    pub fn delete_status(&self, id: StatusId, caller: UserId) -> Result<Status> {
        let status = load_status(self.conn(), id).map_err(status_not_found)?;
        if status.user_id != caller {
            return Err(DomainError::unauthorized("Unauthorized").into());
        }
        self.conn()
            .execute("DELETE FROM statuses WHERE id = ?1", params![id.to_string()])?;
        Ok(status)
    }

    /// Remove every status whose window has closed and return the media
    /// URLs they referenced.
    pub fn purge_expired_statuses(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("DELETE FROM statuses WHERE created_at <= ?1 RETURNING media_url")?;
        let rows = stmt.query_map(params![visible_after(now)], |row| row.get::<_, String>(0))?;
        let media_urls = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        if !media_urls.is_empty() {
            tracing::info!(removed = media_urls.len(), "purged expired statuses");
        }
        Ok(media_urls)
    }
}

fn status_not_found(e: StoreError) -> StoreError {
    match e {
        StoreError::NotFound => DomainError::not_found("Status not found").into(),
        other => other,
    }
}

fn load_status(conn: &Connection, id: StatusId) -> Result<Status> {
    let mut status = conn
        .query_row(
            &format!("SELECT {STATUS_COLUMNS} FROM statuses WHERE id = ?1"),
            params![id.to_string()],
            row_to_status,
        )
        .map_err(StoreError::from_query)?;

    let mut stmt =
        conn.prepare("SELECT user_id FROM status_viewers WHERE status_id = ?1 ORDER BY seq ASC")?;
    let rows = stmt.query_map(params![id.to_string()], |row| {
        let raw: String = row.get(0)?;
        decode_uuid(0, &raw).map(UserId)
    })?;
    for row in rows {
        status.viewers.push(row?);
    }
    Ok(status)
}

fn row_to_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<Status> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let group_str: String = row.get(2)?;
    let media_type: String = row.get(4)?;
    let created_str: String = row.get(7)?;

    Ok(Status {
        id: StatusId(decode_uuid(0, &id_str)?),
        user_id: UserId(decode_uuid(1, &user_str)?),
        group_id: GroupId(decode_uuid(2, &group_str)?),
        media_url: row.get(3)?,
        media_type: MediaType::from_str_lossy(&media_type),
        caption: row.get(5)?,
        music_track: row.get(6)?,
        viewers: Vec::new(),
        created_at: decode_ts(7, &created_str)?,
    })
}
