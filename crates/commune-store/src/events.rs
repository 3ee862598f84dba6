//! Events and the join-request workflow.
//!
//! Every roster mutation loads the event inside an immediate write
//! transaction, applies the transition through [`Roster`], and writes back
//! only the rows that changed. Attendee promotion is additionally guarded by
//! a conditional insert that re-checks the capacity in SQL.
//!
//! [`Roster`]: commune_shared::join::Roster

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use commune_shared::join::{JoinDecision, JoinRequest, RequestStatus, Resolution, Roster};
use commune_shared::types::{EventId, GroupId, UserId};
use commune_shared::DomainError;

use crate::database::{decode_ts, decode_uuid, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{Event, NewEvent};

const EVENT_COLUMNS: &str =
    "id, group_id, title, description, date, location, attendee_limit, created_by, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create / delete
    // ------------------------------------------------------------------

    /// Create an event in a group the creator belongs to. The creator is
    /// recorded as the first attendee.
    pub fn create_event(&mut self, new: &NewEvent) -> Result<Event> {
        if new.title.trim().is_empty() {
            return Err(DomainError::validation("Title is required").into());
        }

        let tx = self.write_tx()?;

        let group_exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM chat_groups WHERE id = ?1",
                params![new.group_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if group_exists.is_none() {
            return Err(DomainError::not_found("Group not found").into());
        }

        let member: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![new.group_id.to_string(), new.created_by.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if member.is_none() {
            return Err(DomainError::unauthorized(
                "You must be a member of the group to create an event",
            )
            .into());
        }

        let id = EventId::new();
        tx.execute(
            &format!("INSERT INTO events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                id.to_string(),
                new.group_id.to_string(),
                new.title.trim(),
                new.description,
                encode_ts(&new.date),
                new.location,
                new.limit,
                new.created_by.to_string(),
                encode_ts(&Utc::now()),
            ],
        )?;
        tx.execute(
            "INSERT INTO event_attendees (event_id, user_id) VALUES (?1, ?2)",
            params![id.to_string(), new.created_by.to_string()],
        )?;

        let event = load_event(&tx, id)?;
        tx.commit()?;

        tracing::info!(event = %id, group = %new.group_id, limit = new.limit, "event created");
        Ok(event)
    }

    /// Delete an event. Only its creator may do so.
    pub fn delete_event(&mut self, id: EventId, caller: UserId) -> Result<()> {
        let tx = self.write_tx()?;
        let event = load_event_or_reject(&tx, id)?;
        if event.roster.created_by != caller {
            return Err(DomainError::unauthorized("Unauthorized").into());
        }
        tx.execute("DELETE FROM events WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_event(&self, id: EventId) -> Result<Event> {
        load_event(self.conn(), id)
    }

    /// Events of one group, soonest first.
    pub fn list_events_for_group(&self, group: GroupId) -> Result<Vec<Event>> {
        self.collect_events(
            "SELECT id FROM events WHERE group_id = ?1 ORDER BY date ASC",
            Some(group),
        )
    }

    /// All events, soonest first.
    pub fn list_events(&self) -> Result<Vec<Event>> {
        self.collect_events("SELECT id FROM events ORDER BY date ASC", None)
    }

    fn collect_events(&self, sql: &str, group: Option<GroupId>) -> Result<Vec<Event>> {
        let ids = {
            let mut stmt = self.conn().prepare(sql)?;
            let map = |row: &rusqlite::Row<'_>| {
                let raw: String = row.get(0)?;
                decode_uuid(0, &raw).map(EventId)
            };
            let rows = match group {
                Some(group) => stmt.query_map(params![group.to_string()], map)?,
                None => stmt.query_map([], map)?,
            };
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        ids.into_iter().map(|id| load_event(self.conn(), id)).collect()
    }

    // ------------------------------------------------------------------
    // Join requests
    // ------------------------------------------------------------------

    /// File a pending request to attend `event`.
    pub fn request_join(&mut self, event: EventId, user: UserId, reason: &str) -> Result<JoinRequest> {
        let tx = self.write_tx()?;
        let mut loaded = load_event_or_reject(&tx, event)?;

        let request = loaded.roster.request_join(user, reason, Utc::now())?.clone();
        tx.execute(
            "INSERT INTO event_requests (event_id, user_id, reason, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.to_string(),
                user.to_string(),
                request.reason,
                request.status.as_str(),
                encode_ts(&request.created_at),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(event = %event, user = %user, "join request filed");
        Ok(request)
    }

    /// Approve or reject a pending request. Creator only.
    ///
    /// On [`Resolution::Full`] the request has still been removed and the
    /// change is committed; the caller reports the capacity conflict.
    pub fn handle_join_request(
        &mut self,
        event: EventId,
        caller: UserId,
        requester: UserId,
        decision: JoinDecision,
    ) -> Result<(Event, Resolution)> {
        let tx = self.write_tx()?;
        let mut loaded = load_event_or_reject(&tx, event)?;

        let mut resolution = loaded.roster.handle_request(&caller, &requester, decision)?;

        tx.execute(
            "DELETE FROM event_requests WHERE event_id = ?1 AND user_id = ?2",
            params![event.to_string(), requester.to_string()],
        )?;

        if resolution == Resolution::Admitted {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO event_attendees (event_id, user_id)
                 SELECT e.id, ?2 FROM events e
                 WHERE e.id = ?1
                   AND (e.attendee_limit = 0
                        OR (SELECT COUNT(*) FROM event_attendees a WHERE a.event_id = e.id)
                           < e.attendee_limit)",
                params![event.to_string(), requester.to_string()],
            )?;
            if inserted == 0 {
                resolution = Resolution::Full;
            }
        }

        let updated = load_event(&tx, event)?;
        tx.commit()?;

        tracing::info!(
            event = %event,
            requester = %requester,
            ?decision,
            ?resolution,
            attendees = updated.roster.attendees.len(),
            "join request handled"
        );
        Ok((updated, resolution))
    }

    /// Pending requests of `event`. Creator only.
    pub fn pending_requests(&self, event: EventId, caller: UserId) -> Result<Vec<JoinRequest>> {
        let loaded = load_event_or_reject(self.conn(), event)?;
        Ok(loaded.roster.pending_requests(&caller)?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_event_or_reject(conn: &Connection, id: EventId) -> Result<Event> {
    load_event(conn, id).map_err(|e| match e {
        StoreError::NotFound => DomainError::not_found("Event not found").into(),
        other => other,
    })
}

fn load_event(conn: &Connection, id: EventId) -> Result<Event> {
    let mut event = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![id.to_string()],
            row_to_event,
        )
        .map_err(StoreError::from_query)?;

    let mut stmt =
        conn.prepare("SELECT user_id FROM event_attendees WHERE event_id = ?1 ORDER BY seq ASC")?;
    let rows = stmt.query_map(params![id.to_string()], |row| {
        let raw: String = row.get(0)?;
        decode_uuid(0, &raw).map(UserId)
    })?;
    for row in rows {
        event.roster.attendees.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT user_id, reason, created_at FROM event_requests
         WHERE event_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![id.to_string()], |row| {
        let user_str: String = row.get(0)?;
        let created_str: String = row.get(2)?;
        Ok(JoinRequest {
            user_id: UserId(decode_uuid(0, &user_str)?),
            reason: row.get(1)?,
            status: RequestStatus::Pending,
            created_at: decode_ts(2, &created_str)?,
        })
    })?;
    for row in rows {
        event.roster.requests.push(row?);
    }

    Ok(event)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let id_str: String = row.get(0)?;
    let group_str: String = row.get(1)?;
    let date_str: String = row.get(4)?;
    let creator_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;

    Ok(Event {
        id: EventId(decode_uuid(0, &id_str)?),
        group_id: GroupId(decode_uuid(1, &group_str)?),
        title: row.get(2)?,
        description: row.get(3)?,
        date: decode_ts(4, &date_str)?,
        location: row.get(5)?,
        roster: Roster {
            created_by: UserId(decode_uuid(7, &creator_str)?),
            limit: row.get(6)?,
            attendees: Vec::new(),
            requests: Vec::new(),
        },
        created_at: decode_ts(8, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::users::tests::new_user;
    use commune_shared::join::JoinState;

    fn setup(limit: u32) -> (Database, User, User, Event) {
        let mut db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let group = db.create_group(alice.id, "Hikers", None, None).unwrap();
        db.join_group(group.id, bob.id).unwrap();

        let event = db
            .create_event(&NewEvent {
                group_id: group.id,
                title: "Ridge walk".into(),
                description: "Early start".into(),
                date: Utc::now(),
                location: Some("Trailhead".into()),
                limit,
                created_by: alice.id,
            })
            .unwrap();
        (db, alice, bob, event)
    }

    #[test]
    fn creator_attends_new_event() {
        let (db, alice, _, event) = setup(0);
        assert_eq!(event.roster.attendees, vec![alice.id]);
        assert_eq!(db.get_event(event.id).unwrap(), event);
    }

    #[test]
    fn non_member_cannot_create_event() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let carol = new_user(&db, "Carol");
        let group = db.create_group(alice.id, "Hikers", None, None).unwrap();

        let err = db
            .create_event(&NewEvent {
                group_id: group.id,
                title: "Party".into(),
                description: String::new(),
                date: Utc::now(),
                location: None,
                limit: 0,
                created_by: carol.id,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Unauthorized(_))));
        assert!(db.list_events().unwrap().is_empty());
    }

    #[test]
    fn request_and_approve() {
        let (mut db, alice, bob, event) = setup(0);

        db.request_join(event.id, bob.id, "interested").unwrap();
        let pending = db.pending_requests(event.id, alice.id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_id, bob.id);

        let (updated, resolution) = db
            .handle_join_request(event.id, alice.id, bob.id, JoinDecision::Approved)
            .unwrap();
        assert_eq!(resolution, Resolution::Admitted);
        assert_eq!(updated.roster.attendees, vec![alice.id, bob.id]);
        assert!(updated.roster.requests.is_empty());
    }

    #[test]
    fn full_event_approval_removes_request() {
        // limit 1: the creator holds the only seat.
        let (mut db, alice, bob, event) = setup(1);

        // Bypass the request-time check to model a request filed before the
        // event filled up.
        db.conn()
            .execute(
                "INSERT INTO event_requests (event_id, user_id, reason, status, created_at)
                 VALUES (?1, ?2, 'interested', 'pending', ?3)",
                params![event.id.to_string(), bob.id.to_string(), encode_ts(&Utc::now())],
            )
            .unwrap();
        assert_eq!(db.get_event(event.id).unwrap().roster.requests.len(), 1);

        let (updated, resolution) = db
            .handle_join_request(event.id, alice.id, bob.id, JoinDecision::Approved)
            .unwrap();
        assert_eq!(resolution, Resolution::Full);
        assert_eq!(updated.roster.attendees, vec![alice.id]);
        assert_eq!(updated.roster.state_of(&bob.id), JoinState::None);

        let stored = db.get_event(event.id).unwrap();
        assert!(stored.roster.requests.is_empty());
    }

    #[test]
    fn request_at_capacity_is_conflict() {
        let (mut db, _, bob, event) = setup(1);
        let err = db.request_join(event.id, bob.id, "interested").unwrap_err();
        assert_eq!(
            err.to_string(),
            DomainError::conflict("Event is full").to_string()
        );
        assert!(db.get_event(event.id).unwrap().roster.requests.is_empty());
    }

    #[test]
    fn one_pending_request_per_user() {
        let (mut db, _, bob, event) = setup(0);
        db.request_join(event.id, bob.id, "first").unwrap();
        let err = db.request_join(event.id, bob.id, "second").unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Conflict(_))));
        assert_eq!(db.get_event(event.id).unwrap().roster.requests.len(), 1);
    }

    #[test]
    fn only_creator_sees_and_handles_requests() {
        let (mut db, _, bob, event) = setup(0);
        db.request_join(event.id, bob.id, "hi").unwrap();
        let before = db.get_event(event.id).unwrap();

        let err = db.pending_requests(event.id, bob.id).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Unauthorized(_))));

        let err = db
            .handle_join_request(event.id, bob.id, bob.id, JoinDecision::Approved)
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Unauthorized(_))));

        assert_eq!(db.get_event(event.id).unwrap(), before);
    }

    #[test]
    fn reject_allows_new_request() {
        let (mut db, alice, bob, event) = setup(0);
        db.request_join(event.id, bob.id, "hi").unwrap();
        let (_, resolution) = db
            .handle_join_request(event.id, alice.id, bob.id, JoinDecision::Rejected)
            .unwrap();
        assert_eq!(resolution, Resolution::Rejected);
        db.request_join(event.id, bob.id, "please").unwrap();
    }

    #[test]
    fn unknown_event_is_not_found() {
        let (mut db, _, bob, _) = setup(0);
        let err = db.request_join(EventId::new(), bob.id, "hi").unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::NotFound(_))));
    }

    #[test]
    fn capacity_holds_across_many_approvals() {
        let (mut db, alice, _, event) = setup(3);
        let group = event.group_id;

        let mut users = Vec::new();
        for i in 0..5 {
            let user = new_user(&db, &format!("User{i}"));
            db.join_group(group, user.id).unwrap();
            users.push(user);
        }
        for user in &users {
            db.request_join(event.id, user.id, "let me in").unwrap();
        }
        for user in &users {
            let _ = db.handle_join_request(event.id, alice.id, user.id, JoinDecision::Approved);
            assert!(db.get_event(event.id).unwrap().roster.attendees.len() <= 3);
        }
        let stored = db.get_event(event.id).unwrap();
        assert_eq!(stored.roster.attendees.len(), 3);
        assert!(stored.roster.requests.is_empty());
    }

    #[test]
    fn delete_is_creator_only() {
        let (mut db, alice, bob, event) = setup(0);
        db.request_join(event.id, bob.id, "hi").unwrap();

        let err = db.delete_event(event.id, bob.id).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Unauthorized(_))));

        db.delete_event(event.id, alice.id).unwrap();
        assert!(matches!(db.get_event(event.id), Err(StoreError::NotFound)));
        assert!(db.list_events_for_group(event.group_id).unwrap().is_empty());
    }
}
