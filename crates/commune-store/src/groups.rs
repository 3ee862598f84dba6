//! CRUD operations for [`Group`] records and their member sets.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use commune_shared::types::{GroupId, UserId};
use commune_shared::DomainError;

use crate::database::{decode_ts, decode_uuid, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::Group;

const GROUP_COLUMNS: &str = "id, name, description, image, admin_id, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a group. The admin becomes its first member.
    pub fn create_group(
        &mut self,
        admin: UserId,
        name: &str,
        description: Option<&str>,
        image: Option<&str>,
    ) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("Group name is required").into());
        }

        let tx = self.write_tx()?;

        let taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM chat_groups WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(DomainError::conflict("Group name already exists").into());
        }

        let id = GroupId::new();
        let now = Utc::now();
        tx.execute(
            "INSERT INTO chat_groups (id, name, description, image, admin_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                name,
                description,
                image,
                admin.to_string(),
                encode_ts(&now),
            ],
        )?;
        insert_member(&tx, id, admin)?;

        let group = load_group(&tx, id)?;
        tx.commit()?;

        tracing::info!(group = %id, admin = %admin, "group created");
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_group(&self, id: GroupId) -> Result<Group> {
        load_group(self.conn(), id)
    }

    /// All groups, oldest first.
    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let ids = self.collect_group_ids(
            "SELECT id FROM chat_groups ORDER BY created_at ASC",
            None,
        )?;
        ids.into_iter().map(|id| load_group(self.conn(), id)).collect()
    }

    /// Groups `user` belongs to, oldest first.
    pub fn list_groups_for_member(&self, user: UserId) -> Result<Vec<Group>> {
        let ids = self.collect_group_ids(
            "SELECT g.id FROM chat_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.user_id = ?1
             ORDER BY g.created_at ASC",
            Some(user),
        )?;
        ids.into_iter().map(|id| load_group(self.conn(), id)).collect()
    }

    pub fn is_group_member(&self, group: GroupId, user: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group.to_string(), user.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Add `user` to the group. Joining twice is a conflict.
    pub fn join_group(&mut self, group: GroupId, user: UserId) -> Result<Group> {
        let tx = self.write_tx()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM chat_groups WHERE id = ?1",
                params![group.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DomainError::not_found("Group not found").into());
        }

        if !insert_member(&tx, group, user)? {
            return Err(DomainError::conflict("You are already a member of this group").into());
        }

        let joined = load_group(&tx, group)?;
        tx.commit()?;

        tracing::debug!(group = %group, user = %user, "joined group");
        Ok(joined)
    }

    fn collect_group_ids(&self, sql: &str, user: Option<UserId>) -> Result<Vec<GroupId>> {
        let mut stmt = self.conn().prepare(sql)?;
        let map = |row: &rusqlite::Row<'_>| {
            let raw: String = row.get(0)?;
            decode_uuid(0, &raw).map(GroupId)
        };
        let rows = match user {
            Some(user) => stmt.query_map(params![user.to_string()], map)?,
            None => stmt.query_map([], map)?,
        };
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns `false` if the user was already a member.
fn insert_member(conn: &Connection, group: GroupId, user: UserId) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
         VALUES (?1, ?2, ?3)",
        params![group.to_string(), user.to_string(), encode_ts(&Utc::now())],
    )?;
    Ok(inserted > 0)
}

fn load_group(conn: &Connection, id: GroupId) -> Result<Group> {
    let mut group = conn
        .query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM chat_groups WHERE id = ?1"),
            params![id.to_string()],
            row_to_group,
        )
        .map_err(StoreError::from_query)?;

    let mut stmt = conn.prepare(
        "SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY joined_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![id.to_string()], |row| {
        let raw: String = row.get(0)?;
        decode_uuid(0, &raw).map(UserId)
    })?;
    for row in rows {
        group.members.push(row?);
    }
    Ok(group)
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id_str: String = row.get(0)?;
    let admin_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(Group {
        id: GroupId(decode_uuid(0, &id_str)?),
        name: row.get(1)?,
        description: row.get(2)?,
        image: row.get(3)?,
        admin: UserId(decode_uuid(4, &admin_str)?),
        members: Vec::new(),
        created_at: decode_ts(5, &created_str)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::users::tests::new_user;

    #[test]
    fn admin_is_first_member() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");

        let group = db
            .create_group(alice.id, "Hikers", Some("weekend trips"), None)
            .unwrap();
        assert_eq!(group.admin, alice.id);
        assert_eq!(group.members, vec![alice.id]);
        assert_eq!(db.get_group(group.id).unwrap(), group);
    }

    #[test]
    fn names_are_unique() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        db.create_group(alice.id, "Hikers", None, None).unwrap();

        let err = db.create_group(alice.id, "Hikers", None, None).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Conflict(_))));
        assert_eq!(db.list_groups().unwrap().len(), 1);
    }

    #[test]
    fn blank_name_is_invalid() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let err = db.create_group(alice.id, "  ", None, None).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Validation(_))));
    }

    #[test]
    fn second_join_is_conflict_and_leaves_members_unchanged() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let group = db.create_group(alice.id, "Hikers", None, None).unwrap();

        let joined = db.join_group(group.id, bob.id).unwrap();
        assert_eq!(joined.members, vec![alice.id, bob.id]);

        let err = db.join_group(group.id, bob.id).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Conflict(_))));
        assert_eq!(db.get_group(group.id).unwrap().members.len(), 2);

        let err = db.join_group(group.id, alice.id).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::Conflict(_))));
    }

    #[test]
    fn join_unknown_group_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let bob = new_user(&db, "Bob");
        let err = db.join_group(GroupId::new(), bob.id).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(DomainError::NotFound(_))));
    }

    #[test]
    fn membership_queries() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = new_user(&db, "Alice");
        let bob = new_user(&db, "Bob");
        let hikers = db.create_group(alice.id, "Hikers", None, None).unwrap();
        let cooks = db.create_group(bob.id, "Cooks", None, None).unwrap();

        assert!(db.is_group_member(hikers.id, alice.id).unwrap());
        assert!(!db.is_group_member(hikers.id, bob.id).unwrap());

        let mine: Vec<GroupId> = db
            .list_groups_for_member(bob.id)
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(mine, vec![cooks.id]);
        assert_eq!(db.list_groups().unwrap().len(), 2);
    }
}
