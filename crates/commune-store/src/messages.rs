//! Direct conversations and group message streams.
//!
//! A direct message is appended to the single conversation row for its
//! unordered user pair, created on first use. Group messages are
//! partitioned by group id and have no conversation row.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use commune_shared::protocol::{ChatMessage, UserSummary};
use commune_shared::types::{ConversationId, GroupId, MessageId, UserId};
use commune_shared::DomainError;

use crate::database::{decode_ts, decode_uuid, encode_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::Conversation;
use crate::users::user_exists;

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, u.fullname, u.email, m.receiver_id,
        m.group_id, m.body, m.created_at
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

impl Database {
    /// Persist a direct message and append it to the pair's conversation.
    ///
    /// Returns the stored message and its conversation, which is created
    /// here if this is the first message between the two users.
    pub fn insert_direct_message(
        &mut self,
        sender: UserId,
        receiver: UserId,
        body: &str,
    ) -> Result<(ChatMessage, Conversation)> {
        let pair = canonical_pair(sender, receiver)?;
        let tx = self.write_tx()?;

        if !user_exists(&tx, receiver)? {
            return Err(DomainError::not_found("Receiver not found").into());
        }

        let conversation = match find_conversation(&tx, pair)? {
            Some(existing) => existing,
            None => {
                let created = Conversation {
                    id: ConversationId::new(),
                    members: pair,
                    created_at: Utc::now(),
                };
                tx.execute(
                    "INSERT INTO conversations (id, member_a, member_b, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        created.id.to_string(),
                        pair[0].to_string(),
                        pair[1].to_string(),
                        encode_ts(&created.created_at),
                    ],
                )?;
                tracing::debug!(conversation = %created.id, "conversation created");
                created
            }
        };

        let id = insert_message(&tx, sender, Some(receiver), None, body)?;
        tx.execute(
            "INSERT INTO conversation_messages (conversation_id, message_id) VALUES (?1, ?2)",
            params![conversation.id.to_string(), id.to_string()],
        )?;

        let message = load_message(&tx, id)?;
        tx.commit()?;
        Ok((message, conversation))
    }

    /// Persist a message into a group's stream. Only members may post.
    pub fn insert_group_message(
        &mut self,
        sender: UserId,
        group: GroupId,
        body: &str,
    ) -> Result<ChatMessage> {
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

        let member: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group.to_string(), sender.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if member.is_none() {
            return Err(DomainError::unauthorized("You must be a member of the group").into());
        }

        let id = insert_message(&tx, sender, None, Some(group), body)?;
        let message = load_message(&tx, id)?;
        tx.commit()?;
        Ok(message)
    }

    pub fn get_message(&self, id: MessageId) -> Result<ChatMessage> {
        load_message(self.conn(), id)
    }

    /// The conversation between two users, if they have ever exchanged a
    /// message.
    pub fn find_conversation(&self, a: UserId, b: UserId) -> Result<Option<Conversation>> {
        find_conversation(self.conn(), canonical_pair(a, b)?)
    }

    /// Messages between two users in send order. Empty if they never talked.
    pub fn direct_messages(&self, a: UserId, b: UserId) -> Result<Vec<ChatMessage>> {
        let Some(conversation) = self.find_conversation(a, b)? else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn().prepare(&format!(
            "{MESSAGE_SELECT}
             JOIN conversation_messages cm ON cm.message_id = m.id
             WHERE cm.conversation_id = ?1
             ORDER BY cm.seq ASC"
        ))?;
        let rows = stmt.query_map(params![conversation.id.to_string()], row_to_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// A group's message stream in send order.
    pub fn group_messages(&self, group: GroupId) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "{MESSAGE_SELECT}
             WHERE m.group_id = ?1
             ORDER BY m.created_at ASC, m.rowid ASC"
        ))?;
        let rows = stmt.query_map(params![group.to_string()], row_to_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Order a pair so that one row covers both directions.
fn canonical_pair(a: UserId, b: UserId) -> Result<[UserId; 2]> {
    if a == b {
        return Err(DomainError::validation("Cannot message yourself").into());
    }
    Ok(if a < b { [a, b] } else { [b, a] })
}

fn find_conversation(conn: &Connection, pair: [UserId; 2]) -> Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, created_at FROM conversations WHERE member_a = ?1 AND member_b = ?2",
        params![pair[0].to_string(), pair[1].to_string()],
        |row| {
            let id_str: String = row.get(0)?;
            let created_str: String = row.get(1)?;
            Ok(Conversation {
                id: ConversationId(decode_uuid(0, &id_str)?),
                members: pair,
                created_at: decode_ts(1, &created_str)?,
            })
        },
    )
    .optional()
    .map_err(StoreError::Sqlite)
}

fn insert_message(
    conn: &Connection,
    sender: UserId,
    receiver: Option<UserId>,
    group: Option<GroupId>,
    body: &str,
) -> Result<MessageId> {
    let id = MessageId::new();
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, group_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            sender.to_string(),
            receiver.map(|r| r.to_string()),
            group.map(|g| g.to_string()),
            body,
            encode_ts(&Utc::now()),
        ],
    )?;
    Ok(id)
}

fn load_message(conn: &Connection, id: MessageId) -> Result<ChatMessage> {
    conn.query_row(
        &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
        params![id.to_string()],
        row_to_message,
    )
    .map_err(StoreError::from_query)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: Option<String> = row.get(4)?;
    let group_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(7)?;

    Ok(ChatMessage {
        id: MessageId(decode_uuid(0, &id_str)?),
        sender: UserSummary {
            id: UserId(decode_uuid(1, &sender_str)?),
            fullname: row.get(2)?,
            email: row.get(3)?,
        },
        receiver_id: receiver_str
            .map(|s| decode_uuid(4, &s).map(UserId))
            .transpose()?,
        group_id: group_str
            .map(|s| decode_uuid(5, &s).map(GroupId))
            .transpose()?,
        message: row.get(6)?,
        created_at: decode_ts(7, &created_str)?,
    })
}
