//! Message delivery: persist first, then push to whoever is listening.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use commune_shared::constants::MAX_MESSAGE_LEN;
use commune_shared::protocol::{ChatMessage, ServerFrame};
use commune_shared::types::{MessageTarget, UserId};
use commune_shared::DomainError;
use commune_store::Database;

use crate::error::{OrNotFound, ServerError};
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomTracker;

#[derive(Clone)]
pub struct Dispatcher {
    db: Arc<Mutex<Database>>,
    registry: ConnectionRegistry,
    rooms: RoomTracker,
}

impl Dispatcher {
    pub fn new(db: Arc<Mutex<Database>>, registry: ConnectionRegistry, rooms: RoomTracker) -> Self {
        Self {
            db,
            registry,
            rooms,
        }
    }

    /// Store a message and notify its live recipients.
    ///
    /// The message is durable before any push is attempted, and a failed
    /// push never fails the send.
    pub async fn send(
        &self,
        sender: UserId,
        target: MessageTarget,
        body: &str,
    ) -> Result<ChatMessage, ServerError> {
        let body = validate_body(body)?;

        let message = {
            let mut db = self.db.lock().await;
            match target {
                MessageTarget::Direct(receiver) => {
                    db.insert_direct_message(sender, receiver, body)?.0
                }
                MessageTarget::Group(group) => db.insert_group_message(sender, group, body)?,
            }
        };

        let delivered = self.deliver(&message, target).await;
        debug!(
            message = %message.id,
            sender = %sender.short(),
            %target,
            delivered,
            "Message sent"
        );
        Ok(message)
    }

    /// Push an already stored message. Returns how many connections took it.
    pub async fn deliver(&self, message: &ChatMessage, target: MessageTarget) -> usize {
        let frame = ServerFrame::NewMessage {
            message: message.clone(),
        };

        match target {
            MessageTarget::Direct(receiver) => match self.registry.lookup(receiver).await {
                Some(handle) => usize::from(handle.push(frame)),
                None => 0,
            },
            MessageTarget::Group(group) => self
                .rooms
                .members_of(group)
                .await
                .into_iter()
                .filter(|handle| handle.push(frame.clone()))
                .count(),
        }
    }

    /// History visible to `caller` for a target.
    pub async fn fetch(
        &self,
        caller: UserId,
        target: MessageTarget,
    ) -> Result<Vec<ChatMessage>, ServerError> {
        let db = self.db.lock().await;
        match target {
            MessageTarget::Direct(other) => Ok(db.direct_messages(caller, other)?),
            MessageTarget::Group(group) => {
                let group = db.get_group(group).or_not_found("Group not found")?;
                if !group.is_member(&caller) {
                    return Err(
                        DomainError::unauthorized("You must be a member of the group").into(),
                    );
                }
                Ok(db.group_messages(group.id)?)
            }
        }
    }
}

fn validate_body(body: &str) -> Result<&str, ServerError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ServerError::bad_request("Message is required"));
    }
    if body.len() > MAX_MESSAGE_LEN {
        return Err(ServerError::bad_request(format!(
            "Message too long: {} bytes (max {MAX_MESSAGE_LEN})",
            body.len()
        )));
    }
    Ok(body)
}
