use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GroupId, MessageId, MessageTarget, UserId};

/// Public display attributes of a user, attached to pushed messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub fullname: String,
    pub email: String,
}

/// A persisted chat message with its sender's display attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: UserSummary,
    /// Set for direct messages.
    pub receiver_id: Option<UserId>,
    /// Set for group messages.
    pub group_id: Option<GroupId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Recover the addressing of a stored message.
    pub fn target(&self) -> Option<MessageTarget> {
        match (self.receiver_id, self.group_id) {
            (Some(user), None) => Some(MessageTarget::Direct(user)),
            (None, Some(group)) => Some(MessageTarget::Group(group)),
            _ => None,
        }
    }
}

/// Frames a realtime client sends over its socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Subscribe this connection to a group channel.
    #[serde(rename_all = "camelCase")]
    JoinGroup { group_id: GroupId },

    /// Unsubscribe this connection from a group channel.
    #[serde(rename_all = "camelCase")]
    LeaveGroup { group_id: GroupId },

    Ping,
}

/// Frames the server pushes to a realtime client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// A message addressed to this user or to a group channel it joined.
    NewMessage { message: ChatMessage },

    /// Everyone currently connected. Sent on every connect/disconnect.
    OnlineUsers { users: Vec<UserId> },

    #[serde(rename_all = "camelCase")]
    Joined { group_id: GroupId },

    #[serde(rename_all = "camelCase")]
    Left { group_id: GroupId },

    #[serde(rename_all = "camelCase")]
    Pong { server_time: DateTime<Utc> },

    Error { error: String },
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientFrame {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
