//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be returned directly as a JSON
//! response body.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use commune_shared::constants::STATUS_TTL_SECS;
use commune_shared::join::Roster;
use commune_shared::types::{ConversationId, EventId, GroupId, MediaType, StatusId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub fullname: String,
    pub email: String,
    pub profile_pic: String,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub fullname: String,
    pub email: String,
    pub password_hash: String,
    pub profile_pic: String,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A named community. The admin is always among the members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub admin: UserId,
    /// Members in join order.
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Direct-message thread between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    /// Canonical order: `members[0] < members[1]`.
    pub members: [UserId; 2],
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A group event with its attendance roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub group_id: GroupId,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    #[serde(flatten)]
    pub roster: Roster,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create an [`Event`].
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub group_id: GroupId,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: Option<String>,
    pub limit: u32,
    pub created_by: UserId,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Ephemeral media post scoped to a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub id: StatusId,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub media_url: String,
    pub media_type: MediaType,
    pub caption: String,
    pub music_track: String,
    /// Each viewer appears once, in first-view order.
    pub viewers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Status {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(STATUS_TTL_SECS)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Fields needed to create a [`Status`].
#[derive(Debug, Clone)]
pub struct NewStatus {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub media_url: String,
    pub media_type: MediaType,
    pub caption: String,
    pub music_track: String,
}
