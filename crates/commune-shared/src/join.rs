//! Event admission workflow.
//!
//! Each (event, user) pair moves through `none -> pending -> {attending, none}`.
//! [`Roster`] holds the attendee set and the pending requests of one event and
//! enforces every transition rule; the store wraps each call in a
//! transaction so the read-modify-write is atomic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::types::UserId;

/// Where a user stands with respect to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinState {
    None,
    Pending,
    Attending,
}

/// The creator's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinDecision {
    Approved,
    Rejected,
}

/// Stored requests are always pending; decided ones are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: UserId,
    pub reason: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// What `handle_request` did with the request it removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Requester moved into the attendee set.
    Admitted,
    /// Creator declined; requester may ask again.
    Rejected,
    /// Creator approved but the event filled after the request was filed.
    /// The request is gone and the requester is back to `none`.
    Full,
}

/// Attendance bookkeeping for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub created_by: UserId,
    /// Attendee cap; `0` means unlimited.
    pub limit: u32,
    pub attendees: Vec<UserId>,
    pub requests: Vec<JoinRequest>,
}

impl Roster {
    /// A fresh roster. The creator attends implicitly.
    pub fn new(created_by: UserId, limit: u32) -> Self {
        Self {
            created_by,
            limit,
            attendees: vec![created_by],
            requests: Vec::new(),
        }
    }

    pub fn state_of(&self, user: &UserId) -> JoinState {
        if self.attendees.contains(user) {
            JoinState::Attending
        } else if self.requests.iter().any(|r| r.user_id == *user) {
            JoinState::Pending
        } else {
            JoinState::None
        }
    }

    /// Capacity counts attendees only, never pending requests.
    pub fn is_full(&self) -> bool {
        self.limit > 0 && self.attendees.len() >= self.limit as usize
    }

    /// `none -> pending`.
    pub fn request_join(
        &mut self,
        user: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<&JoinRequest, DomainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("Reason is required"));
        }

        match self.state_of(&user) {
            JoinState::Attending => return Err(DomainError::conflict("Already joined")),
            JoinState::Pending => return Err(DomainError::conflict("Request already pending")),
            JoinState::None => {}
        }

        if self.is_full() {
            return Err(DomainError::conflict("Event is full"));
        }

        self.requests.push(JoinRequest {
            user_id: user,
            reason: reason.to_string(),
            status: RequestStatus::Pending,
            created_at: now,
        });
        Ok(&self.requests[self.requests.len() - 1])
    }

    /// Pending requests, visible to the creator only.
    pub fn pending_requests(&self, caller: &UserId) -> Result<&[JoinRequest], DomainError> {
        self.ensure_creator(caller)?;
        Ok(&self.requests)
    }

    /// `pending -> attending` or `pending -> none`.
    ///
    /// The request is removed on every successful path, including
    /// [`Resolution::Full`]; the caller decides how to report that outcome.
    pub fn handle_request(
        &mut self,
        caller: &UserId,
        requester: &UserId,
        decision: JoinDecision,
    ) -> Result<Resolution, DomainError> {
        self.ensure_creator(caller)?;

        let before = self.requests.len();
        self.requests.retain(|r| r.user_id != *requester);
        if self.requests.len() == before {
            return Err(DomainError::not_found("Join request not found"));
        }

        match decision {
            JoinDecision::Rejected => Ok(Resolution::Rejected),
            JoinDecision::Approved if self.is_full() => Ok(Resolution::Full),
            JoinDecision::Approved => {
                if !self.attendees.contains(requester) {
                    self.attendees.push(*requester);
                }
                Ok(Resolution::Admitted)
            }
        }
    }

    fn ensure_creator(&self, caller: &UserId) -> Result<(), DomainError> {
        if *caller != self.created_by {
            return Err(DomainError::unauthorized("Unauthorized"));
        }
        Ok(())
    }
}
