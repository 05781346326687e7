// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for handoff requests, operator presence, ratings, and notifications.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a handoff request. Immutable once created.
    RequestId
);
opaque_id!(
    /// Identifier of a chat conversation.
    SessionId
);
opaque_id!(
    /// Identifier of a human operator.
    OperatorId
);
opaque_id!(
    /// Identifier of a customer.
    CustomerId
);
opaque_id!(
    /// Identifier of a persisted notification.
    NotificationId
);

/// The kind of actor a client process acts as.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Customer,
    Operator,
    Supervisor,
}

/// An authenticated participant: a role plus the id within that role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    pub id: u64,
}

impl Actor {
    pub fn customer(id: CustomerId) -> Self {
        Self {
            role: Role::Customer,
            id: id.0,
        }
    }

    pub fn operator(id: OperatorId) -> Self {
        Self {
            role: Role::Operator,
            id: id.0,
        }
    }

    pub fn supervisor(id: u64) -> Self {
        Self {
            role: Role::Supervisor,
            id,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

/// Lifecycle status of a [`HandoffRequest`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HandoffStatus {
    Pending,
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Closed,
    Cancelled,
    FallbackTicket,
}

impl HandoffStatus {
    /// Terminal statuses are absorbing: nothing transitions out of them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Closed | Self::Cancelled | Self::FallbackTicket
        )
    }

    /// A live human conversation is running.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress)
    }

    /// Statuses in which `assigned_operator_id` must be present.
    pub fn holds_operator(self) -> bool {
        matches!(self, Self::Assigned | Self::Accepted | Self::InProgress)
    }

    /// The customer is waiting for an operator.
    pub fn is_waiting(self) -> bool {
        matches!(self, Self::Pending | Self::Assigned)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Which party ended a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Party {
    Customer,
    Operator,
    System,
}

/// Who is currently answering a session. Always derived, never stored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    AiServed,
    HumanServed,
}

/// A request to move a session from the assistant to a human operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    pub id: RequestId,
    pub session_id: SessionId,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: HandoffStatus,
    #[serde(default)]
    pub priority: Priority,
    /// Advisory, 1-based.
    #[serde(default)]
    pub queue_position: Option<u32>,
    /// Advisory.
    #[serde(default)]
    pub estimated_wait_seconds: Option<u64>,
    #[serde(default)]
    pub assigned_operator_id: Option<OperatorId>,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub ended_by: Option<Party>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the server on every change; 0 when the server does not track it.
    #[serde(default)]
    pub revision: u64,
}

impl HandoffRequest {
    /// `assigned_operator_id` is present exactly when the status holds an operator.
    pub fn operator_consistent(&self) -> bool {
        self.assigned_operator_id.is_some() == self.status.holds_operator()
    }
}

/// Result of a transfer request: either a live queued request or a fallback ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Queued(HandoffRequest),
    Fallback {
        request: HandoffRequest,
        ticket_id: String,
    },
}

impl TransferOutcome {
    /// Classify an admission-control response.
    pub fn from_request(request: HandoffRequest) -> Result<Self> {
        match request.status {
            HandoffStatus::FallbackTicket => {
                let ticket_id = request.ticket_id.clone().ok_or_else(|| SwitchboardError::Api {
                    message: format!("fallback for request {} carries no ticket reference", request.id),
                    status: None,
                })?;
                Ok(Self::Fallback { request, ticket_id })
            }
            HandoffStatus::Pending | HandoffStatus::Assigned => Ok(Self::Queued(request)),
            other => Err(SwitchboardError::Api {
                message: format!("admission returned unexpected status {other}"),
                status: None,
            }),
        }
    }

    pub fn request(&self) -> &HandoffRequest {
        match self {
            Self::Queued(request) | Self::Fallback { request, .. } => request,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

/// Availability and load of one operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorPresence {
    pub operator_id: OperatorId,
    pub status: PresenceStatus,
    pub current_session_count: u32,
    pub max_session_count: u32,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub senior: bool,
    #[serde(default)]
    pub auto_accept: bool,
    /// Bumped by the server on every change; 0 when the server does not track it.
    #[serde(default)]
    pub revision: u64,
}

impl OperatorPresence {
    /// New, offline operator with no load.
    pub fn new(operator_id: OperatorId, max_session_count: u32) -> Self {
        Self {
            operator_id,
            status: PresenceStatus::Offline,
            current_session_count: 0,
            max_session_count,
            last_active_at: Utc::now(),
            skills: Vec::new(),
            senior: false,
            auto_accept: false,
            revision: 0,
        }
    }

    /// Whether `other` is an older snapshot than this one.
    pub fn supersedes(&self, other: &OperatorPresence) -> bool {
        self.revision > 0 && other.revision > 0 && other.revision < self.revision
    }

    pub fn can_accept(&self) -> bool {
        self.status == PresenceStatus::Online
            && self.current_session_count < self.max_session_count
    }

    /// Fraction of capacity in use, 0.0 to 1.0.
    pub fn load(&self) -> f64 {
        if self.max_session_count == 0 {
            return 1.0;
        }
        (self.current_session_count as f64 / self.max_session_count as f64).min(1.0)
    }
}

/// Predefined rating labels.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum RatingTag {
    #[serde(rename = "responsive")]
    #[strum(serialize = "responsive")]
    Responsive,
    #[serde(rename = "professional")]
    #[strum(serialize = "professional")]
    Professional,
    #[serde(rename = "friendly")]
    #[strum(serialize = "friendly")]
    Friendly,
    #[serde(rename = "resolved")]
    #[strum(serialize = "resolved")]
    Resolved,
    #[serde(rename = "long wait")]
    #[strum(serialize = "long wait")]
    LongWait,
    #[serde(rename = "unresolved")]
    #[strum(serialize = "unresolved")]
    Unresolved,
}

/// A customer's rating of a completed handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSubmission {
    pub handoff_request_id: RequestId,
    pub score: u8,
    #[serde(default)]
    pub tags: Vec<RatingTag>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RatingSubmission {
    pub const MIN_SCORE: u8 = 1;
    pub const MAX_SCORE: u8 = 5;

    /// Check the score range, tag uniqueness, and comment length.
    pub fn validate(&self, max_comment_len: usize) -> Result<()> {
        if !(Self::MIN_SCORE..=Self::MAX_SCORE).contains(&self.score) {
            return Err(SwitchboardError::Validation(format!(
                "rating score must be between {} and {}, got {}",
                Self::MIN_SCORE,
                Self::MAX_SCORE,
                self.score
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for tag in &self.tags {
            if !seen.insert(tag) {
                return Err(SwitchboardError::Validation(format!(
                    "rating tag `{tag}` given more than once"
                )));
            }
        }
        if let Some(comment) = &self.comment {
            let len = comment.chars().count();
            if len > max_comment_len {
                return Err(SwitchboardError::Validation(format!(
                    "rating comment is {len} characters, limit is {max_comment_len}"
                )));
            }
        }
        Ok(())
    }
}

/// Answer to "is there a rating to collect for this session".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRating {
    pub need_rating: bool,
    pub session_id: SessionId,
    #[serde(default)]
    pub handoff_request_id: Option<RequestId>,
    #[serde(default)]
    pub operator_id: Option<OperatorId>,
}

impl PendingRating {
    pub fn none(session_id: SessionId) -> Self {
        Self {
            need_rating: false,
            session_id,
            handoff_request_id: None,
            operator_id: None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
    Operators,
    Supervisors,
    All,
}

impl Audience {
    pub fn includes(self, role: Role) -> bool {
        match self {
            Self::Operators => role == Role::Operator,
            Self::Supervisors => role == Role::Supervisor,
            Self::All => role != Role::Customer,
        }
    }
}

/// A persisted broadcast notification, as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub content: String,
    pub audience: Audience,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}
