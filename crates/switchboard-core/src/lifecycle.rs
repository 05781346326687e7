// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The handoff request lifecycle graph.
//!
//! ```text
//! (none) --request--> PENDING
//! PENDING --assign--> ASSIGNED
//! PENDING --no capacity--> FALLBACK_TICKET
//! PENDING|ASSIGNED --accept--> ACCEPTED        (PENDING: atomic claim)
//! ASSIGNED --reject--> PENDING (requeued) | CANCELLED (no operator left)
//! ASSIGNED --release--> PENDING                (assignee went offline)
//! ACCEPTED --first message--> IN_PROGRESS
//! ACCEPTED|IN_PROGRESS --complete--> COMPLETED
//! PENDING|ASSIGNED --cancel--> CANCELLED
//! any non-terminal --close--> CLOSED
//! ```
//!
//! [`transition`] is the only encoding of this graph. Terminal statuses are
//! absorbing: every action on them is rejected.

use crate::error::{Result, SwitchboardError};
use crate::types::HandoffStatus;

/// An intent applied to a handoff request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum HandoffAction {
    Assign,
    NoCapacity,
    Accept,
    /// Operator declined; `requeue` is false when no other operator remains.
    Reject { requeue: bool },
    /// Assignment withdrawn without a decision.
    Release,
    FirstMessage,
    Complete,
    Cancel,
    Close,
}

impl HandoffAction {
    /// Whether `status` is what this action produces, so repeating it is a no-op.
    ///
    /// Accept is only a no-op for the operator who won; callers check that.
    pub fn already_applied(self, status: HandoffStatus) -> bool {
        match self {
            Self::Accept => status.is_live(),
            Self::Complete => status == HandoffStatus::Completed,
            Self::Cancel => status == HandoffStatus::Cancelled,
            Self::Close => status == HandoffStatus::Closed,
            Self::NoCapacity => status == HandoffStatus::FallbackTicket,
            Self::FirstMessage => status == HandoffStatus::InProgress,
            Self::Assign | Self::Reject { .. } | Self::Release => false,
        }
    }
}

/// Apply `action` to `status`.
pub fn transition(status: HandoffStatus, action: HandoffAction) -> Result<HandoffStatus> {
    use HandoffAction as A;
    use HandoffStatus as S;

    if status.is_terminal() {
        return Err(invalid(status, action));
    }

    let next = match (status, action) {
        (S::Pending, A::Assign) => S::Assigned,
        (S::Pending, A::NoCapacity) => S::FallbackTicket,
        (S::Pending | S::Assigned, A::Accept) => S::Accepted,
        (S::Assigned, A::Reject { requeue: true }) => S::Pending,
        (S::Assigned, A::Reject { requeue: false }) => S::Cancelled,
        (S::Assigned, A::Release) => S::Pending,
        (S::Accepted, A::FirstMessage) => S::InProgress,
        (S::Accepted | S::InProgress, A::Complete) => S::Completed,
        (S::Pending | S::Assigned, A::Cancel) => S::Cancelled,
        (_, A::Close) => S::Closed,
        _ => return Err(invalid(status, action)),
    };
    Ok(next)
}

fn invalid(status: HandoffStatus, action: HandoffAction) -> SwitchboardError {
    SwitchboardError::InvalidTransition {
        request_id: None,
        message: format!("cannot {action} a request that is {status}"),
    }
}
