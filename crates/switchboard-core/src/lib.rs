// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for switchboard, the human-handoff coordination subsystem.
//!
//! This crate provides the domain types, the channel envelope, the error
//! taxonomy, and the collaborator traits every other crate builds on.

pub mod error;
pub mod lifecycle;
pub mod report;
pub mod traits;
pub mod types;
pub mod wire;

pub use error::{Result, SwitchboardError};
pub use lifecycle::{HandoffAction, transition};
pub use types::{
    Actor, Audience, CustomerId, HandoffRequest, HandoffStatus, Notification, NotificationId,
    OperatorId, OperatorPresence, Party, PendingRating, PresenceStatus, Priority, RatingSubmission,
    RatingTag, RequestId, Role, SessionId, SessionMode, TransferOutcome,
};
pub use wire::{Envelope, message_types};

pub use traits::{
    AssistantApi, ClientStateStore, HandoffApi, NotificationApi, PresenceApi, RatingApi,
    ReportApi, StateKey,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_collaborator_traits_are_exported() {
        fn _assert_handoff<T: HandoffApi>() {}
        fn _assert_assistant<T: AssistantApi>() {}
        fn _assert_presence<T: PresenceApi>() {}
        fn _assert_notify<T: NotificationApi>() {}
        fn _assert_rating<T: RatingApi>() {}
        fn _assert_report<T: ReportApi>() {}
        fn _assert_state<T: ClientStateStore>() {}
    }

    #[test]
    fn state_keys_are_namespaced_by_role() {
        assert_eq!(StateKey::Unread(Role::Operator).as_key(), "unread.operator");
        assert_eq!(StateKey::Unread(Role::Supervisor).as_key(), "unread.supervisor");
        assert_ne!(
            StateKey::Unread(Role::Operator).as_key(),
            StateKey::Unread(Role::Supervisor).as_key()
        );
    }

    #[test]
    fn actor_display() {
        assert_eq!(Actor::operator(OperatorId(3)).to_string(), "operator:3");
        assert_eq!(Actor::customer(CustomerId(9)).to_string(), "customer:9");
    }
}
