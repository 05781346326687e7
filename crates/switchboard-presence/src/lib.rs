// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator presence for switchboard.
//!
//! [`PresenceTracker`] owns the logged-in operator's status and heartbeat.
//! [`PresenceBoard`] is the supervisor's view of every operator.

pub mod board;
pub mod tracker;

pub use board::PresenceBoard;
pub use tracker::{PresenceTracker, StatusChange};
