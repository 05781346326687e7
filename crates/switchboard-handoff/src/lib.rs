// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side handoff state for switchboard actors.
//!
//! [`HandoffCoordinator`] keeps each watched session's request in a
//! [`HandoffTracker`], derives the session mode from it, and reconciles after
//! every push and reconnect. [`SessionSelection`] remembers which session the
//! actor is looking at.

pub mod coordinator;
pub mod selection;
pub mod tracker;

pub use coordinator::{HandoffCoordinator, HandoffEvent, Reply};
pub use selection::SessionSelection;
pub use tracker::{HandoffTracker, HandoffUpdate, Ignored, TrackedHandoff};
