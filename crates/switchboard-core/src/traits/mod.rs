// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits.
//!
//! Each trait is one REST collaborator surface. Clients depend on the trait,
//! so the same component runs against the HTTP client, the in-memory desk, or
//! a recording test double.

pub mod handoff;
pub mod notify;
pub mod presence;
pub mod rating;
pub mod report;
pub mod state;

pub use handoff::{AssistantApi, HandoffApi};
pub use notify::NotificationApi;
pub use presence::PresenceApi;
pub use rating::RatingApi;
pub use report::ReportApi;
pub use state::{ClientStateStore, StateKey};
