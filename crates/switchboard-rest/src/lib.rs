// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST collaborator client.
//!
//! [`RestClient`] implements [`HandoffApi`](switchboard_core::HandoffApi),
//! [`PresenceApi`](switchboard_core::PresenceApi),
//! [`NotificationApi`](switchboard_core::NotificationApi),
//! [`RatingApi`](switchboard_core::RatingApi) and
//! [`ReportApi`](switchboard_core::ReportApi) over HTTP, authenticated as one
//! actor.

pub mod client;
mod handoff;
mod notify;
mod presence;
mod report;

pub use client::RestClient;
