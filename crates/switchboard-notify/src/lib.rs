// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unread notification badges for switchboard actors.

pub mod badge;
pub mod hub;

pub use badge::BadgeStore;
pub use hub::{Notice, NotificationHub, Surface, qualifying_kinds};
