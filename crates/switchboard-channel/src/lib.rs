// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable channel for switchboard actors.
//!
//! [`DurableChannel`] keeps one authenticated WebSocket alive per role,
//! reconnecting with [`ReconnectPolicy`] and heartbeating while open.
//! [`ChannelManager`] hands out [`ChannelLease`]s so several components can
//! share the channel without double-subscribing.

pub mod backoff;
pub mod channel;
pub mod manager;

pub use backoff::ReconnectPolicy;
pub use channel::{ChannelBuilder, ChannelState, Delivery, DurableChannel, SessionAccessor};
pub use manager::{
    Attachment, AttachmentSlot, ChannelFactory, ChannelLease, ChannelManager, Installer,
    InstallerHandle,
};
