// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event routing for switchboard.
//!
//! - [`EventRouter`] dispatches raw channel envelopes by `type`.
//! - [`EventBus`] carries typed, derived events between components.

pub mod bus;
pub mod router;

pub use bus::EventBus;
pub use router::{EventRouter, Handler, HandlerId};
