// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference desk for switchboard.
//!
//! One authoritative in-memory state behind a single lock arbitrates every
//! handoff race, keeps the operator roster, and pushes events to connected
//! actors. [`DeskSession`] exposes it in-process through the collaborator
//! traits; [`server`] exposes the same operations over REST and WebSocket.

pub mod audit;
pub mod auth;
pub mod desk;
pub mod handlers;
pub mod notices;
pub mod push;
pub mod ratings;
pub mod roster;
pub mod server;
pub mod state;
pub mod ws;

pub use auth::{Credentials, Login, TokenRegistry};
pub use desk::{Desk, DeskSession};
pub use push::{Push, PushHub, Target};
pub use roster::OperatorProfile;
pub use server::{bind, router, serve};
pub use state::DeskState;
