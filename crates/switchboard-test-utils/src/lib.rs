// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for switchboard integration tests.
//!
//! Provides recording collaborators and harness infrastructure for fast,
//! deterministic tests without external services.
//!
//! # Components
//!
//! - [`RecordingHandoffApi`] - scriptable handoff collaborator that records every call
//! - [`MockAssistant`] - assistant path with canned answers
//! - [`RelayServer`] - WebSocket server that records handshakes and can push or drop
//! - [`DeskHarness`] - reference desk served on an ephemeral port

pub mod harness;
pub mod mock_assistant;
pub mod recording;
pub mod relay;

pub use harness::{ActorHandle, DeskHarness};
pub use mock_assistant::MockAssistant;
pub use recording::{HandoffCall, RecordingHandoffApi};
pub use relay::{Handshake, RelayServer};
