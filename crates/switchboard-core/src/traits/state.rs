// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side state that survives a restart.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Actor, Role};

/// Keys of persisted client state, scoped per actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Last session the actor had selected.
    LastSession,
    /// Last presence status the operator confirmed.
    Presence,
    /// Unread notification counter for one role namespace.
    Unread(Role),
}

impl StateKey {
    pub fn as_key(&self) -> String {
        match self {
            Self::LastSession => "last_session".to_string(),
            Self::Presence => "presence".to_string(),
            Self::Unread(role) => format!("unread.{role}"),
        }
    }
}

/// Key/value store for per-actor client state.
#[async_trait]
pub trait ClientStateStore: Send + Sync + 'static {
    async fn load(&self, actor: Actor, key: StateKey) -> Result<Option<String>>;

    async fn save(&self, actor: Actor, key: StateKey, value: String) -> Result<()>;

    async fn remove(&self, actor: Actor, key: StateKey) -> Result<()>;
}
