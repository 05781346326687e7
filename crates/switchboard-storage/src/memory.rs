// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local [`ClientStateStore`] for tests and storage-less runs.

use std::collections::HashMap;

use async_trait::async_trait;
use switchboard_core::{Actor, ClientStateStore, StateKey, SwitchboardError};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<(Actor, StateKey), String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.lock().await.is_empty()
    }
}

#[async_trait]
impl ClientStateStore for MemoryStateStore {
    async fn load(&self, actor: Actor, key: StateKey) -> Result<Option<String>, SwitchboardError> {
        Ok(self.values.lock().await.get(&(actor, key)).cloned())
    }

    async fn save(&self, actor: Actor, key: StateKey, value: String) -> Result<(), SwitchboardError> {
        self.values.lock().await.insert((actor, key), value);
        Ok(())
    }

    async fn remove(&self, actor: Actor, key: StateKey) -> Result<(), SwitchboardError> {
        self.values.lock().await.remove(&(actor, key));
        Ok(())
    }
}
