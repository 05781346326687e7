// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Notification, NotificationId};
use crate::wire::{BroadcastBody, NotificationQuery};

/// Persisted notification collaborator.
#[async_trait]
pub trait NotificationApi: Send + Sync + 'static {
    /// Send a broadcast (supervisors only).
    async fn broadcast(&self, body: BroadcastBody) -> Result<Notification>;

    /// Notifications visible to the caller, newest first.
    async fn list(&self, query: NotificationQuery) -> Result<Vec<Notification>>;

    /// Mark notifications read; an empty list marks all. Returns how many changed.
    async fn mark_read(&self, ids: Vec<NotificationId>) -> Result<u32>;
}
