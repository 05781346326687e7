// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{OperatorId, OperatorPresence, PresenceStatus};

/// Operator presence collaborator.
#[async_trait]
pub trait PresenceApi: Send + Sync + 'static {
    /// Change the calling operator's status.
    async fn set_status(&self, status: PresenceStatus) -> Result<OperatorPresence>;

    /// Keep the calling operator's status alive.
    async fn heartbeat(&self) -> Result<()>;

    /// Supervisor override of another operator's status.
    async fn force_status(
        &self,
        operator_id: OperatorId,
        status: PresenceStatus,
    ) -> Result<OperatorPresence>;

    /// Every known operator, for supervisory display.
    async fn roster(&self) -> Result<Vec<OperatorPresence>>;
}
