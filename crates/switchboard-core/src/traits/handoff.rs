// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handoff lifecycle collaborator.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{HandoffRequest, RequestId, SessionId};
use crate::wire::TransferBody;

/// Lifecycle operations on handoff requests, authenticated as one actor.
///
/// Every call returns the authoritative request snapshot after the action.
#[async_trait]
pub trait HandoffApi: Send + Sync + 'static {
    /// Ask admission control for a human operator.
    async fn request_transfer(&self, body: TransferBody) -> Result<HandoffRequest>;

    /// Current status of one request.
    async fn status(&self, id: RequestId) -> Result<HandoffRequest>;

    /// Most recent request for a session, if any.
    async fn by_session(&self, session_id: SessionId) -> Result<Option<HandoffRequest>>;

    /// Customer withdraws a waiting request.
    async fn cancel(&self, id: RequestId) -> Result<HandoffRequest>;

    /// Customer ends the live conversation of a session.
    async fn end_by_user(&self, session_id: SessionId) -> Result<HandoffRequest>;

    /// Operator view of requests waiting for pickup.
    async fn pending_queue(&self) -> Result<Vec<HandoffRequest>>;

    async fn accept(&self, id: RequestId) -> Result<HandoffRequest>;

    async fn reject(&self, id: RequestId, reason: Option<String>) -> Result<HandoffRequest>;

    async fn complete(&self, id: RequestId) -> Result<HandoffRequest>;

    /// Administrative close.
    async fn close(&self, id: RequestId) -> Result<HandoffRequest>;
}

/// The request/response assistant path used while a session is AI-served.
#[async_trait]
pub trait AssistantApi: Send + Sync + 'static {
    async fn ask(&self, session_id: SessionId, text: &str) -> Result<String>;
}
