// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire formats shared by clients and the reference desk.
//!
//! Channel frames are JSON envelopes:
//! ```json
//! {"type": "HANDOFF_ACCEPTED", "payload": {"sessionId": 42, "operatorId": 3}, "timestamp": 1767225600000}
//! ```
//!
//! REST responses use [`ApiResponse`], where `code == 200` means success.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};
use crate::types::{
    Audience, CustomerId, NotificationId, OperatorId, Party, PresenceStatus, Priority, RequestId,
    Role, SessionId,
};

/// A typed message travelling over the durable channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Correlates a push with the action that caused it. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            request_id: None,
        }
    }

    /// Build an envelope from any serializable payload.
    pub fn typed<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| SwitchboardError::Internal(format!("payload encode failed: {e}")))?;
        Ok(Self::new(kind, value))
    }

    /// Liveness frame sent by the channel heartbeat.
    pub fn ping() -> Self {
        Self::new(message_types::PING, serde_json::Value::Object(Default::default()))
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Decode the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            SwitchboardError::Validation(format!("malformed {} payload: {e}", self.kind))
        })
    }
}

/// Message type constants for channel envelopes.
pub mod message_types {
    /// New pending request offered to an operator.
    pub const HANDOFF_REQUEST: &str = "HANDOFF_REQUEST";
    /// An operator accepted a request.
    pub const HANDOFF_ACCEPTED: &str = "HANDOFF_ACCEPTED";
    /// A live conversation ended; carries `endedBy`.
    pub const HANDOFF_COMPLETED: &str = "HANDOFF_COMPLETED";
    /// The customer withdrew a waiting request.
    pub const HANDOFF_CANCELLED: &str = "HANDOFF_CANCELLED";
    /// Queue position / wait refresh.
    pub const QUEUE_UPDATE: &str = "QUEUE_UPDATE";
    /// Live chat content.
    pub const TEXT: &str = "TEXT";
    /// Supervisor broadcast.
    pub const ADMIN_NOTIFICATION: &str = "ADMIN_NOTIFICATION";
    /// Operator presence changed.
    pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";
    /// Heartbeat.
    pub const PING: &str = "PING";
    /// Heartbeat reply.
    pub const PONG: &str = "PONG";
}

/// The session/request pair every handoff push carries.
///
/// Consumers treat pushes as hints and only need this much to know what to
/// re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffHint {
    pub session_id: SessionId,
    #[serde(default)]
    pub handoff_request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequestPush {
    pub handoff_request_id: RequestId,
    pub session_id: SessionId,
    pub customer_id: CustomerId,
    pub priority: Priority,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub queue_position: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffAcceptedPush {
    pub handoff_request_id: RequestId,
    pub session_id: SessionId,
    pub operator_id: OperatorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffCompletedPush {
    pub handoff_request_id: RequestId,
    pub session_id: SessionId,
    pub ended_by: Party,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffCancelledPush {
    pub handoff_request_id: RequestId,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdatePush {
    pub handoff_request_id: RequestId,
    pub session_id: SessionId,
    pub queue_position: u32,
    pub estimated_wait_seconds: u64,
}

/// Live chat text in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    pub session_id: SessionId,
    pub content: String,
    /// Filled in by the server when relaying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Role>,
}

/// Standard REST response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub const OK: u16 = 200;

    pub fn ok(data: T) -> Self {
        Self {
            code: Self::OK,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(err: &SwitchboardError) -> Self {
        Self {
            code: err.status_code(),
            message: err.to_string(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Self::OK
    }

    /// Convert into the payload, mapping failure codes back onto [`SwitchboardError`].
    pub fn into_result(self) -> Result<Option<T>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(SwitchboardError::from_status(self.code, self.message))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub session_id: SessionId,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub handoff_request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastBody {
    pub title: String,
    pub content: String,
    pub audience: Audience,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkReadBody {
    /// Empty marks everything read.
    #[serde(default)]
    pub ids: Vec<NotificationId>,
}

/// Paging and filter for listing notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            unread_only: false,
            page: default_page(),
            size: default_page_size(),
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}
