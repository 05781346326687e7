// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every switchboard crate.

use thiserror::Error;

use crate::types::RequestId;

/// The primary error type used across the handoff subsystem.
///
/// Variants are grouped by how callers are expected to react: transport and
/// timeout failures are recovered internally, business-rule failures
/// ([`RaceLost`](Self::RaceLost), [`InvalidTransition`](Self::InvalidTransition),
/// [`Validation`](Self::Validation)) are always handed back to the acting user.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Client-state storage errors (database open, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Durable channel errors (connect failure, abnormal close, write failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// REST collaborator failure that is not a business-rule rejection.
    #[error("api error: {message}")]
    Api {
        message: String,
        /// HTTP-style status code, when one was received.
        status: Option<u16>,
    },

    /// Another actor won the race for this request.
    #[error("request {} was taken by another actor: {message}", display_request(.request_id))]
    RaceLost {
        request_id: Option<RequestId>,
        message: String,
    },

    /// The requested action is not legal from the request's current status.
    #[error("invalid transition for request {}: {message}", display_request(.request_id))]
    InvalidTransition {
        request_id: Option<RequestId>,
        message: String,
    },

    /// A required identifier or field was missing or out of range.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

fn display_request(id: &Option<RequestId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "<unknown>".to_string(),
    }
}

impl SwitchboardError {
    /// Wire status code used in `ApiResponse.code` for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::RaceLost { .. } => 409,
            Self::InvalidTransition { .. } => 422,
            Self::Timeout { .. } => 504,
            Self::Api {
                status: Some(status),
                ..
            } => *status,
            _ => 500,
        }
    }

    /// Rebuild an error from a non-success `ApiResponse`.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            400 => Self::Validation(message),
            404 => Self::NotFound(message),
            409 => Self::RaceLost {
                request_id: None,
                message,
            },
            422 => Self::InvalidTransition {
                request_id: None,
                message,
            },
            _ => Self::Api {
                message,
                status: Some(code),
            },
        }
    }

    /// Attach a request id to race-lost and invalid-transition errors that lack one.
    pub fn for_request(self, id: RequestId) -> Self {
        match self {
            Self::RaceLost {
                request_id: None,
                message,
            } => Self::RaceLost {
                request_id: Some(id),
                message,
            },
            Self::InvalidTransition {
                request_id: None,
                message,
            } => Self::InvalidTransition {
                request_id: Some(id),
                message,
            },
            other => other,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Api { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }

    /// Whether the error must be shown to the acting user.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::RaceLost { .. }
                | Self::InvalidTransition { .. }
                | Self::Validation(_)
                | Self::NotFound(_)
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = SwitchboardError> = std::result::Result<T, E>;
