// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Desk-issued credentials.
//!
//! `POST /api/session/login` hands out an opaque token bound to one actor.
//! REST calls present it as `Authorization: Bearer <token>`; the channel
//! upgrade presents it as the `token` query parameter.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use switchboard_core::{Actor, Role, SwitchboardError};

use crate::desk::Desk;
use crate::handlers::ApiError;

/// Login body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    pub role: Role,
    pub id: u64,
    /// Operator profile; ignored for other roles.
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub senior: bool,
    #[serde(default)]
    pub auto_accept: bool,
    #[serde(default)]
    pub max_sessions: Option<u32>,
}

impl Login {
    pub fn new(actor: Actor) -> Self {
        Self {
            role: actor.role,
            id: actor.id,
            skills: Vec::new(),
            senior: false,
            auto_accept: false,
            max_sessions: None,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            role: self.role,
            id: self.id,
        }
    }
}

/// Issued credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub actor: Actor,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[redacted]")
            .field("actor", &self.actor)
            .finish()
    }
}

/// Token to actor bindings.
#[derive(Default)]
pub struct TokenRegistry {
    tokens: DashMap<String, Actor>,
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("issued", &self.tokens.len())
            .finish()
    }
}

impl TokenRegistry {
    pub fn issue(&self, actor: Actor) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), actor);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<Actor> {
        self.tokens.get(token).map(|entry| *entry.value())
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

/// Resolve the caller's credential and attach its [`Actor`] to the request.
pub async fn auth_middleware(State(desk): State<Desk>, mut request: Request, next: Next) -> Response {
    let actor = credential(request.headers(), request.uri()).and_then(|t| desk.tokens().resolve(&t));
    match actor {
        Some(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        None => {
            tracing::debug!(path = request.uri().path(), "rejecting unauthenticated request");
            ApiError(SwitchboardError::Api {
                message: "missing or unknown credential".into(),
                status: Some(401),
            })
            .into_response()
        }
    }
}

fn credential(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer
        .or_else(|| {
            uri.query()?
                .split('&')
                .find_map(|pair| pair.strip_prefix("token="))
        })
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::OperatorId;

    #[test]
    fn issued_tokens_resolve_until_revoked() {
        let registry = TokenRegistry::default();
        let actor = Actor::operator(OperatorId(3));
        let token = registry.issue(actor);
        assert_eq!(registry.resolve(&token), Some(actor));
        assert!(registry.revoke(&token));
        assert_eq!(registry.resolve(&token), None);
    }

    #[test]
    fn credential_prefers_bearer_then_query() {
        let mut headers = HeaderMap::new();
        let uri: Uri = "/api/notify/list?page=1&token=q-tok".parse().unwrap();
        assert_eq!(credential(&headers, &uri).as_deref(), Some("q-tok"));

        headers.insert("authorization", "Bearer h-tok".parse().unwrap());
        assert_eq!(credential(&headers, &uri).as_deref(), Some("h-tok"));

        let bare: Uri = "/api/notify/list?token=".parse().unwrap();
        assert_eq!(credential(&HeaderMap::new(), &bare), None);
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let creds = Credentials {
            token: "secret".into(),
            actor: Actor::supervisor(1),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[redacted]"));
    }
}
