// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel endpoint: `GET /ws/{role}?token=...[&sessionId=...]`.
//!
//! Server -> client: every push addressed to the actor, plus `PONG` for each
//! `PING`. Client -> server: `PING` and `TEXT` envelopes; anything else is
//! ignored and malformed frames are dropped.

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use switchboard_core::wire::TextPayload;
use switchboard_core::{Actor, Envelope, Role, SessionId, message_types};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::desk::Desk;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelParams {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    session_id: Option<SessionId>,
}

/// Authenticate, then upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(role): Path<String>,
    Query(params): Query<ChannelParams>,
    State(desk): State<Desk>,
) -> Response {
    let Some(actor) = params
        .token
        .as_deref()
        .and_then(|token| desk.tokens().resolve(token))
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if role.parse::<Role>().ok() != Some(actor.role) {
        warn!(%actor, path_role = %role, "channel role does not match credential");
        return StatusCode::FORBIDDEN.into_response();
    }
    debug!(%actor, session_id = ?params.session_id, "channel upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, desk, actor))
}

async fn handle_socket(socket: WebSocket, desk: Desk, actor: Actor) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    desk.hub().attach(actor, tx.clone());
    info!(%actor, "channel attached");

    let writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&envelope) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let shutdown = desk.shutdown_token();
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = stream.next() => msg,
        };
        let Some(Ok(msg)) = msg else {
            break;
        };
        match msg {
            Message::Text(text) => {
                let envelope: Envelope = match serde_json::from_str(text.as_str()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(%actor, error = %e, "malformed channel frame dropped");
                        continue;
                    }
                };
                handle_frame(&desk, actor, envelope, &tx).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    drop(tx);
    writer.abort();
    info!(%actor, "channel detached");
}

async fn handle_frame(desk: &Desk, actor: Actor, envelope: Envelope, tx: &mpsc::UnboundedSender<Envelope>) {
    match envelope.kind.as_str() {
        message_types::PING => {
            let _ = tx.send(Envelope::new(
                message_types::PONG,
                serde_json::Value::Object(Default::default()),
            ));
        }
        message_types::TEXT => match envelope.decode::<TextPayload>() {
            Ok(text) => {
                if let Err(e) = desk.relay_text(actor, text).await {
                    warn!(%actor, error = %e, "text not relayed");
                }
            }
            Err(e) => warn!(%actor, error = %e, "malformed text payload dropped"),
        },
        other => debug!(%actor, kind = other, "ignoring inbound frame"),
    }
}
