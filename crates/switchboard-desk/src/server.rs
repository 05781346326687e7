// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket front for the desk, built on axum.

use std::time::Duration;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use switchboard_config::model::DeskConfig;
use switchboard_core::{Result, SwitchboardError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::auth_middleware;
use crate::desk::Desk;
use crate::{handlers, ws};

/// All desk routes, REST under `/api` and the channel under `/ws/{role}`.
pub fn router(desk: Desk) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/session/login", post(handlers::login));

    let authenticated = Router::new()
        .route("/customer/handoff/transfer", post(handlers::transfer))
        .route("/customer/handoff/status/{id}", get(handlers::status))
        .route("/customer/handoff/cancel/{id}", post(handlers::cancel))
        .route("/customer/handoff/end-by-user", post(handlers::end_by_user))
        .route("/customer/handoff/rating/pending", get(handlers::pending_rating))
        .route("/customer/handoff/rating", post(handlers::submit_rating))
        .route("/handoff/by-session/{session_id}", get(handlers::by_session))
        .route("/agent/handoff/pending", get(handlers::pending_queue))
        .route("/agent/handoff/accept", post(handlers::accept))
        .route("/agent/handoff/reject", post(handlers::reject))
        .route("/agent/handoff/complete/{id}", post(handlers::complete))
        .route("/agent/status", post(handlers::set_status))
        .route("/agent/heartbeat", post(handlers::heartbeat))
        .route("/admin/handoff/close/{id}", post(handlers::close))
        .route("/admin/agent/{id}/status", post(handlers::force_status))
        .route("/admin/agent/roster", get(handlers::roster))
        .route("/admin/notify/broadcast", post(handlers::broadcast))
        .route("/admin/handoff/records", get(handlers::records))
        .route("/admin/handoff/{id}/events", get(handlers::events))
        .route("/admin/handoff/rating/list", get(handlers::rating_list))
        .route("/admin/handoff/rating/stats", get(handlers::rating_stats))
        .route("/admin/handoff/rating/{id}/process", post(handlers::process_rating))
        .route("/admin/handoff/rating/trend", get(handlers::rating_trend))
        .route("/admin/handoff/rating/low-score/top", get(handlers::low_scores))
        .route("/notify/list", get(handlers::list_notifications))
        .route("/notify/read", post(handlers::mark_read))
        .route_layer(axum_middleware::from_fn_with_state(desk.clone(), auth_middleware));

    Router::new()
        .nest("/api", public.merge(authenticated))
        .route("/ws/{role}", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(desk)
}

/// Bind the configured address.
pub async fn bind(config: &DeskConfig) -> Result<TcpListener> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| SwitchboardError::Transport {
            message: format!("failed to bind desk to {addr}: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Serve until [`Desk::shutdown`] is called. Runs the presence sweep on
/// `desk.sweep_interval_secs`.
pub async fn serve(desk: Desk, listener: TcpListener) -> Result<()> {
    let shutdown = desk.shutdown_token();
    if let Ok(addr) = listener.local_addr() {
        info!("desk listening on {addr}");
    }

    let sweeper = tokio::spawn(sweep_loop(desk.clone()));
    let app = router(desk);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| SwitchboardError::Transport {
            message: format!("desk server error: {e}"),
            source: Some(Box::new(e)),
        });
    sweeper.abort();
    info!("desk stopped");
    result
}

async fn sweep_loop(desk: Desk) {
    let shutdown = desk.shutdown_token();
    let period = Duration::from_secs(desk.config().sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let demoted = desk.sweep().await;
                if demoted.is_empty() {
                    debug!("presence sweep: nobody demoted");
                } else {
                    info!(count = demoted.len(), "presence sweep demoted operators");
                }
            }
        }
    }
}
