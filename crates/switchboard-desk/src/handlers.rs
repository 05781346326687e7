// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST handlers. Every body is an [`ApiResponse`]; failures carry the
//! error's status code both in the HTTP status and in `code`.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use switchboard_core::report::{
    HandoffEventRecord, HandoffRecord, LowScoreQuery, RatingProcess, RatingQuery, RatingRecord,
    RatingStats, RatingTrendPoint, RecordQuery,
};
use switchboard_core::wire::{
    ApiResponse, BroadcastBody, DecisionBody, MarkReadBody, NotificationQuery, SessionBody,
    StatusBody, TransferBody,
};
use switchboard_core::{
    Actor, HandoffApi, HandoffRequest, Notification, NotificationApi, OperatorId,
    OperatorPresence, PendingRating, PresenceApi, RatingApi, RatingSubmission, ReportApi,
    RequestId, SessionId, SwitchboardError,
};

use crate::auth::{Credentials, Login};
use crate::desk::Desk;

/// A [`SwitchboardError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub SwitchboardError);

impl From<SwitchboardError> for ApiError {
    fn from(err: SwitchboardError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        (status, Json(ApiResponse::<()>::error(&self.0))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /api/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/session/login
pub async fn login(State(desk): State<Desk>, Json(body): Json<Login>) -> ApiResult<Credentials> {
    ok(desk.login(body).await?)
}

// --- handoff ---

pub async fn transfer(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<TransferBody>,
) -> ApiResult<HandoffRequest> {
    ok(desk.session(actor).request_transfer(body).await?)
}

pub async fn status(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<u64>,
) -> ApiResult<HandoffRequest> {
    ok(desk.session(actor).status(RequestId(id)).await?)
}

pub async fn by_session(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<u64>,
) -> ApiResult<Option<HandoffRequest>> {
    ok(desk.session(actor).by_session(SessionId(session_id)).await?)
}

pub async fn cancel(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<u64>,
) -> ApiResult<HandoffRequest> {
    ok(desk.session(actor).cancel(RequestId(id)).await?)
}

pub async fn end_by_user(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<SessionBody>,
) -> ApiResult<HandoffRequest> {
    ok(desk.session(actor).end_by_user(body.session_id).await?)
}

pub async fn pending_queue(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<HandoffRequest>> {
    ok(desk.session(actor).pending_queue().await?)
}

pub async fn accept(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<DecisionBody>,
) -> ApiResult<HandoffRequest> {
    ok(desk.session(actor).accept(body.handoff_request_id).await?)
}

pub async fn reject(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<DecisionBody>,
) -> ApiResult<HandoffRequest> {
    ok(desk
        .session(actor)
        .reject(body.handoff_request_id, body.reason)
        .await?)
}

pub async fn complete(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<u64>,
) -> ApiResult<HandoffRequest> {
    ok(desk.session(actor).complete(RequestId(id)).await?)
}

pub async fn close(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<u64>,
) -> ApiResult<HandoffRequest> {
    ok(desk.session(actor).close(RequestId(id)).await?)
}

// --- ratings ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: SessionId,
}

pub async fn pending_rating(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<PendingRating> {
    ok(desk.session(actor).pending(query.session_id).await?)
}

pub async fn submit_rating(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<RatingSubmission>,
) -> ApiResult<()> {
    ok(desk.session(actor).submit(body).await?)
}

// --- supervisor reports ---

pub async fn records(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Vec<HandoffRecord>> {
    ok(desk.session(actor).records(query).await?)
}

pub async fn events(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<HandoffEventRecord>> {
    ok(desk.session(actor).events(RequestId(id)).await?)
}

pub async fn rating_list(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<RatingQuery>,
) -> ApiResult<Vec<RatingRecord>> {
    ok(desk.session(actor).ratings(query).await?)
}

pub async fn rating_stats(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<RatingStats> {
    ok(desk.session(actor).rating_stats().await?)
}

pub async fn process_rating(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<u64>,
    Json(body): Json<RatingProcess>,
) -> ApiResult<RatingRecord> {
    ok(desk.session(actor).process_rating(RequestId(id), body).await?)
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    #[serde(default)]
    pub days: u32,
}

pub async fn rating_trend(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Vec<RatingTrendPoint>> {
    ok(desk.session(actor).rating_trend(query.days).await?)
}

pub async fn low_scores(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<LowScoreQuery>,
) -> ApiResult<Vec<RatingRecord>> {
    ok(desk.session(actor).low_scores(query).await?)
}

// --- notifications ---

pub async fn broadcast(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<BroadcastBody>,
) -> ApiResult<Notification> {
    ok(desk.session(actor).broadcast(body).await?)
}

pub async fn list_notifications(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    ok(desk.session(actor).list(query).await?)
}

pub async fn mark_read(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<MarkReadBody>,
) -> ApiResult<u32> {
    ok(desk.session(actor).mark_read(body.ids).await?)
}

// --- presence ---

pub async fn set_status(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<StatusBody>,
) -> ApiResult<OperatorPresence> {
    ok(desk.session(actor).set_status(body.status).await?)
}

pub async fn heartbeat(State(desk): State<Desk>, Extension(actor): Extension<Actor>) -> ApiResult<()> {
    ok(desk.session(actor).heartbeat().await?)
}

pub async fn force_status(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
    Path(operator_id): Path<u64>,
    Json(body): Json<StatusBody>,
) -> ApiResult<OperatorPresence> {
    ok(desk
        .session(actor)
        .force_status(OperatorId(operator_id), body.status)
        .await?)
}

pub async fn roster(
    State(desk): State<Desk>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<OperatorPresence>> {
    ok(desk.session(actor).roster().await?)
}
