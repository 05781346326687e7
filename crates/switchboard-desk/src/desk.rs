// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared desk handle and per-actor collaborator sessions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchboard_config::SwitchboardConfig;
use switchboard_config::model::{DeskConfig, RatingConfig};
use switchboard_core::report::{
    HandoffEventRecord, HandoffRecord, LowScoreQuery, RatingProcess, RatingQuery, RatingRecord,
    RatingStats, RatingTrendPoint, RecordQuery,
};
use switchboard_core::wire::{BroadcastBody, NotificationQuery, TextPayload, TransferBody};
use switchboard_core::{
    Actor, CustomerId, Envelope, HandoffApi, HandoffRequest, Notification, NotificationApi,
    NotificationId, OperatorId, OperatorPresence, PendingRating, PresenceApi, PresenceStatus,
    RatingApi, RatingSubmission, ReportApi, RequestId, Result, Role, SessionId, SwitchboardError,
};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::{Credentials, Login, TokenRegistry};
use crate::push::PushHub;
use crate::roster::OperatorProfile;
use crate::state::DeskState;

/// Cheaply cloneable handle to one running desk.
#[derive(Clone, Debug)]
pub struct Desk {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: DeskConfig,
    state: Mutex<DeskState>,
    hub: PushHub,
    tokens: TokenRegistry,
    shutdown: CancellationToken,
}

impl Desk {
    pub fn new(config: DeskConfig, rating: RatingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DeskState::new(config.clone(), rating)),
                config,
                hub: PushHub::new(),
                tokens: TokenRegistry::default(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(config: &SwitchboardConfig) -> Self {
        Self::new(config.desk.clone(), config.rating.clone())
    }

    pub fn config(&self) -> &DeskConfig {
        &self.inner.config
    }

    pub fn hub(&self) -> &PushHub {
        &self.inner.hub
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.inner.tokens
    }

    /// Cancelled when the desk shuts down; servers and sockets watch it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn shutdown(&self) {
        info!("desk shutting down");
        self.inner.shutdown.cancel();
    }

    /// Run `op` under the state lock and deliver the pushes it queued.
    async fn apply<T>(&self, op: impl FnOnce(&mut DeskState, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let mut state = self.inner.state.lock().await;
        let result = op(&mut state, Utc::now());
        for push in state.take_pushes() {
            self.inner.hub.deliver(&push);
        }
        result
    }

    /// Read-only view of the state.
    pub async fn inspect<T>(&self, f: impl FnOnce(&DeskState) -> T) -> T {
        let state = self.inner.state.lock().await;
        f(&state)
    }

    /// Issue a token for the caller, registering operators on first login.
    pub async fn login(&self, login: Login) -> Result<Credentials> {
        let actor = login.actor();
        if login.role == Role::Operator {
            let profile = OperatorProfile {
                operator_id: OperatorId(login.id),
                skills: login.skills,
                senior: login.senior,
                auto_accept: login.auto_accept,
                max_sessions: login.max_sessions,
            };
            self.register_operator(profile).await;
        }
        let token = self.inner.tokens.issue(actor);
        info!(%actor, "actor logged in");
        Ok(Credentials { token, actor })
    }

    pub async fn register_operator(&self, profile: OperatorProfile) -> OperatorPresence {
        let mut state = self.inner.state.lock().await;
        state.register_operator(profile, Utc::now())
    }

    /// Collaborator view bound to `actor`.
    pub fn session(&self, actor: Actor) -> DeskSession {
        DeskSession {
            desk: self.clone(),
            actor,
        }
    }

    /// Open a push subscription, as a channel connection does.
    pub fn subscribe(&self, actor: Actor) -> mpsc::UnboundedReceiver<Envelope> {
        self.inner.hub.subscribe(actor)
    }

    pub async fn relay_text(&self, sender: Actor, text: TextPayload) -> Result<()> {
        self.apply(|state, now| state.relay_text(sender, text, now)).await
    }

    /// Demote operators whose heartbeat lapsed.
    pub async fn sweep(&self) -> Vec<OperatorId> {
        self.apply(|state, now| Ok(state.sweep(now)))
            .await
            .unwrap_or_default()
    }
}

/// The desk as seen by one authenticated actor.
///
/// Implements every collaborator trait, so client components can run
/// in-process against a desk exactly as they do over HTTP.
#[derive(Clone, Debug)]
pub struct DeskSession {
    desk: Desk,
    actor: Actor,
}

impl DeskSession {
    pub fn actor(&self) -> Actor {
        self.actor
    }

    fn require(&self, role: Role, action: &str) -> Result<()> {
        if self.actor.role == role {
            Ok(())
        } else {
            Err(SwitchboardError::Api {
                message: format!("{} may not {action}", self.actor),
                status: Some(403),
            })
        }
    }

    fn customer(&self, action: &str) -> Result<CustomerId> {
        self.require(Role::Customer, action)?;
        Ok(CustomerId(self.actor.id))
    }

    fn operator(&self, action: &str) -> Result<OperatorId> {
        self.require(Role::Operator, action)?;
        Ok(OperatorId(self.actor.id))
    }

    /// Customers only see their own requests.
    fn visible(&self, request: HandoffRequest) -> Option<HandoffRequest> {
        match self.actor.role {
            Role::Customer if request.customer_id.0 != self.actor.id => None,
            _ => Some(request),
        }
    }
}

#[async_trait]
impl HandoffApi for DeskSession {
    async fn request_transfer(&self, body: TransferBody) -> Result<HandoffRequest> {
        let customer = self.customer("request a transfer")?;
        self.desk
            .apply(|state, now| state.request_transfer(customer, body, now))
            .await
    }

    async fn status(&self, id: RequestId) -> Result<HandoffRequest> {
        let request = self.desk.inspect(|state| state.request(id)).await?;
        self.visible(request)
            .ok_or_else(|| SwitchboardError::NotFound(format!("handoff request {id}")))
    }

    async fn by_session(&self, session_id: SessionId) -> Result<Option<HandoffRequest>> {
        let request = self.desk.inspect(|state| state.by_session(session_id)).await;
        Ok(request.and_then(|r| self.visible(r)))
    }

    async fn cancel(&self, id: RequestId) -> Result<HandoffRequest> {
        let customer = self.customer("cancel a request")?;
        self.desk.apply(|state, now| state.cancel(customer, id, now)).await
    }

    async fn end_by_user(&self, session_id: SessionId) -> Result<HandoffRequest> {
        let customer = self.customer("end a conversation")?;
        self.desk
            .apply(|state, now| state.end_by_user(customer, session_id, now))
            .await
    }

    async fn pending_queue(&self) -> Result<Vec<HandoffRequest>> {
        let operator = self.operator("view the queue")?;
        Ok(self.desk.inspect(|state| state.pending_for(operator)).await)
    }

    async fn accept(&self, id: RequestId) -> Result<HandoffRequest> {
        let operator = self.operator("accept a request")?;
        self.desk.apply(|state, now| state.accept(operator, id, now)).await
    }

    async fn reject(&self, id: RequestId, reason: Option<String>) -> Result<HandoffRequest> {
        let operator = self.operator("reject a request")?;
        self.desk
            .apply(|state, now| state.reject(operator, id, reason, now))
            .await
    }

    async fn complete(&self, id: RequestId) -> Result<HandoffRequest> {
        let operator = self.operator("complete a request")?;
        self.desk.apply(|state, now| state.complete(operator, id, now)).await
    }

    async fn close(&self, id: RequestId) -> Result<HandoffRequest> {
        self.require(Role::Supervisor, "close a request")?;
        self.desk.apply(|state, now| state.close(id, now)).await
    }
}

#[async_trait]
impl PresenceApi for DeskSession {
    async fn set_status(&self, status: PresenceStatus) -> Result<OperatorPresence> {
        let operator = self.operator("set presence")?;
        self.desk
            .apply(|state, now| state.set_status(operator, status, now))
            .await
    }

    async fn heartbeat(&self) -> Result<()> {
        let operator = self.operator("send heartbeats")?;
        self.desk.apply(|state, now| state.heartbeat(operator, now)).await
    }

    async fn force_status(
        &self,
        operator_id: OperatorId,
        status: PresenceStatus,
    ) -> Result<OperatorPresence> {
        self.require(Role::Supervisor, "force presence")?;
        self.desk
            .apply(|state, now| state.force_status(operator_id, status, now))
            .await
    }

    async fn roster(&self) -> Result<Vec<OperatorPresence>> {
        self.require(Role::Supervisor, "view the roster")?;
        Ok(self.desk.inspect(DeskState::roster).await)
    }
}

#[async_trait]
impl NotificationApi for DeskSession {
    async fn broadcast(&self, body: BroadcastBody) -> Result<Notification> {
        self.require(Role::Supervisor, "broadcast")?;
        self.desk.apply(|state, now| state.broadcast(body, now)).await
    }

    async fn list(&self, query: NotificationQuery) -> Result<Vec<Notification>> {
        let actor = self.actor;
        Ok(self
            .desk
            .inspect(|state| state.notifications(actor, &query))
            .await)
    }

    async fn mark_read(&self, ids: Vec<NotificationId>) -> Result<u32> {
        let actor = self.actor;
        self.desk
            .apply(|state, _| Ok(state.mark_read(actor, &ids)))
            .await
    }
}

#[async_trait]
impl RatingApi for DeskSession {
    async fn pending(&self, session_id: SessionId) -> Result<PendingRating> {
        let customer = self.customer("read pending ratings")?;
        self.desk
            .apply(|state, now| Ok(state.pending_rating(customer, session_id, now)))
            .await
    }

    async fn submit(&self, rating: RatingSubmission) -> Result<()> {
        let customer = self.customer("submit a rating")?;
        self.desk
            .apply(|state, now| state.submit_rating(customer, rating, now))
            .await
    }
}

#[async_trait]
impl ReportApi for DeskSession {
    async fn records(&self, query: RecordQuery) -> Result<Vec<HandoffRecord>> {
        self.require(Role::Supervisor, "read handoff records")?;
        Ok(self.desk.inspect(|state| state.records(&query)).await)
    }

    async fn events(&self, id: RequestId) -> Result<Vec<HandoffEventRecord>> {
        self.require(Role::Supervisor, "read handoff events")?;
        self.desk.inspect(|state| state.events_for(id)).await
    }

    async fn ratings(&self, query: RatingQuery) -> Result<Vec<RatingRecord>> {
        self.require(Role::Supervisor, "list ratings")?;
        self.desk
            .apply(|state, now| Ok(state.rating_list(&query, now)))
            .await
    }

    async fn rating_stats(&self) -> Result<RatingStats> {
        self.require(Role::Supervisor, "read rating statistics")?;
        Ok(self.desk.inspect(DeskState::rating_stats).await)
    }

    async fn process_rating(&self, id: RequestId, body: RatingProcess) -> Result<RatingRecord> {
        self.require(Role::Supervisor, "process ratings")?;
        let supervisor = self.actor.id;
        self.desk
            .apply(|state, now| state.process_rating(id, supervisor, body, now))
            .await
    }

    async fn rating_trend(&self, days: u32) -> Result<Vec<RatingTrendPoint>> {
        self.require(Role::Supervisor, "read the rating trend")?;
        let now = Utc::now();
        Ok(self.desk.inspect(|state| state.rating_trend(days, now)).await)
    }

    async fn low_scores(&self, query: LowScoreQuery) -> Result<Vec<RatingRecord>> {
        self.require(Role::Supervisor, "read low scores")?;
        let now = Utc::now();
        Ok(self.desk.inspect(|state| state.low_scores(&query, now)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchboard_core::{HandoffStatus, message_types};

    async fn operator(desk: &Desk, id: u64) -> DeskSession {
        let creds = desk.login(Login::new(Actor::operator(OperatorId(id)))).await.unwrap();
        let session = desk.session(creds.actor);
        session.set_status(PresenceStatus::Online).await.unwrap();
        session
    }

    fn desk() -> Desk {
        Desk::new(
            DeskConfig {
                auto_assign: false,
                ..DeskConfig::default()
            },
            RatingConfig::default(),
        )
    }

    #[tokio::test]
    async fn roles_are_enforced() {
        let desk = desk();
        let customer = desk.session(Actor::customer(CustomerId(9)));
        let err = customer.accept(RequestId(1)).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let op = operator(&desk, 1).await;
        let err = op.roster().await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        let err = op.records(RecordQuery::default()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        let err = customer
            .process_rating(RequestId(1), RatingProcess::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn supervisor_reviews_a_finished_handoff() {
        let desk = desk();
        let op = operator(&desk, 1).await;
        let customer = desk.session(Actor::customer(CustomerId(9)));
        let supervisor = desk.session(Actor::supervisor(5));
        let request = customer
            .request_transfer(TransferBody {
                session_id: SessionId(42),
                reason: None,
                priority: None,
            })
            .await
            .unwrap();
        op.accept(request.id).await.unwrap();
        op.complete(request.id).await.unwrap();
        customer
            .submit(RatingSubmission {
                handoff_request_id: request.id,
                score: 1,
                tags: vec![],
                comment: Some("slow".into()),
            })
            .await
            .unwrap();

        let records = supervisor.records(RecordQuery::default()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operator_id, Some(OperatorId(1)));
        assert_eq!(supervisor.events(request.id).await.unwrap().len(), 3);

        let low = supervisor.low_scores(LowScoreQuery::default()).await.unwrap();
        assert_eq!(low.len(), 1);
        let processed = supervisor
            .process_rating(
                request.id,
                RatingProcess {
                    note: Some("apologised".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(processed.processed_by, Some(5));
        let stats = supervisor.rating_stats().await.unwrap();
        assert_eq!(stats.negative, 1);
        assert_eq!(supervisor.rating_trend(30).await.unwrap().len(), 30);
    }

    #[tokio::test]
    async fn customers_only_see_their_own_requests() {
        let desk = desk();
        operator(&desk, 1).await;
        let owner = desk.session(Actor::customer(CustomerId(9)));
        let request = owner
            .request_transfer(TransferBody {
                session_id: SessionId(42),
                reason: Some("billing issue".into()),
                priority: None,
            })
            .await
            .unwrap();

        let other = desk.session(Actor::customer(CustomerId(8)));
        assert!(other.by_session(SessionId(42)).await.unwrap().is_none());
        assert!(matches!(
            other.status(request.id).await.unwrap_err(),
            SwitchboardError::NotFound(_)
        ));
        assert_eq!(
            owner.status(request.id).await.unwrap().status,
            HandoffStatus::Pending
        );
    }

    #[tokio::test]
    async fn concurrent_accepts_have_one_winner() {
        let desk = desk();
        let a = operator(&desk, 1).await;
        let b = operator(&desk, 2).await;
        let customer = desk.session(Actor::customer(CustomerId(9)));
        let request = customer
            .request_transfer(TransferBody {
                session_id: SessionId(42),
                reason: None,
                priority: None,
            })
            .await
            .unwrap();

        let (ra, rb) = tokio::join!(a.accept(request.id), b.accept(request.id));
        let winners = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1);
        let loser = if ra.is_ok() { rb } else { ra };
        assert!(matches!(loser.unwrap_err(), SwitchboardError::RaceLost { .. }));

        let settled = customer.status(request.id).await.unwrap();
        assert_eq!(settled.status, HandoffStatus::Accepted);
    }

    #[tokio::test]
    async fn pushes_reach_subscribers() {
        let desk = desk();
        let op = operator(&desk, 1).await;
        let mut customer_rx = desk.subscribe(Actor::customer(CustomerId(9)));
        let customer = desk.session(Actor::customer(CustomerId(9)));
        let request = customer
            .request_transfer(TransferBody {
                session_id: SessionId(42),
                reason: None,
                priority: None,
            })
            .await
            .unwrap();
        op.accept(request.id).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(Some(env)) =
            tokio::time::timeout(Duration::from_millis(50), customer_rx.recv()).await
        {
            kinds.push(env.kind);
        }
        assert!(kinds.contains(&message_types::QUEUE_UPDATE.to_string()));
        assert!(kinds.contains(&message_types::HANDOFF_ACCEPTED.to_string()));
    }
}
