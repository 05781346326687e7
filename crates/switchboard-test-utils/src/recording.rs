// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable handoff collaborator.
//!
//! `RecordingHandoffApi` keeps one authoritative request per session and
//! moves it along the lifecycle graph on every action, so components under
//! test see the same rejections a real desk would give. Tests script the
//! "server side" with [`set`](RecordingHandoffApi::set) and inject failures
//! with [`fail_next`](RecordingHandoffApi::fail_next).

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use switchboard_core::wire::TransferBody;
use switchboard_core::{
    CustomerId, HandoffAction, HandoffApi, HandoffRequest, HandoffStatus, OperatorId, Party,
    Priority, RequestId, Result, SessionId, SwitchboardError, transition,
};
use tokio::sync::Notify;

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffCall {
    Transfer(SessionId),
    Status(RequestId),
    BySession(SessionId),
    Cancel(RequestId),
    EndByUser(SessionId),
    PendingQueue,
    Accept(RequestId),
    Reject(RequestId),
    Complete(RequestId),
    Close(RequestId),
}

#[derive(Default)]
struct Script {
    calls: Vec<HandoffCall>,
    requests: HashMap<SessionId, HandoffRequest>,
    failures: VecDeque<SwitchboardError>,
    next_id: u64,
    fallback: bool,
}

/// Recording [`HandoffApi`] acting as one operator (for accept) and one
/// customer (for transfers).
pub struct RecordingHandoffApi {
    operator: OperatorId,
    customer: CustomerId,
    script: Mutex<Script>,
    called: Notify,
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for RecordingHandoffApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHandoffApi {
    pub fn new() -> Self {
        Self::acting_as(OperatorId(1), CustomerId(9))
    }

    pub fn acting_as(operator: OperatorId, customer: CustomerId) -> Self {
        Self {
            operator,
            customer,
            script: Mutex::new(Script {
                next_id: 1,
                ..Script::default()
            }),
            called: Notify::new(),
        }
    }

    /// Make every subsequent transfer end in FALLBACK_TICKET.
    pub fn nobody_online(&self) {
        lock(&self.script).fallback = true;
    }

    /// Replace the authoritative request for its session.
    pub fn set(&self, request: HandoffRequest) {
        lock(&self.script).requests.insert(request.session_id, request);
    }

    /// Build and store a request in `status`, returning it.
    pub fn seed(&self, session_id: SessionId, status: HandoffStatus) -> HandoffRequest {
        let mut script = lock(&self.script);
        let id = RequestId(script.next_id);
        script.next_id += 1;
        let mut request = blank(id, session_id, self.customer);
        request.status = status;
        if status.holds_operator() {
            request.assigned_operator_id = Some(self.operator);
        }
        request.revision = 1;
        script.requests.insert(session_id, request.clone());
        request
    }

    /// Current authoritative request for a session.
    pub fn current(&self, session_id: SessionId) -> Option<HandoffRequest> {
        lock(&self.script).requests.get(&session_id).cloned()
    }

    /// The next call fails with `err` instead of running.
    pub fn fail_next(&self, err: SwitchboardError) {
        lock(&self.script).failures.push_back(err);
    }

    pub fn calls(&self) -> Vec<HandoffCall> {
        lock(&self.script).calls.clone()
    }

    pub fn count(&self, call: &HandoffCall) -> usize {
        lock(&self.script).calls.iter().filter(|c| *c == call).count()
    }

    /// Wait until at least `n` calls matching `call` were recorded.
    pub async fn wait_for(&self, call: &HandoffCall, n: usize, timeout: std::time::Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.called.notified();
                if self.count(call) >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    fn record(&self, call: HandoffCall) -> Result<()> {
        let failure = {
            let mut script = lock(&self.script);
            script.calls.push(call);
            script.failures.pop_front()
        };
        self.called.notify_waiters();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn find(script: &Script, id: RequestId) -> Result<SessionId> {
        script
            .requests
            .values()
            .find(|r| r.id == id)
            .map(|r| r.session_id)
            .ok_or_else(|| SwitchboardError::NotFound(format!("handoff request {id}")))
    }

    fn apply(
        &self,
        id: RequestId,
        action: HandoffAction,
        edit: impl FnOnce(&mut HandoffRequest),
    ) -> Result<HandoffRequest> {
        let mut script = lock(&self.script);
        let session = Self::find(&script, id)?;
        let Some(request) = script.requests.get_mut(&session) else {
            return Err(SwitchboardError::NotFound(format!("handoff request {id}")));
        };
        if action != HandoffAction::Accept && action.already_applied(request.status) {
            return Ok(request.clone());
        }
        request.status = transition(request.status, action).map_err(|e| e.for_request(id))?;
        if !request.status.holds_operator() {
            request.assigned_operator_id = None;
        }
        edit(request);
        request.revision += 1;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }
}

fn blank(id: RequestId, session_id: SessionId, customer_id: CustomerId) -> HandoffRequest {
    let now = Utc::now();
    HandoffRequest {
        id,
        session_id,
        customer_id,
        reason: None,
        status: HandoffStatus::Pending,
        priority: Priority::Normal,
        queue_position: None,
        estimated_wait_seconds: None,
        assigned_operator_id: None,
        ticket_id: None,
        reject_reason: None,
        ended_by: None,
        created_at: now,
        updated_at: now,
        revision: 0,
    }
}

#[async_trait]
impl HandoffApi for RecordingHandoffApi {
    async fn request_transfer(&self, body: TransferBody) -> Result<HandoffRequest> {
        self.record(HandoffCall::Transfer(body.session_id))?;
        let mut script = lock(&self.script);
        if script
            .requests
            .get(&body.session_id)
            .is_some_and(|r| !r.status.is_terminal())
        {
            return Err(SwitchboardError::Validation(format!(
                "session {} already has an active handoff request",
                body.session_id
            )));
        }
        let id = RequestId(script.next_id);
        script.next_id += 1;
        let mut request = blank(id, body.session_id, self.customer);
        request.reason = body.reason;
        request.priority = body.priority.unwrap_or_default();
        request.revision = 1;
        if script.fallback {
            request.status = HandoffStatus::FallbackTicket;
            request.ticket_id = Some(format!("T-{:05}", 1000 + id.0));
        } else {
            request.queue_position = Some(1);
            request.estimated_wait_seconds = Some(30);
        }
        script.requests.insert(body.session_id, request.clone());
        Ok(request)
    }

    async fn status(&self, id: RequestId) -> Result<HandoffRequest> {
        self.record(HandoffCall::Status(id))?;
        let script = lock(&self.script);
        let session = Self::find(&script, id)?;
        script
            .requests
            .get(&session)
            .cloned()
            .ok_or_else(|| SwitchboardError::NotFound(format!("handoff request {id}")))
    }

    async fn by_session(&self, session_id: SessionId) -> Result<Option<HandoffRequest>> {
        self.record(HandoffCall::BySession(session_id))?;
        Ok(self.current(session_id))
    }

    async fn cancel(&self, id: RequestId) -> Result<HandoffRequest> {
        self.record(HandoffCall::Cancel(id))?;
        self.apply(id, HandoffAction::Cancel, |_| {})
    }

    async fn end_by_user(&self, session_id: SessionId) -> Result<HandoffRequest> {
        self.record(HandoffCall::EndByUser(session_id))?;
        let id = self
            .current(session_id)
            .map(|r| r.id)
            .ok_or_else(|| SwitchboardError::NotFound(format!("session {session_id}")))?;
        self.apply(id, HandoffAction::Complete, |r| r.ended_by = Some(Party::Customer))
    }

    async fn pending_queue(&self) -> Result<Vec<HandoffRequest>> {
        self.record(HandoffCall::PendingQueue)?;
        let script = lock(&self.script);
        let mut waiting: Vec<HandoffRequest> = script
            .requests
            .values()
            .filter(|r| r.status.is_waiting())
            .cloned()
            .collect();
        waiting.sort_by_key(|r| r.id);
        Ok(waiting)
    }

    async fn accept(&self, id: RequestId) -> Result<HandoffRequest> {
        self.record(HandoffCall::Accept(id))?;
        let operator = self.operator;
        {
            let script = lock(&self.script);
            let session = Self::find(&script, id)?;
            if let Some(current) = script.requests.get(&session)
                && current.status.holds_operator()
                && current.status != HandoffStatus::Assigned
            {
                if current.assigned_operator_id == Some(operator) {
                    return Ok(current.clone());
                }
                return Err(SwitchboardError::RaceLost {
                    request_id: Some(id),
                    message: "already accepted by another operator".into(),
                });
            }
        }
        self.apply(id, HandoffAction::Accept, |r| {
            r.assigned_operator_id = Some(operator);
            r.queue_position = None;
        })
    }

    async fn reject(&self, id: RequestId, reason: Option<String>) -> Result<HandoffRequest> {
        self.record(HandoffCall::Reject(id))?;
        self.apply(id, HandoffAction::Reject { requeue: true }, |r| r.reject_reason = reason)
    }

    async fn complete(&self, id: RequestId) -> Result<HandoffRequest> {
        self.record(HandoffCall::Complete(id))?;
        self.apply(id, HandoffAction::Complete, |r| r.ended_by = Some(Party::Operator))
    }

    async fn close(&self, id: RequestId) -> Result<HandoffRequest> {
        self.record(HandoffCall::Close(id))?;
        self.apply(id, HandoffAction::Close, |r| r.ended_by = Some(Party::System))
    }
}

impl std::fmt::Debug for RecordingHandoffApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let script = lock(&self.script);
        f.debug_struct("RecordingHandoffApi")
            .field("operator", &self.operator)
            .field("calls", &script.calls.len())
            .field("requests", &script.requests.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(session: u64) -> TransferBody {
        TransferBody {
            session_id: SessionId(session),
            reason: Some("billing issue".into()),
            priority: None,
        }
    }

    #[tokio::test]
    async fn walks_the_lifecycle() {
        let api = RecordingHandoffApi::new();
        let request = api.request_transfer(transfer(42)).await.unwrap();
        assert_eq!(request.status, HandoffStatus::Pending);

        let accepted = api.accept(request.id).await.unwrap();
        assert_eq!(accepted.status, HandoffStatus::Accepted);
        assert_eq!(accepted.assigned_operator_id, Some(OperatorId(1)));
        assert!(accepted.revision > request.revision);

        let done = api.complete(request.id).await.unwrap();
        assert_eq!(done.status, HandoffStatus::Completed);
        assert!(done.assigned_operator_id.is_none());

        // duplicate complete is a no-op
        assert_eq!(api.complete(request.id).await.unwrap().revision, done.revision);
        assert_eq!(api.count(&HandoffCall::Complete(request.id)), 2);
    }

    #[tokio::test]
    async fn terminal_requests_reject_late_actions() {
        let api = RecordingHandoffApi::new();
        let request = api.seed(SessionId(5), HandoffStatus::Cancelled);
        let err = api.accept(request.id).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let api = RecordingHandoffApi::new();
        let request = api.request_transfer(transfer(1)).await.unwrap();
        api.fail_next(SwitchboardError::RaceLost {
            request_id: Some(request.id),
            message: "operator 2 was faster".into(),
        });
        assert!(api.accept(request.id).await.is_err());
        assert!(api.accept(request.id).await.is_ok());
    }

    #[tokio::test]
    async fn fallback_when_nobody_online() {
        let api = RecordingHandoffApi::new();
        api.nobody_online();
        let request = api.request_transfer(transfer(42)).await.unwrap();
        assert_eq!(request.status, HandoffStatus::FallbackTicket);
        assert!(request.ticket_id.is_some());
    }
}
