// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handoff coordination for one actor.
//!
//! [`HandoffCoordinator`] owns a [`HandoffTracker`] behind a single mailbox
//! task. Channel pushes are treated as hints: each one makes the task
//! re-fetch the session from the REST collaborator, and only the fetched
//! snapshot changes local state. Actions go straight to the collaborator;
//! their results, and any rollback, flow back through the same mailbox.
//!
//! ```text
//! push ──hint──> mailbox ──by_session──> tracker ──HandoffEvent──> subscribers
//! action ──REST──> snapshot ──> mailbox ──> tracker
//! reconnect (epoch > 1) ──> mark stale + re-fetch every watched session
//! ```

use std::future::Future;
use std::sync::Arc;

use switchboard_bus::EventBus;
use switchboard_channel::{AttachmentSlot, ChannelManager, ChannelState, Delivery, DurableChannel};
use switchboard_core::wire::{HandoffHint, TextPayload, TransferBody};
use switchboard_core::{
    AssistantApi, HandoffAction, HandoffApi, HandoffRequest, Priority, RequestId, Result, Role,
    SessionId, SessionMode, SwitchboardError, TransferOutcome, message_types,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tracker::{HandoffTracker, HandoffUpdate, Ignored, TrackedHandoff};

/// Pushes that only say "something changed for this session".
const HINT_TYPES: [&str; 4] = [
    message_types::HANDOFF_ACCEPTED,
    message_types::HANDOFF_COMPLETED,
    message_types::HANDOFF_CANCELLED,
    message_types::QUEUE_UPDATE,
];

/// What the coordinator publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffEvent {
    /// A watched request changed.
    Changed(HandoffUpdate),
    /// A request was offered to this operator.
    Offered {
        session_id: SessionId,
        request_id: Option<RequestId>,
    },
    /// Live chat text arrived.
    Text(TextPayload),
}

/// Where an outbound message went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// AI-served: the assistant's answer.
    Assistant(String),
    /// Human-served: queued on the live channel.
    Relayed,
    /// Human-served, but the channel was not open.
    Dropped,
}

enum Command {
    Watch { session_id: SessionId, refresh: bool },
    Unwatch(SessionId),
    Hint(HandoffHint),
    Snapshot(HandoffRequest),
    Begin(SessionId, HandoffAction),
    Settle(SessionId),
    Rollback(SessionId),
    Reconnected,
    Flush(oneshot::Sender<()>),
}

/// Client-side handoff state machine for one actor.
pub struct HandoffCoordinator {
    api: Arc<dyn HandoffApi>,
    assistant: Option<Arc<dyn AssistantApi>>,
    mailbox: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<HandoffTracker>,
    events: EventBus<HandoffEvent>,
    attachment: AttachmentSlot,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HandoffCoordinator {
    /// Start the mailbox task.
    pub fn spawn(api: Arc<dyn HandoffApi>, assistant: Option<Arc<dyn AssistantApi>>) -> Self {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(HandoffTracker::new());
        let events = EventBus::default();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&api),
            inbox,
            view_tx,
            events.clone(),
            cancel.clone(),
        ));
        Self {
            api,
            assistant,
            mailbox,
            view,
            events,
            attachment: AttachmentSlot::new("handoff coordinator"),
            cancel,
            task,
        }
    }

    /// Subscribe to pushes on `role`'s channel and keep a lease on it for
    /// outbound text. Can be called once.
    pub fn attach(&self, manager: &ChannelManager, role: Role) -> Result<()> {
        let mailbox = self.mailbox.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        self.attachment.attach(manager, role, move |channel| {
            install(channel, mailbox.clone(), events.clone(), cancel.clone());
        })?;
        Ok(())
    }

    /// The attached channel, if any.
    pub fn channel(&self) -> Option<&DurableChannel> {
        self.attachment.get().map(|attachment| &**attachment)
    }

    /// Track `session_id` and fetch its current request.
    pub fn watch(&self, session_id: SessionId) {
        self.send(Command::Watch {
            session_id,
            refresh: true,
        });
    }

    pub fn unwatch(&self, session_id: SessionId) {
        self.send(Command::Unwatch(session_id));
    }

    /// Re-fetch every watched session, as after a reconnect.
    pub fn reconcile(&self) {
        self.send(Command::Reconnected);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HandoffEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus<HandoffEvent> {
        &self.events
    }

    /// Receiver that changes whenever the tracker does.
    pub fn changes(&self) -> watch::Receiver<HandoffTracker> {
        self.view.clone()
    }

    pub fn mode(&self, session_id: SessionId) -> SessionMode {
        self.view.borrow().mode(session_id)
    }

    /// Waiting for an operator; shown next to the AI_SERVED mode.
    pub fn waiting(&self, session_id: SessionId) -> bool {
        self.view.borrow().waiting(session_id)
    }

    pub fn tracked(&self, session_id: SessionId) -> Option<TrackedHandoff> {
        self.view.borrow().get(session_id).cloned()
    }

    /// Sessions this actor is serving or being served in.
    pub fn live_count(&self) -> usize {
        self.view.borrow().live_count()
    }

    /// Resolves once every command sent before it was applied.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx));
        let _ = rx.await;
    }

    /// Ask admission control for a human. The session is watched from here on.
    pub async fn request_transfer(
        &self,
        session_id: SessionId,
        reason: Option<String>,
        priority: Option<Priority>,
    ) -> Result<TransferOutcome> {
        let request = match self
            .api
            .request_transfer(TransferBody {
                session_id,
                reason,
                priority,
            })
            .await
        {
            Ok(request) => request,
            Err(e) => {
                // The desk may have created the request before the call
                // failed; watch the session and read it back.
                if e.is_retryable() {
                    warn!(session_id = %session_id, error = %e, "transfer outcome unknown, reading back");
                    self.send(Command::Watch {
                        session_id,
                        refresh: true,
                    });
                }
                return Err(e);
            }
        };
        self.send(Command::Watch {
            session_id,
            refresh: false,
        });
        self.send(Command::Snapshot(request.clone()));
        let outcome = TransferOutcome::from_request(request)?;
        match &outcome {
            TransferOutcome::Fallback { ticket_id, .. } => {
                info!(session_id = %session_id, ticket = %ticket_id, "no operator available, fallback ticket opened");
            }
            TransferOutcome::Queued(request) => {
                info!(session_id = %session_id, request_id = %request.id, status = %request.status, "handoff queued");
            }
        }
        Ok(outcome)
    }

    /// Claim a request. The session is watched from here on.
    pub async fn accept(&self, id: RequestId) -> Result<HandoffRequest> {
        let api = Arc::clone(&self.api);
        let request = self
            .act(id, HandoffAction::Accept, async move { api.accept(id).await })
            .await?;
        self.send(Command::Watch {
            session_id: request.session_id,
            refresh: false,
        });
        self.send(Command::Snapshot(request.clone()));
        Ok(request)
    }

    pub async fn reject(&self, id: RequestId, reason: Option<String>) -> Result<HandoffRequest> {
        let api = Arc::clone(&self.api);
        self.act(id, HandoffAction::Reject { requeue: true }, async move {
            api.reject(id, reason).await
        })
        .await
    }

    pub async fn complete(&self, id: RequestId) -> Result<HandoffRequest> {
        let api = Arc::clone(&self.api);
        self.act(id, HandoffAction::Complete, async move { api.complete(id).await })
            .await
    }

    pub async fn cancel(&self, id: RequestId) -> Result<HandoffRequest> {
        let api = Arc::clone(&self.api);
        self.act(id, HandoffAction::Cancel, async move { api.cancel(id).await })
            .await
    }

    pub async fn close(&self, id: RequestId) -> Result<HandoffRequest> {
        let api = Arc::clone(&self.api);
        self.act(id, HandoffAction::Close, async move { api.close(id).await })
            .await
    }

    /// Customer ends the live conversation of a watched session.
    pub async fn end_by_user(&self, session_id: SessionId) -> Result<HandoffRequest> {
        let id = {
            let view = self.view.borrow();
            match view.get(session_id) {
                Some(tracked) if tracked.request.status.is_live() => tracked.request.id,
                Some(tracked) if tracked.request.status.is_terminal() => {
                    return Ok(tracked.request.clone());
                }
                _ => {
                    return Err(SwitchboardError::Validation(format!(
                        "session {session_id} has no live handoff to end"
                    )));
                }
            }
        };
        let api = Arc::clone(&self.api);
        self.act(id, HandoffAction::Complete, async move {
            api.end_by_user(session_id).await
        })
        .await
    }

    /// Route user text by the session's mode.
    pub async fn send_text(&self, session_id: SessionId, content: String) -> Result<Reply> {
        match self.mode(session_id) {
            SessionMode::AiServed => {
                let assistant = self.assistant.as_ref().ok_or_else(|| {
                    SwitchboardError::Validation("no assistant path configured".into())
                })?;
                let answer = assistant.ask(session_id, &content).await?;
                Ok(Reply::Assistant(answer))
            }
            SessionMode::HumanServed => {
                let channel = self.channel().ok_or_else(|| {
                    SwitchboardError::Validation("no live channel attached".into())
                })?;
                let payload = TextPayload {
                    session_id,
                    content,
                    sender: None,
                };
                match channel.send_typed(message_types::TEXT, &payload)? {
                    Delivery::Queued => Ok(Reply::Relayed),
                    Delivery::Dropped => Ok(Reply::Dropped),
                }
            }
        }
    }

    /// Run one lifecycle action with speculative state and rollback.
    async fn act<F>(&self, id: RequestId, action: HandoffAction, call: F) -> Result<HandoffRequest>
    where
        F: Future<Output = Result<HandoffRequest>>,
    {
        let tracked = {
            let view = self.view.borrow();
            view.session_of(id).and_then(|s| view.get(s).cloned())
        };
        if let Some(tracked) = &tracked
            && action != HandoffAction::Accept
            && action.already_applied(tracked.request.status)
        {
            debug!(request_id = %id, %action, "duplicate intent, already applied");
            return Ok(tracked.request.clone());
        }

        let session = tracked.as_ref().map(|t| t.request.session_id);
        if let Some(session) = session {
            self.send(Command::Begin(session, action));
        }

        match call.await {
            Ok(request) => {
                info!(request_id = %id, %action, status = %request.status, "handoff action applied");
                self.send(Command::Snapshot(request.clone()));
                self.send(Command::Settle(request.session_id));
                Ok(request)
            }
            Err(e) => {
                let e = e.for_request(id);
                if let Some(session) = session {
                    if matches!(
                        e,
                        SwitchboardError::RaceLost { .. } | SwitchboardError::InvalidTransition { .. }
                    ) {
                        info!(request_id = %id, %action, error = %e, "handoff action refused, rolling back");
                        self.send(Command::Rollback(session));
                    } else {
                        self.send(Command::Settle(session));
                    }
                }
                Err(e)
            }
        }
    }

    fn send(&self, command: Command) {
        if self.mailbox.send(command).is_err() {
            warn!("handoff coordinator stopped, command dropped");
        }
    }

    /// Stop the mailbox task and release the channel lease.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        drop(self.attachment.take());
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "handoff coordinator task failed");
        }
    }
}

impl Drop for HandoffCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for HandoffCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffCoordinator")
            .field("attached", &self.attachment.get().is_some())
            .field("sessions", &self.view.borrow().sessions().count())
            .finish()
    }
}

/// Subscribe one channel instance to the pushes the coordinator cares about.
fn install(
    channel: &DurableChannel,
    mailbox: mpsc::UnboundedSender<Command>,
    events: EventBus<HandoffEvent>,
    cancel: CancellationToken,
) {
    for kind in HINT_TYPES {
        let mailbox = mailbox.clone();
        channel.on(kind, move |envelope| match envelope.decode::<HandoffHint>() {
            Ok(hint) => {
                let _ = mailbox.send(Command::Hint(hint));
            }
            Err(e) => warn!(kind = %envelope.kind, error = %e, "malformed handoff push dropped"),
        });
    }

    let offered_mailbox = mailbox.clone();
    let offered_events = events.clone();
    channel.on(message_types::HANDOFF_REQUEST, move |envelope| {
        match envelope.decode::<HandoffHint>() {
            Ok(hint) => {
                offered_events.publish(HandoffEvent::Offered {
                    session_id: hint.session_id,
                    request_id: hint.handoff_request_id,
                });
                let _ = offered_mailbox.send(Command::Hint(hint));
            }
            Err(e) => warn!(error = %e, "malformed handoff offer dropped"),
        }
    });

    channel.on(message_types::TEXT, move |envelope| {
        match envelope.decode::<TextPayload>() {
            Ok(text) => {
                events.publish(HandoffEvent::Text(text));
            }
            Err(e) => warn!(error = %e, "malformed text push dropped"),
        }
    });

    let mut state = channel.subscribe_state();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *state.borrow_and_update();
                    if let ChannelState::Open { epoch } = current
                        && epoch > 1
                    {
                        info!(epoch, "channel reopened, reconciling handoffs");
                        let _ = mailbox.send(Command::Reconnected);
                    }
                }
            }
        }
    });
}

async fn run(
    api: Arc<dyn HandoffApi>,
    mut inbox: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<HandoffTracker>,
    events: EventBus<HandoffEvent>,
    cancel: CancellationToken,
) {
    let worker = Worker { api, view, events };
    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = inbox.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        worker.handle(command).await;
    }
    debug!("handoff coordinator stopped");
}

struct Worker {
    api: Arc<dyn HandoffApi>,
    view: watch::Sender<HandoffTracker>,
    events: EventBus<HandoffEvent>,
}

impl Worker {
    async fn handle(&self, command: Command) {
        match command {
            Command::Watch {
                session_id,
                refresh,
            } => {
                let added = self.view.send_if_modified(|t| t.watch(session_id));
                if added {
                    debug!(session_id = %session_id, "watching session");
                }
                if refresh {
                    self.refetch(session_id).await;
                }
            }
            Command::Unwatch(session_id) => {
                self.view.send_if_modified(|t| t.unwatch(session_id));
            }
            Command::Hint(hint) => {
                if self.view.borrow().is_watching(hint.session_id) {
                    self.refetch(hint.session_id).await;
                } else {
                    debug!(session_id = %hint.session_id, "push for unwatched session ignored");
                }
            }
            Command::Snapshot(request) => self.apply(request),
            Command::Begin(session_id, action) => {
                self.view.send_if_modified(|t| t.begin(session_id, action));
            }
            Command::Settle(session_id) => {
                self.view.send_modify(|t| t.settle(session_id));
            }
            Command::Rollback(session_id) => {
                self.view.send_modify(|t| t.settle(session_id));
                self.refetch(session_id).await;
            }
            Command::Reconnected => {
                self.view.send_modify(HandoffTracker::mark_stale);
                let sessions: Vec<SessionId> = self.view.borrow().sessions().collect();
                for session_id in sessions {
                    self.refetch(session_id).await;
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn refetch(&self, session_id: SessionId) {
        match self.api.by_session(session_id).await {
            Ok(Some(request)) => self.apply(request),
            Ok(None) => {
                self.view.send_if_modified(|t| t.clear_if_terminal(session_id));
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "handoff re-fetch failed");
            }
        }
    }

    fn apply(&self, request: HandoffRequest) {
        let mut outcome = Err(Ignored::Unwatched);
        self.view.send_if_modified(|t| {
            outcome = t.apply(request);
            outcome.is_ok()
        });
        match outcome {
            Ok(update) => {
                info!(
                    session_id = %update.session_id,
                    request_id = %update.request.id,
                    from = ?update.previous,
                    to = %update.request.status,
                    mode = %update.mode,
                    "handoff updated"
                );
                self.events.publish(HandoffEvent::Changed(update));
            }
            Err(Ignored::Duplicate) => debug!("duplicate handoff snapshot ignored"),
            Err(reason) => debug!(?reason, "handoff snapshot ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchboard_channel::ReconnectPolicy;
    use switchboard_core::{Envelope, HandoffStatus};
    use switchboard_test_utils::{HandoffCall, MockAssistant, RecordingHandoffApi, RelayServer};

    const WAIT: Duration = Duration::from_secs(3);

    fn manager(relay: &RelayServer) -> ChannelManager {
        let url = relay.url();
        ChannelManager::new(Arc::new(move |role| {
            DurableChannel::builder(role, url.clone())
                .credential("tok-9")
                .reconnect_policy(ReconnectPolicy::fixed(Duration::from_millis(50)))
                .build()
        }))
    }

    async fn next_change(rx: &mut broadcast::Receiver<HandoffEvent>) -> HandoffUpdate {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(HandoffEvent::Changed(update)) = rx.recv().await {
                    return update;
                }
            }
        })
        .await
        .expect("no handoff change published")
    }

    fn hint(kind: &str, request: &HandoffRequest) -> Envelope {
        Envelope::new(
            kind,
            serde_json::json!({
                "sessionId": request.session_id,
                "handoffRequestId": request.id,
            }),
        )
    }

    #[tokio::test]
    async fn timed_out_transfer_is_still_followed() {
        let api = Arc::new(RecordingHandoffApi::new());
        let created = api.seed(SessionId(42), HandoffStatus::Pending);
        api.fail_next(SwitchboardError::Timeout {
            duration: Duration::from_secs(1),
        });
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);

        let err = coordinator
            .request_transfer(SessionId(42), Some("billing issue".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Timeout { .. }));

        coordinator.settled().await;
        assert_eq!(api.count(&HandoffCall::Transfer(SessionId(42))), 1);
        assert!(api.count(&HandoffCall::BySession(SessionId(42))) >= 1);
        let tracked = coordinator.tracked(SessionId(42)).expect("session not tracked");
        assert_eq!(tracked.request.id, created.id);
        assert!(coordinator.waiting(SessionId(42)));
    }

    #[tokio::test]
    async fn refused_transfer_is_not_followed() {
        let api = Arc::new(RecordingHandoffApi::new());
        api.fail_next(SwitchboardError::Validation("already active".into()));
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);

        assert!(coordinator
            .request_transfer(SessionId(42), None, None)
            .await
            .is_err());
        coordinator.settled().await;
        assert_eq!(api.count(&HandoffCall::BySession(SessionId(42))), 0);
        assert!(coordinator.tracked(SessionId(42)).is_none());
    }

    #[tokio::test]
    async fn nobody_online_gives_fallback_and_stays_ai_served() {
        let api = Arc::new(RecordingHandoffApi::new());
        api.nobody_online();
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);

        let outcome = coordinator
            .request_transfer(SessionId(42), Some("billing issue".into()), None)
            .await
            .unwrap();
        assert!(outcome.is_fallback());
        let TransferOutcome::Fallback { ticket_id, .. } = outcome else {
            unreachable!()
        };
        assert!(!ticket_id.is_empty());

        coordinator.settled().await;
        assert_eq!(coordinator.mode(SessionId(42)), SessionMode::AiServed);
        assert!(!coordinator.waiting(SessionId(42)));
    }

    #[tokio::test]
    async fn second_attach_registers_nothing() {
        let relay = RelayServer::start().await.unwrap();
        let manager = manager(&relay);
        let coordinator = HandoffCoordinator::spawn(Arc::new(RecordingHandoffApi::new()), None);
        coordinator.attach(&manager, Role::Customer).unwrap();
        let err = coordinator.attach(&manager, Role::Customer).unwrap_err();
        assert!(matches!(err, SwitchboardError::Validation(_)));
        assert_eq!(manager.installer_count(), 1);
        assert_eq!(manager.lease_count(Role::Customer), 1);

        coordinator.shutdown().await;
        assert_eq!(manager.installer_count(), 0);
        assert_eq!(manager.lease_count(Role::Customer), 0);
    }

    #[tokio::test]
    async fn push_is_a_hint_for_a_refetch() {
        let relay = RelayServer::start().await.unwrap();
        let manager = manager(&relay);
        let api = Arc::new(RecordingHandoffApi::new());
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);
        coordinator.attach(&manager, Role::Customer).unwrap();
        coordinator.channel().unwrap().wait_open(WAIT).await.unwrap();
        let mut events = coordinator.subscribe();

        let request = api.seed(SessionId(42), HandoffStatus::Pending);
        coordinator.watch(SessionId(42));
        assert_eq!(next_change(&mut events).await.request.status, HandoffStatus::Pending);
        assert!(coordinator.waiting(SessionId(42)));

        // the server moved on; the push carries no status of its own
        let mut accepted = request.clone();
        accepted.status = HandoffStatus::Accepted;
        accepted.assigned_operator_id = Some(switchboard_core::OperatorId(3));
        accepted.revision = 2;
        api.set(accepted);
        relay.push(&hint(message_types::HANDOFF_ACCEPTED, &request));

        let update = next_change(&mut events).await;
        assert!(update.entered(HandoffStatus::Accepted));
        assert_eq!(coordinator.mode(SessionId(42)), SessionMode::HumanServed);
        assert!(api.count(&HandoffCall::BySession(SessionId(42))) >= 2);
    }

    #[tokio::test]
    async fn replayed_completion_changes_state_once() {
        let relay = RelayServer::start().await.unwrap();
        let manager = manager(&relay);
        let api = Arc::new(RecordingHandoffApi::new());
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);
        coordinator.attach(&manager, Role::Operator).unwrap();
        coordinator.channel().unwrap().wait_open(WAIT).await.unwrap();
        let mut events = coordinator.subscribe();

        let request = api.seed(SessionId(42), HandoffStatus::InProgress);
        coordinator.watch(SessionId(42));
        next_change(&mut events).await;
        assert_eq!(coordinator.live_count(), 1);

        let mut done = request.clone();
        done.status = HandoffStatus::Completed;
        done.assigned_operator_id = None;
        done.revision = 2;
        api.set(done);
        relay.push(&hint(message_types::HANDOFF_COMPLETED, &request));
        relay.push(&hint(message_types::HANDOFF_COMPLETED, &request));

        assert!(next_change(&mut events).await.entered(HandoffStatus::Completed));
        assert!(
            api.wait_for(&HandoffCall::BySession(SessionId(42)), 3, WAIT).await,
            "both pushes should trigger a re-fetch"
        );
        coordinator.settled().await;
        assert_eq!(coordinator.live_count(), 0);
        assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn race_lost_rolls_back_and_refetches() {
        let api = Arc::new(RecordingHandoffApi::new());
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);
        let request = api.seed(SessionId(7), HandoffStatus::Assigned);
        coordinator.watch(SessionId(7));
        coordinator.settled().await;

        api.fail_next(SwitchboardError::RaceLost {
            request_id: None,
            message: "operator 2 accepted first".into(),
        });
        let err = coordinator.accept(request.id).await.unwrap_err();
        assert!(matches!(
            err,
            SwitchboardError::RaceLost { request_id: Some(id), .. } if id == request.id
        ));

        coordinator.settled().await;
        let tracked = coordinator.tracked(SessionId(7)).unwrap();
        assert_eq!(tracked.pending_action, None);
        assert_eq!(api.count(&HandoffCall::BySession(SessionId(7))), 2);
    }

    #[tokio::test]
    async fn duplicate_complete_does_not_reach_the_server() {
        let api = Arc::new(RecordingHandoffApi::new());
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);
        let request = api.seed(SessionId(5), HandoffStatus::InProgress);
        coordinator.watch(SessionId(5));
        coordinator.settled().await;

        let first = coordinator.complete(request.id).await.unwrap();
        coordinator.settled().await;
        let second = coordinator.complete(request.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.count(&HandoffCall::Complete(request.id)), 1);
    }

    #[tokio::test]
    async fn end_requires_a_live_request() {
        let api = Arc::new(RecordingHandoffApi::new());
        let coordinator = HandoffCoordinator::spawn(api.clone(), None);
        let err = coordinator.end_by_user(SessionId(99)).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::Validation(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn text_follows_the_session_mode() {
        let relay = RelayServer::start().await.unwrap();
        let manager = manager(&relay);
        let api = Arc::new(RecordingHandoffApi::new());
        let assistant = Arc::new(MockAssistant::with_answers(vec!["Try restarting it.".into()]));
        let coordinator = HandoffCoordinator::spawn(api.clone(), Some(assistant.clone()));
        coordinator.attach(&manager, Role::Customer).unwrap();
        coordinator.channel().unwrap().wait_open(WAIT).await.unwrap();

        let reply = coordinator
            .send_text(SessionId(42), "my router is down".into())
            .await
            .unwrap();
        assert_eq!(reply, Reply::Assistant("Try restarting it.".into()));

        api.seed(SessionId(42), HandoffStatus::Accepted);
        coordinator.watch(SessionId(42));
        coordinator.settled().await;
        let reply = coordinator
            .send_text(SessionId(42), "still down".into())
            .await
            .unwrap();
        assert_eq!(reply, Reply::Relayed);

        let frame = relay.next_frame_of(message_types::TEXT, WAIT).await.unwrap();
        assert_eq!(frame.payload["content"], "still down");
        assert_eq!(assistant.ask_count().await, 1);
    }
}
