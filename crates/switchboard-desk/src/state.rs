// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authoritative desk state.
//!
//! Every operation is synchronous and takes the current time explicitly.
//! Changes that other actors must hear about are queued as [`Push`]es and
//! drained by the caller with [`DeskState::take_pushes`] while it still holds
//! the lock, so pushes leave in commit order.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use switchboard_config::model::{DeskConfig, RatingConfig};
use switchboard_core::report::{HandoffEventKind, HandoffEventRecord};
use switchboard_core::wire::{
    HandoffAcceptedPush, HandoffCancelledPush, HandoffCompletedPush, HandoffRequestPush,
    QueueUpdatePush, TextPayload, TransferBody,
};
use switchboard_core::{
    Actor, CustomerId, Envelope, HandoffAction, HandoffRequest, HandoffStatus, OperatorId,
    OperatorPresence, Party, PresenceStatus, Priority, RequestId, Result, Role, SessionId,
    SwitchboardError, message_types, transition,
};
use tracing::{debug, info, warn};

use crate::notices::NoticeRecord;
use crate::push::Push;
use crate::ratings::RatingEntry;

pub(crate) struct Entry {
    pub(crate) request: HandoffRequest,
    pub(crate) rejected_by: BTreeSet<OperatorId>,
    /// The operator who accepted it; kept after the seat is released.
    pub(crate) served_by: Option<OperatorId>,
    pub(crate) accepted_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
}

/// The desk's single source of truth.
pub struct DeskState {
    pub(crate) config: DeskConfig,
    pub(crate) rating_config: RatingConfig,
    next_request: u64,
    next_ticket: u64,
    pub(crate) next_notification: u64,
    pub(crate) requests: BTreeMap<RequestId, Entry>,
    /// Most recent request per session.
    pub(crate) latest: HashMap<SessionId, RequestId>,
    /// Waiting requests (PENDING or ASSIGNED) in service order.
    pub(crate) queue: VecDeque<RequestId>,
    pub(crate) operators: BTreeMap<OperatorId, OperatorPresence>,
    pub(crate) ratings: HashMap<RequestId, RatingEntry>,
    pub(crate) notices: Vec<NoticeRecord>,
    pub(crate) next_event: u64,
    pub(crate) events: Vec<HandoffEventRecord>,
    outbox: Vec<Push>,
}

impl std::fmt::Debug for DeskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskState")
            .field("requests", &self.requests.len())
            .field("queue", &self.queue)
            .field("operators", &self.operators.len())
            .finish()
    }
}

impl DeskState {
    pub fn new(config: DeskConfig, rating_config: RatingConfig) -> Self {
        Self {
            config,
            rating_config,
            next_request: 1,
            next_ticket: 1001,
            next_notification: 1,
            requests: BTreeMap::new(),
            latest: HashMap::new(),
            queue: VecDeque::new(),
            operators: BTreeMap::new(),
            ratings: HashMap::new(),
            notices: Vec::new(),
            next_event: 1,
            events: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// Pushes queued since the last drain.
    pub fn take_pushes(&mut self) -> Vec<Push> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn emit(&mut self, push: Push) {
        self.outbox.push(push);
    }

    // --- reads ---

    pub fn request(&self, id: RequestId) -> Result<HandoffRequest> {
        self.requests
            .get(&id)
            .map(|entry| entry.request.clone())
            .ok_or_else(|| unknown_request(id))
    }

    pub fn by_session(&self, session_id: SessionId) -> Option<HandoffRequest> {
        self.latest
            .get(&session_id)
            .and_then(|id| self.requests.get(id))
            .map(|entry| entry.request.clone())
    }

    /// Waiting requests an operator may pick up: unassigned ones and those
    /// offered to it.
    pub fn pending_for(&self, operator_id: OperatorId) -> Vec<HandoffRequest> {
        self.queue
            .iter()
            .filter_map(|id| self.requests.get(id))
            .filter(|entry| match entry.request.status {
                HandoffStatus::Pending => !entry.rejected_by.contains(&operator_id),
                HandoffStatus::Assigned => entry.request.assigned_operator_id == Some(operator_id),
                _ => false,
            })
            .map(|entry| entry.request.clone())
            .collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // --- admission ---

    /// Admission control for a customer-initiated transfer.
    pub fn request_transfer(
        &mut self,
        customer_id: CustomerId,
        body: TransferBody,
        now: DateTime<Utc>,
    ) -> Result<HandoffRequest> {
        if let Some(active) = self.by_session(body.session_id)
            && !active.status.is_terminal()
        {
            return Err(SwitchboardError::Validation(format!(
                "session {} already has active handoff request {}",
                body.session_id, active.id
            )));
        }

        let id = RequestId(self.next_request);
        self.next_request += 1;
        let mut request = HandoffRequest {
            id,
            session_id: body.session_id,
            customer_id,
            reason: body.reason.filter(|r| !r.trim().is_empty()),
            status: HandoffStatus::Pending,
            priority: body.priority.unwrap_or_default(),
            queue_position: None,
            estimated_wait_seconds: None,
            assigned_operator_id: None,
            ticket_id: None,
            reject_reason: None,
            ended_by: None,
            created_at: now,
            updated_at: now,
            revision: 1,
        };

        let online = self
            .operators
            .values()
            .any(|o| o.status == PresenceStatus::Online);
        let queue_full = self.queue.len() >= self.config.max_queue_length;

        if !online || queue_full {
            request.status = transition(request.status, HandoffAction::NoCapacity)?;
            let ticket = format!("T-{:05}", self.next_ticket);
            self.next_ticket += 1;
            info!(
                request_id = %id,
                session_id = %request.session_id,
                ticket = %ticket,
                online,
                queue_full,
                "no capacity, opening fallback ticket"
            );
            request.ticket_id = Some(ticket.clone());
            self.insert(request.clone());
            self.record_event(id, HandoffEventKind::Created, Party::Customer, Some(customer_id.0), Some(ticket), now);
            return Ok(request);
        }

        info!(request_id = %id, session_id = %request.session_id, priority = %request.priority, "handoff requested");
        let reason = request.reason.clone();
        self.insert(request);
        self.record_event(id, HandoffEventKind::Created, Party::Customer, Some(customer_id.0), reason, now);
        self.queue.push_back(id);
        self.assign_waiting(now);
        self.publish_queue();
        self.request(id)
    }

    fn insert(&mut self, request: HandoffRequest) {
        self.latest.insert(request.session_id, request.id);
        self.requests.insert(
            request.id,
            Entry {
                request,
                rejected_by: BTreeSet::new(),
                served_by: None,
                accepted_at: None,
                ended_at: None,
            },
        );
    }

    // --- assignment ---

    /// Offer every unassigned waiting request to its best candidate.
    pub(crate) fn assign_waiting(&mut self, now: DateTime<Utc>) {
        if !self.config.auto_assign {
            return;
        }
        let waiting: Vec<RequestId> = self.queue.iter().copied().collect();
        for id in waiting {
            let Some(entry) = self.requests.get(&id) else {
                continue;
            };
            if entry.request.status != HandoffStatus::Pending {
                continue;
            }
            let Some(operator_id) = self.best_candidate(entry) else {
                debug!(request_id = %id, "no candidate operator");
                continue;
            };
            let Some(entry) = self.requests.get_mut(&id) else {
                continue;
            };
            let Ok(next) = transition(entry.request.status, HandoffAction::Assign) else {
                continue;
            };
            entry.request.status = next;
            entry.request.assigned_operator_id = Some(operator_id);
            touch(&mut entry.request, now);
            info!(request_id = %id, operator_id = %operator_id, "handoff assigned");

            let request = entry.request.clone();
            self.record_event(id, HandoffEventKind::Assigned, Party::System, Some(operator_id.0), None, now);
            self.offer(operator_id, &request);
        }
    }

    fn offer(&mut self, operator_id: OperatorId, request: &HandoffRequest) {
        let push = HandoffRequestPush {
            handoff_request_id: request.id,
            session_id: request.session_id,
            customer_id: request.customer_id,
            priority: request.priority,
            reason: request.reason.clone(),
            queue_position: request.queue_position,
        };
        self.push_to(Actor::operator(operator_id), message_types::HANDOFF_REQUEST, &push);
    }

    /// Requests offered to an operator but not yet decided.
    fn reserved(&self, operator_id: OperatorId) -> u32 {
        self.queue
            .iter()
            .filter_map(|id| self.requests.get(id))
            .filter(|e| {
                e.request.status == HandoffStatus::Assigned
                    && e.request.assigned_operator_id == Some(operator_id)
            })
            .count() as u32
    }

    fn best_candidate(&self, entry: &Entry) -> Option<OperatorId> {
        let mut best: Option<(OperatorId, f64)> = None;
        for operator in self.operators.values() {
            if entry.rejected_by.contains(&operator.operator_id) {
                continue;
            }
            let Some(score) = self.score(operator, &entry.request) else {
                continue;
            };
            // Strictly greater keeps the lowest id on ties.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((operator.operator_id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Assignment score, or `None` when the operator cannot take the request.
    fn score(&self, operator: &OperatorPresence, request: &HandoffRequest) -> Option<f64> {
        if !operator.can_accept() {
            return None;
        }
        let held = operator.current_session_count + self.reserved(operator.operator_id);
        if held >= operator.max_session_count {
            return None;
        }
        let load = held as f64 / operator.max_session_count as f64;

        let mut score = 50.0 + 30.0 * (1.0 - load);
        if skill_matches(&operator.skills, request.reason.as_deref()) {
            score += 20.0;
        }
        if request.priority == Priority::Urgent && operator.senior {
            score += 10.0;
        }
        if operator.auto_accept {
            score += 5.0;
        }
        Some(score)
    }

    /// Refresh queue positions and tell every waiting customer.
    pub(crate) fn publish_queue(&mut self) {
        let avg = self.config.avg_handle_secs;
        let mut updates = Vec::with_capacity(self.queue.len());
        for (index, id) in self.queue.iter().enumerate() {
            let Some(entry) = self.requests.get_mut(id) else {
                continue;
            };
            let position = index as u32 + 1;
            let wait = u64::from(position) * avg;
            entry.request.queue_position = Some(position);
            entry.request.estimated_wait_seconds = Some(wait);
            updates.push((
                entry.request.customer_id,
                QueueUpdatePush {
                    handoff_request_id: *id,
                    session_id: entry.request.session_id,
                    queue_position: position,
                    estimated_wait_seconds: wait,
                },
            ));
        }
        for (customer_id, update) in updates {
            self.push_to(Actor::customer(customer_id), message_types::QUEUE_UPDATE, &update);
        }
    }

    fn dequeue(&mut self, id: RequestId) {
        self.queue.retain(|queued| *queued != id);
        if let Some(entry) = self.requests.get_mut(&id) {
            entry.request.queue_position = None;
            entry.request.estimated_wait_seconds = None;
        }
    }

    // --- operator decisions ---

    /// First writer wins: a PENDING request is claimed, an ASSIGNED one is
    /// accepted by its assignee only.
    pub fn accept(
        &mut self,
        operator_id: OperatorId,
        id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<HandoffRequest> {
        let entry = self.requests.get(&id).ok_or_else(|| unknown_request(id))?;
        let status = entry.request.status;
        let assignee = entry.request.assigned_operator_id;

        if HandoffAction::Accept.already_applied(status) {
            if assignee == Some(operator_id) {
                debug!(request_id = %id, operator_id = %operator_id, "duplicate accept");
                return Ok(entry.request.clone());
            }
            return Err(race_lost(id, format!("already accepted by operator {}", display_op(assignee))));
        }
        if status == HandoffStatus::Assigned && assignee != Some(operator_id) {
            return Err(race_lost(id, format!("offered to operator {}", display_op(assignee))));
        }
        let next = transition(status, HandoffAction::Accept).map_err(|e| e.for_request(id))?;

        let operator = self
            .operators
            .get(&operator_id)
            .ok_or_else(|| unknown_operator(operator_id))?;
        if status == HandoffStatus::Pending && !operator.can_accept() {
            return Err(SwitchboardError::InvalidTransition {
                request_id: Some(id),
                message: format!(
                    "operator {operator_id} is {} with {}/{} sessions",
                    operator.status, operator.current_session_count, operator.max_session_count
                ),
            });
        }

        if let Some(operator) = self.operators.get_mut(&operator_id) {
            operator.current_session_count += 1;
            operator.last_active_at = now;
            operator.revision += 1;
        }
        self.dequeue(id);
        let Some(entry) = self.requests.get_mut(&id) else {
            return Err(unknown_request(id));
        };
        entry.request.status = next;
        entry.request.assigned_operator_id = Some(operator_id);
        entry.served_by = Some(operator_id);
        entry.accepted_at = Some(now);
        touch(&mut entry.request, now);
        let request = entry.request.clone();
        info!(request_id = %id, operator_id = %operator_id, "handoff accepted");
        self.record_event(id, HandoffEventKind::Accepted, Party::Operator, Some(operator_id.0), None, now);

        let push = HandoffAcceptedPush {
            handoff_request_id: id,
            session_id: request.session_id,
            operator_id,
        };
        for actor in [Actor::customer(request.customer_id), Actor::operator(operator_id)] {
            self.push_to(actor, message_types::HANDOFF_ACCEPTED, &push);
        }
        self.publish_queue();
        Ok(request)
    }

    /// Decline an offered request; it goes back to the front of the queue, or
    /// is cancelled when no other operator is online.
    pub fn reject(
        &mut self,
        operator_id: OperatorId,
        id: RequestId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<HandoffRequest> {
        let entry = self.requests.get(&id).ok_or_else(|| unknown_request(id))?;
        let status = entry.request.status;
        if entry.rejected_by.contains(&operator_id) {
            debug!(request_id = %id, operator_id = %operator_id, "duplicate reject");
            return Ok(entry.request.clone());
        }
        if status == HandoffStatus::Assigned && entry.request.assigned_operator_id != Some(operator_id) {
            return Err(SwitchboardError::InvalidTransition {
                request_id: Some(id),
                message: format!("request is offered to another operator, not {operator_id}"),
            });
        }
        if status != HandoffStatus::Assigned {
            transition(status, HandoffAction::Reject { requeue: true })
                .map_err(|e| e.for_request(id))?;
        }

        let mut excluded = entry.rejected_by.clone();
        excluded.insert(operator_id);
        let requeue = self
            .operators
            .values()
            .any(|o| o.status == PresenceStatus::Online && !excluded.contains(&o.operator_id));
        let next = transition(status, HandoffAction::Reject { requeue }).map_err(|e| e.for_request(id))?;

        self.dequeue(id);
        let Some(entry) = self.requests.get_mut(&id) else {
            return Err(unknown_request(id));
        };
        entry.rejected_by.insert(operator_id);
        entry.request.status = next;
        entry.request.assigned_operator_id = None;
        entry.request.reject_reason = reason.clone();
        touch(&mut entry.request, now);
        let request = entry.request.clone();
        self.record_event(id, HandoffEventKind::Rejected, Party::Operator, Some(operator_id.0), reason, now);

        if requeue {
            info!(request_id = %id, operator_id = %operator_id, "handoff rejected, requeued");
            self.queue.push_front(id);
            self.assign_waiting(now);
        } else {
            info!(request_id = %id, operator_id = %operator_id, "handoff rejected, no operator left");
            if let Some(entry) = self.requests.get_mut(&id) {
                entry.request.ended_by = Some(Party::System);
                entry.ended_at = Some(now);
            }
            self.record_event(
                id,
                HandoffEventKind::Cancelled,
                Party::System,
                None,
                Some("no operator left to offer it to".into()),
                now,
            );
            self.notify_cancelled(&request, None);
        }
        self.publish_queue();
        self.request(id)
    }

    /// Operator ends a live conversation.
    pub fn complete(
        &mut self,
        operator_id: OperatorId,
        id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<HandoffRequest> {
        let entry = self.requests.get(&id).ok_or_else(|| unknown_request(id))?;
        if HandoffAction::Complete.already_applied(entry.request.status) {
            debug!(request_id = %id, "duplicate complete");
            return Ok(entry.request.clone());
        }
        if entry.request.status.is_live() && entry.request.assigned_operator_id != Some(operator_id) {
            return Err(SwitchboardError::InvalidTransition {
                request_id: Some(id),
                message: format!(
                    "handled by operator {}, not {operator_id}",
                    display_op(entry.request.assigned_operator_id)
                ),
            });
        }
        self.finish(id, Party::Operator, now)
    }

    /// Customer ends the live conversation of a session.
    pub fn end_by_user(
        &mut self,
        customer_id: CustomerId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<HandoffRequest> {
        let request = self
            .by_session(session_id)
            .filter(|r| r.customer_id == customer_id)
            .ok_or_else(|| {
                SwitchboardError::NotFound(format!("no handoff request for session {session_id}"))
            })?;
        if HandoffAction::Complete.already_applied(request.status) {
            debug!(request_id = %request.id, "duplicate end-by-user");
            return Ok(request);
        }
        self.finish(request.id, Party::Customer, now)
    }

    fn finish(&mut self, id: RequestId, ended_by: Party, now: DateTime<Utc>) -> Result<HandoffRequest> {
        let entry = self.requests.get_mut(&id).ok_or_else(|| unknown_request(id))?;
        let next = transition(entry.request.status, HandoffAction::Complete)
            .map_err(|e| e.for_request(id))?;
        let operator_id = entry.request.assigned_operator_id;
        entry.request.status = next;
        entry.request.ended_by = Some(ended_by);
        entry.request.assigned_operator_id = None;
        entry.ended_at = Some(now);
        touch(&mut entry.request, now);
        let request = entry.request.clone();

        let actor_id = match ended_by {
            Party::Customer => Some(request.customer_id.0),
            Party::Operator | Party::System => operator_id.map(|op| op.0),
        };
        self.record_event(id, HandoffEventKind::Completed, ended_by, actor_id, None, now);
        if let Some(operator_id) = operator_id {
            self.release_seat(operator_id);
        }
        self.open_rating(&request, operator_id, now);
        info!(request_id = %id, ended_by = %ended_by, "handoff completed");

        let push = HandoffCompletedPush {
            handoff_request_id: id,
            session_id: request.session_id,
            ended_by,
            message: Some(match ended_by {
                Party::Customer => "The customer ended the conversation".to_string(),
                Party::Operator => "The operator ended the conversation".to_string(),
                Party::System => "The conversation was ended".to_string(),
            }),
        };
        let mut parties = vec![Actor::customer(request.customer_id)];
        parties.extend(operator_id.map(Actor::operator));
        for actor in parties {
            self.push_to(actor, message_types::HANDOFF_COMPLETED, &push);
        }

        self.assign_waiting(now);
        self.publish_queue();
        Ok(request)
    }

    /// Customer withdraws a waiting request.
    pub fn cancel(
        &mut self,
        customer_id: CustomerId,
        id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<HandoffRequest> {
        let entry = self
            .requests
            .get(&id)
            .filter(|e| e.request.customer_id == customer_id)
            .ok_or_else(|| unknown_request(id))?;
        if HandoffAction::Cancel.already_applied(entry.request.status) {
            debug!(request_id = %id, "duplicate cancel");
            return Ok(entry.request.clone());
        }
        let next = transition(entry.request.status, HandoffAction::Cancel)
            .map_err(|e| e.for_request(id))?;
        let offered_to = entry.request.assigned_operator_id;

        self.dequeue(id);
        let Some(entry) = self.requests.get_mut(&id) else {
            return Err(unknown_request(id));
        };
        entry.request.status = next;
        entry.request.assigned_operator_id = None;
        entry.ended_at = Some(now);
        touch(&mut entry.request, now);
        let request = entry.request.clone();
        info!(request_id = %id, "handoff cancelled by customer");
        self.record_event(id, HandoffEventKind::Cancelled, Party::Customer, Some(customer_id.0), None, now);

        self.notify_cancelled(&request, offered_to);
        self.publish_queue();
        Ok(request)
    }

    /// Administrative close from any non-terminal status.
    pub fn close(&mut self, id: RequestId, now: DateTime<Utc>) -> Result<HandoffRequest> {
        let entry = self.requests.get(&id).ok_or_else(|| unknown_request(id))?;
        if HandoffAction::Close.already_applied(entry.request.status) {
            return Ok(entry.request.clone());
        }
        let was_live = entry.request.status.is_live();
        let next = transition(entry.request.status, HandoffAction::Close)
            .map_err(|e| e.for_request(id))?;
        let held_by = entry.request.assigned_operator_id;

        self.dequeue(id);
        let Some(entry) = self.requests.get_mut(&id) else {
            return Err(unknown_request(id));
        };
        entry.request.status = next;
        entry.request.assigned_operator_id = None;
        entry.request.ended_by = Some(Party::System);
        entry.ended_at = Some(now);
        touch(&mut entry.request, now);
        let request = entry.request.clone();
        self.record_event(id, HandoffEventKind::Closed, Party::System, None, None, now);

        if was_live && let Some(operator_id) = held_by {
            self.release_seat(operator_id);
        }
        warn!(request_id = %id, "handoff closed administratively");
        self.notify_cancelled(&request, held_by);
        self.assign_waiting(now);
        self.publish_queue();
        Ok(request)
    }

    fn notify_cancelled(&mut self, request: &HandoffRequest, operator_id: Option<OperatorId>) {
        let push = HandoffCancelledPush {
            handoff_request_id: request.id,
            session_id: request.session_id,
        };
        let mut parties = vec![Actor::customer(request.customer_id)];
        parties.extend(operator_id.map(Actor::operator));
        for actor in parties {
            self.push_to(actor, message_types::HANDOFF_CANCELLED, &push);
        }
    }

    fn release_seat(&mut self, operator_id: OperatorId) {
        if let Some(operator) = self.operators.get_mut(&operator_id) {
            operator.current_session_count = operator.current_session_count.saturating_sub(1);
            operator.revision += 1;
        }
    }

    /// Put an operator's undecided offers back in the queue.
    pub(crate) fn release_offers(&mut self, operator_id: OperatorId, now: DateTime<Utc>) {
        let offered: Vec<RequestId> = self
            .queue
            .iter()
            .copied()
            .filter(|id| {
                self.requests.get(id).is_some_and(|e| {
                    e.request.status == HandoffStatus::Assigned
                        && e.request.assigned_operator_id == Some(operator_id)
                })
            })
            .collect();
        for id in offered {
            if let Some(entry) = self.requests.get_mut(&id)
                && let Ok(next) = transition(entry.request.status, HandoffAction::Release)
            {
                entry.request.status = next;
                entry.request.assigned_operator_id = None;
                touch(&mut entry.request, now);
                info!(request_id = %id, operator_id = %operator_id, "offer released");
                self.record_event(id, HandoffEventKind::Released, Party::System, Some(operator_id.0), None, now);
            }
        }
    }

    // --- live text ---

    /// Relay chat text to the other party. The first message moves the
    /// request to IN_PROGRESS.
    pub fn relay_text(&mut self, sender: Actor, text: TextPayload, now: DateTime<Utc>) -> Result<()> {
        let id = *self.latest.get(&text.session_id).ok_or_else(|| {
            SwitchboardError::NotFound(format!("no handoff request for session {}", text.session_id))
        })?;
        let entry = self.requests.get_mut(&id).ok_or_else(|| unknown_request(id))?;
        if !entry.request.status.is_live() {
            return Err(SwitchboardError::InvalidTransition {
                request_id: Some(id),
                message: format!("no live conversation, request is {}", entry.request.status),
            });
        }
        let operator_id = entry
            .request
            .assigned_operator_id
            .ok_or_else(|| SwitchboardError::Internal(format!("live request {id} has no operator")))?;
        let recipient = match sender.role {
            Role::Customer if sender.id == entry.request.customer_id.0 => Actor::operator(operator_id),
            Role::Operator if sender.id == operator_id.0 => Actor::customer(entry.request.customer_id),
            _ => {
                return Err(SwitchboardError::Validation(format!(
                    "{sender} is not a party to session {}",
                    text.session_id
                )));
            }
        };

        let started = entry.request.status == HandoffStatus::Accepted;
        if started {
            entry.request.status = transition(entry.request.status, HandoffAction::FirstMessage)?;
            touch(&mut entry.request, now);
            info!(request_id = %id, "conversation in progress");
        }

        let payload = TextPayload {
            session_id: text.session_id,
            content: text.content,
            sender: Some(sender.role),
        };
        self.push_to(recipient, message_types::TEXT, &payload);
        if started {
            let party = if sender.role == Role::Customer {
                Party::Customer
            } else {
                Party::Operator
            };
            self.record_event(id, HandoffEventKind::Started, party, Some(sender.id), None, now);
        }
        Ok(())
    }

    pub(crate) fn push_to<T: serde::Serialize>(&mut self, actor: Actor, kind: &str, payload: &T) {
        match Envelope::typed(kind, payload) {
            Ok(envelope) => self.emit(Push::to_actor(actor, envelope)),
            Err(e) => warn!(kind, error = %e, "push encode failed"),
        }
    }

    pub(crate) fn push_to_role<T: serde::Serialize>(&mut self, role: Role, kind: &str, payload: &T) {
        match Envelope::typed(kind, payload) {
            Ok(envelope) => self.emit(Push::to_role(role, envelope)),
            Err(e) => warn!(kind, error = %e, "push encode failed"),
        }
    }
}

fn touch(request: &mut HandoffRequest, now: DateTime<Utc>) {
    request.updated_at = now;
    request.revision += 1;
}

fn skill_matches(skills: &[String], reason: Option<&str>) -> bool {
    let Some(reason) = reason else {
        return false;
    };
    let reason = reason.to_lowercase();
    skills
        .iter()
        .any(|skill| !skill.is_empty() && reason.contains(&skill.to_lowercase()))
}

fn display_op(id: Option<OperatorId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "<none>".to_string())
}

fn race_lost(id: RequestId, message: String) -> SwitchboardError {
    SwitchboardError::RaceLost {
        request_id: Some(id),
        message,
    }
}

pub(crate) fn unknown_request(id: RequestId) -> SwitchboardError {
    SwitchboardError::NotFound(format!("handoff request {id}"))
}

pub(crate) fn unknown_operator(id: OperatorId) -> SwitchboardError {
    SwitchboardError::NotFound(format!("operator {id} is not registered"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::push::Target;
    use crate::roster::OperatorProfile;

    pub(crate) fn desk(auto_assign: bool) -> DeskState {
        let config = DeskConfig {
            auto_assign,
            ..DeskConfig::default()
        };
        DeskState::new(config, RatingConfig::default())
    }

    pub(crate) fn online(state: &mut DeskState, id: u64, skills: &[&str]) {
        let now = Utc::now();
        state.register_operator(
            OperatorProfile {
                operator_id: OperatorId(id),
                skills: skills.iter().map(|s| s.to_string()).collect(),
                senior: false,
                auto_accept: false,
                max_sessions: None,
            },
            now,
        );
        state
            .set_status(OperatorId(id), PresenceStatus::Online, now)
            .unwrap();
    }

    pub(crate) fn transfer(state: &mut DeskState, session: u64, reason: &str) -> HandoffRequest {
        state
            .request_transfer(
                CustomerId(9),
                TransferBody {
                    session_id: SessionId(session),
                    reason: Some(reason.to_string()),
                    priority: None,
                },
                Utc::now(),
            )
            .unwrap()
    }

    fn kinds_for(pushes: &[Push], actor: Actor) -> Vec<String> {
        pushes
            .iter()
            .filter(|p| p.target == Target::Actor(actor))
            .map(|p| p.envelope.kind.clone())
            .collect()
    }

    #[test]
    fn no_operator_online_falls_back_to_ticket() {
        let mut state = desk(true);
        let request = transfer(&mut state, 42, "billing issue");
        assert_eq!(request.status, HandoffStatus::FallbackTicket);
        assert_eq!(request.ticket_id.as_deref(), Some("T-01001"));
        assert!(request.operator_consistent());
        assert_eq!(state.queue_len(), 0);
    }

    #[test]
    fn full_queue_falls_back_to_ticket() {
        let mut state = desk(false);
        state.config.max_queue_length = 1;
        online(&mut state, 1, &[]);
        assert_eq!(transfer(&mut state, 1, "a").status, HandoffStatus::Pending);
        assert_eq!(transfer(&mut state, 2, "b").status, HandoffStatus::FallbackTicket);
    }

    #[test]
    fn second_active_request_for_session_is_rejected() {
        let mut state = desk(false);
        online(&mut state, 1, &[]);
        transfer(&mut state, 42, "billing issue");
        let err = state
            .request_transfer(
                CustomerId(9),
                TransferBody {
                    session_id: SessionId(42),
                    reason: None,
                    priority: None,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Validation(_)));
    }

    #[test]
    fn queue_positions_and_wait_estimates() {
        let mut state = desk(false);
        online(&mut state, 1, &[]);
        state.take_pushes();
        transfer(&mut state, 1, "a");
        let second = transfer(&mut state, 2, "b");
        assert_eq!(second.queue_position, Some(2));
        assert_eq!(second.estimated_wait_seconds, Some(60));

        let pushes = state.take_pushes();
        let updates: Vec<_> = pushes
            .iter()
            .filter(|p| p.envelope.kind == message_types::QUEUE_UPDATE)
            .collect();
        // One after the first admission, two after the second.
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn assignment_prefers_skill_match_then_lowest_id() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        online(&mut state, 2, &["billing"]);
        online(&mut state, 3, &["billing"]);
        state.take_pushes();

        let request = transfer(&mut state, 42, "Billing issue");
        assert_eq!(request.status, HandoffStatus::Assigned);
        assert_eq!(request.assigned_operator_id, Some(OperatorId(2)));
        let pushes = state.take_pushes();
        assert_eq!(
            kinds_for(&pushes, Actor::operator(OperatorId(2))),
            vec![message_types::HANDOFF_REQUEST.to_string()]
        );
    }

    #[test]
    fn reserved_offers_count_against_capacity() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        if let Some(op) = state.operators.get_mut(&OperatorId(1)) {
            op.max_session_count = 1;
        }
        assert_eq!(transfer(&mut state, 1, "a").status, HandoffStatus::Assigned);
        let second = transfer(&mut state, 2, "b");
        assert_eq!(second.status, HandoffStatus::Pending);
        assert!(second.assigned_operator_id.is_none());
    }

    #[test]
    fn concurrent_claim_has_one_winner() {
        let mut state = desk(false);
        online(&mut state, 1, &[]);
        online(&mut state, 2, &[]);
        for session in 1..=6 {
            transfer(&mut state, session, "filler");
            state.cancel(CustomerId(9), RequestId(session), Utc::now()).unwrap();
        }
        let request = transfer(&mut state, 42, "billing issue");
        assert_eq!(request.id, RequestId(7));
        assert_eq!(request.status, HandoffStatus::Pending);

        let now = Utc::now();
        let won = state.accept(OperatorId(1), RequestId(7), now).unwrap();
        let lost = state.accept(OperatorId(2), RequestId(7), now).unwrap_err();

        assert_eq!(won.status, HandoffStatus::Accepted);
        assert_eq!(won.assigned_operator_id, Some(OperatorId(1)));
        assert!(matches!(
            lost,
            SwitchboardError::RaceLost {
                request_id: Some(RequestId(7)),
                ..
            }
        ));
        assert_eq!(state.operators[&OperatorId(1)].current_session_count, 1);
        assert_eq!(state.operators[&OperatorId(2)].current_session_count, 0);

        // The winner repeating itself is a no-op.
        let again = state.accept(OperatorId(1), RequestId(7), now).unwrap();
        assert_eq!(again.revision, won.revision);
        assert_eq!(state.operators[&OperatorId(1)].current_session_count, 1);
    }

    #[test]
    fn offered_request_is_only_accepted_by_its_assignee() {
        let mut state = desk(true);
        online(&mut state, 1, &["billing"]);
        online(&mut state, 2, &[]);
        let request = transfer(&mut state, 42, "billing issue");
        assert_eq!(request.assigned_operator_id, Some(OperatorId(1)));

        let err = state.accept(OperatorId(2), request.id, Utc::now()).unwrap_err();
        assert!(matches!(err, SwitchboardError::RaceLost { .. }));

        state.take_pushes();
        state.accept(OperatorId(1), request.id, Utc::now()).unwrap();
        let pushes = state.take_pushes();
        assert!(kinds_for(&pushes, Actor::customer(CustomerId(9)))
            .contains(&message_types::HANDOFF_ACCEPTED.to_string()));
        assert!(kinds_for(&pushes, Actor::operator(OperatorId(1)))
            .contains(&message_types::HANDOFF_ACCEPTED.to_string()));
    }

    #[test]
    fn busy_operator_cannot_claim() {
        let mut state = desk(false);
        online(&mut state, 1, &[]);
        state
            .set_status(OperatorId(1), PresenceStatus::Away, Utc::now())
            .unwrap();
        online(&mut state, 2, &[]);
        let request = transfer(&mut state, 42, "x");
        let err = state.accept(OperatorId(1), request.id, Utc::now()).unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidTransition { .. }));
    }

    #[test]
    fn away_operator_is_not_offered_new_requests() {
        let mut state = desk(true);
        online(&mut state, 1, &["billing"]);
        state
            .set_status(OperatorId(1), PresenceStatus::Away, Utc::now())
            .unwrap();
        online(&mut state, 2, &[]);

        let request = transfer(&mut state, 42, "billing issue");
        assert_eq!(request.status, HandoffStatus::Assigned);
        assert_eq!(request.assigned_operator_id, Some(OperatorId(2)));
    }

    #[test]
    fn only_away_operators_leave_request_waiting() {
        let mut state = desk(true);
        online(&mut state, 1, &["billing"]);
        state
            .set_status(OperatorId(1), PresenceStatus::Away, Utc::now())
            .unwrap();

        let request = transfer(&mut state, 42, "billing issue");
        assert_eq!(request.status, HandoffStatus::Pending);
        assert!(request.assigned_operator_id.is_none());

        state
            .set_status(OperatorId(1), PresenceStatus::Online, Utc::now())
            .unwrap();
        let offered = state.request(request.id).unwrap();
        assert_eq!(offered.assigned_operator_id, Some(OperatorId(1)));
    }

    #[test]
    fn reject_requeues_to_front_for_another_operator() {
        let mut state = desk(true);
        online(&mut state, 1, &["billing"]);
        online(&mut state, 2, &[]);
        let request = transfer(&mut state, 42, "billing issue");
        assert_eq!(request.assigned_operator_id, Some(OperatorId(1)));

        let after = state
            .reject(OperatorId(1), request.id, Some("busy".into()), Utc::now())
            .unwrap();
        assert_eq!(after.status, HandoffStatus::Assigned);
        assert_eq!(after.assigned_operator_id, Some(OperatorId(2)));
        assert_eq!(after.reject_reason.as_deref(), Some("busy"));
        assert_eq!(after.queue_position, Some(1));

        // Repeating the reject changes nothing.
        let again = state.reject(OperatorId(1), request.id, None, Utc::now()).unwrap();
        assert_eq!(again.revision, after.revision);
    }

    #[test]
    fn reject_with_nobody_left_cancels() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        state.take_pushes();

        let after = state.reject(OperatorId(1), request.id, None, Utc::now()).unwrap();
        assert_eq!(after.status, HandoffStatus::Cancelled);
        assert_eq!(after.ended_by, Some(Party::System));
        assert!(after.operator_consistent());
        assert_eq!(state.queue_len(), 0);
        let pushes = state.take_pushes();
        assert_eq!(
            kinds_for(&pushes, Actor::customer(CustomerId(9))),
            vec![message_types::HANDOFF_CANCELLED.to_string()]
        );
    }

    #[test]
    fn complete_is_idempotent_and_releases_one_seat() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        state.accept(OperatorId(1), request.id, Utc::now()).unwrap();
        state.take_pushes();

        let done = state.complete(OperatorId(1), request.id, Utc::now()).unwrap();
        assert_eq!(done.status, HandoffStatus::Completed);
        assert_eq!(done.ended_by, Some(Party::Operator));
        assert!(done.assigned_operator_id.is_none());
        assert_eq!(state.operators[&OperatorId(1)].current_session_count, 0);

        let again = state.complete(OperatorId(1), request.id, Utc::now()).unwrap();
        assert_eq!(again.revision, done.revision);
        assert_eq!(state.operators[&OperatorId(1)].current_session_count, 0);

        let pushes = state.take_pushes();
        let completed = pushes
            .iter()
            .filter(|p| p.envelope.kind == message_types::HANDOFF_COMPLETED)
            .count();
        assert_eq!(completed, 2);
    }

    #[test]
    fn customer_ends_live_conversation() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        state.accept(OperatorId(1), request.id, Utc::now()).unwrap();

        let done = state.end_by_user(CustomerId(9), SessionId(42), Utc::now()).unwrap();
        assert_eq!(done.ended_by, Some(Party::Customer));
        let err = state.end_by_user(CustomerId(8), SessionId(42), Utc::now()).unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound(_)));
    }

    #[test]
    fn cancel_notifies_offered_operator() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        state.take_pushes();

        let cancelled = state.cancel(CustomerId(9), request.id, Utc::now()).unwrap();
        assert_eq!(cancelled.status, HandoffStatus::Cancelled);
        let pushes = state.take_pushes();
        assert_eq!(
            kinds_for(&pushes, Actor::operator(OperatorId(1))),
            vec![message_types::HANDOFF_CANCELLED.to_string()]
        );
    }

    #[test]
    fn live_request_cannot_be_cancelled() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        state.accept(OperatorId(1), request.id, Utc::now()).unwrap();
        let err = state.cancel(CustomerId(9), request.id, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            SwitchboardError::InvalidTransition {
                request_id: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn close_releases_live_seat() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        state.accept(OperatorId(1), request.id, Utc::now()).unwrap();

        let closed = state.close(request.id, Utc::now()).unwrap();
        assert_eq!(closed.status, HandoffStatus::Closed);
        assert_eq!(state.operators[&OperatorId(1)].current_session_count, 0);
        assert!(state.close(request.id, Utc::now()).is_ok());
        assert!(state.accept(OperatorId(1), request.id, Utc::now()).is_err());
    }

    #[test]
    fn first_text_starts_conversation_and_is_relayed() {
        let mut state = desk(true);
        online(&mut state, 1, &[]);
        let request = transfer(&mut state, 42, "x");
        state.accept(OperatorId(1), request.id, Utc::now()).unwrap();
        state.take_pushes();

        state
            .relay_text(
                Actor::operator(OperatorId(1)),
                TextPayload {
                    session_id: SessionId(42),
                    content: "hello".into(),
                    sender: None,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(state.request(request.id).unwrap().status, HandoffStatus::InProgress);

        let pushes = state.take_pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].target, Target::Actor(Actor::customer(CustomerId(9))));
        let text: TextPayload = pushes[0].envelope.decode().unwrap();
        assert_eq!(text.sender, Some(Role::Operator));

        let stranger = state.relay_text(
            Actor::operator(OperatorId(2)),
            TextPayload {
                session_id: SessionId(42),
                content: "hi".into(),
                sender: None,
            },
            Utc::now(),
        );
        assert!(stranger.is_err());
    }

    #[test]
    fn pending_view_hides_other_operators_offers() {
        let mut state = desk(true);
        online(&mut state, 1, &["billing"]);
        online(&mut state, 2, &[]);
        transfer(&mut state, 42, "billing issue");

        assert_eq!(state.pending_for(OperatorId(1)).len(), 1);
        assert!(state.pending_for(OperatorId(2)).is_empty());
    }
}
