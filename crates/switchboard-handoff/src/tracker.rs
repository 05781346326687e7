// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local view of the handoff requests an actor watches.
//!
//! The tracker never invents state: every request it holds is a snapshot the
//! server returned. It only decides whether a snapshot is newer than what it
//! has, and derives the session mode from what it holds.

use std::collections::BTreeMap;

use switchboard_core::{HandoffAction, HandoffRequest, HandoffStatus, SessionId, SessionMode};
use tracing::debug;

/// A watched session and its latest accepted snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedHandoff {
    pub request: HandoffRequest,
    /// Action in flight for this request, shown speculatively.
    pub pending_action: Option<HandoffAction>,
    /// Queue position and wait estimate predate a reconnect.
    pub queue_stale: bool,
}

/// A change the tracker accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffUpdate {
    pub session_id: SessionId,
    /// Status before this update, `None` when the request is new to the tracker.
    pub previous: Option<HandoffStatus>,
    pub request: HandoffRequest,
    pub mode: SessionMode,
}

impl HandoffUpdate {
    /// This update moved the request into `status`.
    pub fn entered(&self, status: HandoffStatus) -> bool {
        self.request.status == status && self.previous != Some(status)
    }
}

/// Why a snapshot was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// The session is not watched.
    Unwatched,
    /// Older than the tracked snapshot, or would reopen a terminal request.
    Stale,
    /// Identical to the tracked snapshot.
    Duplicate,
}

/// Per-session handoff state for one actor.
#[derive(Debug, Clone, Default)]
pub struct HandoffTracker {
    sessions: BTreeMap<SessionId, Option<TrackedHandoff>>,
}

impl HandoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching. Returns `false` if already watched.
    pub fn watch(&mut self, session_id: SessionId) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        self.sessions.insert(session_id, None);
        true
    }

    pub fn unwatch(&mut self, session_id: SessionId) -> bool {
        self.sessions.remove(&session_id).is_some()
    }

    pub fn is_watching(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn get(&self, session_id: SessionId) -> Option<&TrackedHandoff> {
        self.sessions.get(&session_id).and_then(Option::as_ref)
    }

    /// Session of a tracked request id.
    pub fn session_of(&self, request_id: switchboard_core::RequestId) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|(_, t)| t.as_ref().is_some_and(|t| t.request.id == request_id))
            .map(|(session, _)| *session)
    }

    /// Apply an authoritative snapshot.
    ///
    /// Rejected when the session is unwatched, when the snapshot is for an
    /// older request than the tracked one, when its revision is lower, or
    /// when it would move a terminal request back to a non-terminal status.
    pub fn apply(&mut self, snapshot: HandoffRequest) -> Result<HandoffUpdate, Ignored> {
        let session_id = snapshot.session_id;
        let Some(slot) = self.sessions.get_mut(&session_id) else {
            debug!(session_id = %session_id, request_id = %snapshot.id, "snapshot for unwatched session ignored");
            return Err(Ignored::Unwatched);
        };

        let previous = match slot.as_ref() {
            None => None,
            Some(tracked) if tracked.request.id != snapshot.id => {
                if snapshot.id < tracked.request.id {
                    debug!(
                        session_id = %session_id,
                        tracked = %tracked.request.id,
                        stale = %snapshot.id,
                        "snapshot of a superseded request ignored"
                    );
                    return Err(Ignored::Stale);
                }
                None
            }
            Some(tracked) => {
                let current = &tracked.request;
                if current.status.is_terminal() && !snapshot.status.is_terminal() {
                    debug!(request_id = %snapshot.id, status = %snapshot.status, "terminal request not reopened");
                    return Err(Ignored::Stale);
                }
                if current.status.is_terminal() && current.status != snapshot.status {
                    debug!(request_id = %snapshot.id, "terminal status is final");
                    return Err(Ignored::Stale);
                }
                if snapshot.revision > 0 && snapshot.revision < current.revision {
                    debug!(
                        request_id = %snapshot.id,
                        revision = snapshot.revision,
                        tracked = current.revision,
                        "older revision ignored"
                    );
                    return Err(Ignored::Stale);
                }
                if *current == snapshot && !tracked.queue_stale {
                    return Err(Ignored::Duplicate);
                }
                Some(current.status)
            }
        };

        let pending_action = slot.as_ref().and_then(|t| {
            (t.request.id == snapshot.id)
                .then_some(t.pending_action)
                .flatten()
                .filter(|action| !action.already_applied(snapshot.status))
        });
        *slot = Some(TrackedHandoff {
            request: snapshot.clone(),
            pending_action,
            queue_stale: false,
        });
        Ok(HandoffUpdate {
            session_id,
            previous,
            mode: mode_of(Some(&snapshot)),
            request: snapshot,
        })
    }

    /// The server has no request for a watched session.
    ///
    /// Only drops a tracked request that is already terminal; a live one is
    /// kept until a snapshot says otherwise.
    pub fn clear_if_terminal(&mut self, session_id: SessionId) -> bool {
        let Some(slot) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        if slot.as_ref().is_some_and(|t| t.request.status.is_terminal()) {
            *slot = None;
            return true;
        }
        false
    }

    /// Mark an action in flight. Returns `false` when nothing is tracked.
    pub fn begin(&mut self, session_id: SessionId, action: HandoffAction) -> bool {
        match self.sessions.get_mut(&session_id).and_then(Option::as_mut) {
            Some(tracked) => {
                tracked.pending_action = Some(action);
                true
            }
            None => false,
        }
    }

    /// Clear the in-flight marker.
    pub fn settle(&mut self, session_id: SessionId) {
        if let Some(tracked) = self.sessions.get_mut(&session_id).and_then(Option::as_mut) {
            tracked.pending_action = None;
        }
    }

    /// Flag queue metadata of every tracked request as stale.
    pub fn mark_stale(&mut self) {
        for tracked in self.sessions.values_mut().flatten() {
            tracked.queue_stale = true;
        }
    }

    /// AI_SERVED unless the session's request is ACCEPTED or IN_PROGRESS.
    pub fn mode(&self, session_id: SessionId) -> SessionMode {
        mode_of(self.get(session_id).map(|t| &t.request))
    }

    /// Waiting for an operator (PENDING or ASSIGNED). Independent of the mode.
    pub fn waiting(&self, session_id: SessionId) -> bool {
        self.get(session_id)
            .is_some_and(|t| t.request.status.is_waiting())
    }

    /// Sessions currently served by a human.
    pub fn live_count(&self) -> usize {
        self.sessions
            .values()
            .flatten()
            .filter(|t| t.request.status.is_live())
            .count()
    }
}

fn mode_of(request: Option<&HandoffRequest>) -> SessionMode {
    match request {
        Some(r) if r.status.is_live() => SessionMode::HumanServed,
        _ => SessionMode::AiServed,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use switchboard_core::{CustomerId, OperatorId, Priority, RequestId, transition};

    pub(crate) fn snapshot(id: u64, session: u64, status: HandoffStatus, revision: u64) -> HandoffRequest {
        let now = Utc::now();
        HandoffRequest {
            id: RequestId(id),
            session_id: SessionId(session),
            customer_id: CustomerId(9),
            reason: None,
            status,
            priority: Priority::Normal,
            queue_position: status.is_waiting().then_some(1),
            estimated_wait_seconds: None,
            assigned_operator_id: status.holds_operator().then_some(OperatorId(3)),
            ticket_id: None,
            reject_reason: None,
            ended_by: None,
            created_at: now,
            updated_at: now,
            revision,
        }
    }

    fn watching(session: u64) -> HandoffTracker {
        let mut tracker = HandoffTracker::new();
        tracker.watch(SessionId(session));
        tracker
    }

    #[test]
    fn unwatched_sessions_are_ignored() {
        let mut tracker = HandoffTracker::new();
        let err = tracker.apply(snapshot(7, 42, HandoffStatus::Pending, 1)).unwrap_err();
        assert_eq!(err, Ignored::Unwatched);
    }

    #[test]
    fn lower_revision_is_stale() {
        let mut tracker = watching(42);
        tracker.apply(snapshot(7, 42, HandoffStatus::Accepted, 3)).unwrap();
        let err = tracker.apply(snapshot(7, 42, HandoffStatus::Assigned, 2)).unwrap_err();
        assert_eq!(err, Ignored::Stale);
        assert_eq!(tracker.mode(SessionId(42)), SessionMode::HumanServed);
    }

    #[test]
    fn terminal_is_never_reopened() {
        let mut tracker = watching(42);
        tracker.apply(snapshot(7, 42, HandoffStatus::Completed, 5)).unwrap();
        // zero revision means the server does not version; still refused
        let err = tracker.apply(snapshot(7, 42, HandoffStatus::InProgress, 0)).unwrap_err();
        assert_eq!(err, Ignored::Stale);
    }

    #[test]
    fn duplicate_snapshot_is_not_an_update() {
        let mut tracker = watching(42);
        let s = snapshot(7, 42, HandoffStatus::Completed, 5);
        let first = tracker.apply(s.clone()).unwrap();
        assert!(first.entered(HandoffStatus::Completed));
        assert_eq!(tracker.apply(s).unwrap_err(), Ignored::Duplicate);
    }

    #[test]
    fn newer_request_replaces_finished_one() {
        let mut tracker = watching(42);
        tracker.apply(snapshot(7, 42, HandoffStatus::Cancelled, 2)).unwrap();
        let update = tracker.apply(snapshot(8, 42, HandoffStatus::Pending, 1)).unwrap();
        assert_eq!(update.previous, None);
        assert!(tracker.waiting(SessionId(42)));
        assert_eq!(
            tracker.apply(snapshot(7, 42, HandoffStatus::Cancelled, 2)).unwrap_err(),
            Ignored::Stale
        );
    }

    #[test]
    fn waiting_is_still_ai_served() {
        let mut tracker = watching(42);
        tracker.apply(snapshot(7, 42, HandoffStatus::Assigned, 2)).unwrap();
        assert!(tracker.waiting(SessionId(42)));
        assert_eq!(tracker.mode(SessionId(42)), SessionMode::AiServed);
    }

    #[test]
    fn pending_action_clears_once_applied() {
        let mut tracker = watching(42);
        tracker.apply(snapshot(7, 42, HandoffStatus::Assigned, 2)).unwrap();
        assert!(tracker.begin(SessionId(42), HandoffAction::Accept));
        tracker.apply(snapshot(7, 42, HandoffStatus::Assigned, 3)).unwrap();
        assert_eq!(
            tracker.get(SessionId(42)).unwrap().pending_action,
            Some(HandoffAction::Accept)
        );
        tracker.apply(snapshot(7, 42, HandoffStatus::Accepted, 4)).unwrap();
        assert_eq!(tracker.get(SessionId(42)).unwrap().pending_action, None);
    }

    #[test]
    fn stale_queue_metadata_allows_identical_refresh() {
        let mut tracker = watching(42);
        let s = snapshot(7, 42, HandoffStatus::Pending, 2);
        tracker.apply(s.clone()).unwrap();
        tracker.mark_stale();
        assert!(tracker.get(SessionId(42)).unwrap().queue_stale);
        tracker.apply(s).unwrap();
        assert!(!tracker.get(SessionId(42)).unwrap().queue_stale);
    }

    fn statuses() -> impl Strategy<Value = HandoffStatus> {
        prop_oneof![
            Just(HandoffStatus::Pending),
            Just(HandoffStatus::Assigned),
            Just(HandoffStatus::Accepted),
            Just(HandoffStatus::InProgress),
            Just(HandoffStatus::Completed),
            Just(HandoffStatus::Closed),
            Just(HandoffStatus::Cancelled),
            Just(HandoffStatus::FallbackTicket),
        ]
    }

    proptest! {
        #[test]
        fn once_terminal_the_tracked_status_never_changes(
            updates in prop::collection::vec((statuses(), 0u64..10), 1..40)
        ) {
            let mut tracker = watching(1);
            let mut settled: Option<HandoffStatus> = None;
            for (status, revision) in updates {
                let _ = tracker.apply(snapshot(7, 1, status, revision));
                let now = tracker.get(SessionId(1)).map(|t| t.request.status);
                if let Some(terminal) = settled {
                    prop_assert_eq!(now, Some(terminal));
                } else if let Some(s) = now.filter(|s| s.is_terminal()) {
                    settled = Some(s);
                }
            }
        }

        #[test]
        fn mode_is_human_exactly_when_live(status in statuses()) {
            let mut tracker = watching(1);
            tracker.apply(snapshot(7, 1, status, 1)).unwrap();
            let human = tracker.mode(SessionId(1)) == SessionMode::HumanServed;
            prop_assert_eq!(human, matches!(status, HandoffStatus::Accepted | HandoffStatus::InProgress));
            // and whatever the server allowed next keeps the invariant
            if let Ok(next) = transition(status, HandoffAction::Complete) {
                tracker.apply(snapshot(7, 1, next, 2)).unwrap();
                prop_assert_eq!(tracker.mode(SessionId(1)), SessionMode::AiServed);
            }
        }
    }
}
