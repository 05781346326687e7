// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deciding when to ask a customer to rate a finished handoff.
//!
//! Prompts come from two places: a session gaining focus (or a reload), and
//! a COMPLETED update from the handoff coordinator. Each request id is
//! prompted at most once per process, and never again after a submit or a
//! deferral.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use switchboard_bus::EventBus;
use switchboard_config::model::RatingConfig;
use switchboard_core::{
    HandoffStatus, PendingRating, RatingApi, RatingSubmission, RequestId, Result, SessionId,
};
use switchboard_handoff::HandoffEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Seen {
    prompted: HashSet<RequestId>,
    /// Submitted or deferred.
    done: HashSet<RequestId>,
}

pub struct RatingPrompter {
    api: Arc<dyn RatingApi>,
    max_comment_len: usize,
    seen: Mutex<Seen>,
    prompts: EventBus<PendingRating>,
    cancel: CancellationToken,
}

impl RatingPrompter {
    pub fn new(api: Arc<dyn RatingApi>, config: &RatingConfig) -> Self {
        Self {
            api,
            max_comment_len: config.max_comment_len,
            seen: Mutex::new(Seen::default()),
            prompts: EventBus::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// New prompts, one per request id.
    pub fn subscribe(&self) -> broadcast::Receiver<PendingRating> {
        self.prompts.subscribe()
    }

    /// Ask the server whether `session_id` still needs a rating. Returns the
    /// prompt to show, or `None` when there is nothing to ask.
    pub async fn on_focus(&self, session_id: SessionId) -> Result<Option<PendingRating>> {
        let pending = self.api.pending(session_id).await?;
        Ok(self.offer(pending))
    }

    /// Publish the prompt the first time it is seen; show it again on later
    /// focus unless it was submitted or deferred.
    fn offer(&self, pending: PendingRating) -> Option<PendingRating> {
        if !pending.need_rating {
            return None;
        }
        let id = pending.handoff_request_id?;
        let first = {
            let mut seen = lock(&self.seen);
            if seen.done.contains(&id) {
                debug!(request_id = %id, "rating already handled");
                return None;
            }
            seen.prompted.insert(id)
        };
        if first {
            info!(request_id = %id, session_id = %pending.session_id, "rating prompt raised");
            self.prompts.publish(pending.clone());
        }
        Some(pending)
    }

    /// Do not ask again for `request_id` in this process.
    pub fn defer(&self, request_id: RequestId) {
        lock(&self.seen).done.insert(request_id);
        debug!(request_id = %request_id, "rating deferred");
    }

    pub fn is_handled(&self, request_id: RequestId) -> bool {
        lock(&self.seen).done.contains(&request_id)
    }

    pub async fn submit(&self, rating: RatingSubmission) -> Result<()> {
        rating.validate(self.max_comment_len)?;
        let id = rating.handoff_request_id;
        self.api.submit(rating).await?;
        lock(&self.seen).done.insert(id);
        info!(request_id = %id, "rating submitted");
        Ok(())
    }

    /// React to COMPLETED updates from a handoff coordinator.
    pub fn follow(self: &Arc<Self>, mut events: broadcast::Receiver<HandoffEvent>) -> JoinHandle<()> {
        let prompter: Weak<Self> = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let session_id = match event {
                    Ok(HandoffEvent::Changed(update)) if update.entered(HandoffStatus::Completed) => {
                        update.session_id
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "rating prompter lagged behind handoff events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(prompter) = prompter.upgrade() else { break };
                if let Err(e) = prompter.on_focus(session_id).await {
                    warn!(session_id = %session_id, error = %e, "pending rating lookup failed");
                }
            }
            debug!("rating prompter stopped");
        })
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RatingPrompter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for RatingPrompter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let seen = lock(&self.seen);
        f.debug_struct("RatingPrompter")
            .field("prompted", &seen.prompted.len())
            .field("handled", &seen.done.len())
            .finish()
    }
}
