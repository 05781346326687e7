// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The calling operator's own presence.
//!
//! Status changes are explicit: [`PresenceTracker::request_status`] returns a
//! [`StatusChange`] that does nothing until confirmed. Confirmed changes and
//! `PRESENCE_UPDATE` pushes (a supervisor forcing the status) go through the
//! same [`PresenceTracker::apply`] path, so both are reflected identically.

use std::sync::{Arc, Weak};
use std::time::Duration;

use switchboard_bus::EventBus;
use switchboard_channel::{AttachmentSlot, ChannelManager};
use switchboard_config::model::PresenceConfig;
use switchboard_core::{
    Actor, ClientStateStore, OperatorId, OperatorPresence, PresenceApi, PresenceStatus, Result,
    Role, StateKey, message_types,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A requested status change. Dropping it changes nothing.
#[must_use = "a status change does nothing until confirmed"]
#[derive(Debug)]
pub struct StatusChange<'a> {
    tracker: &'a PresenceTracker,
    status: PresenceStatus,
}

impl StatusChange<'_> {
    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    /// Send the change to the server and apply the confirmed presence.
    pub async fn confirm(self) -> Result<OperatorPresence> {
        let presence = self.tracker.api.set_status(self.status).await?;
        info!(operator = %presence.operator_id, status = %presence.status, "presence changed");
        self.tracker.apply(presence.clone()).await?;
        Ok(presence)
    }
}

/// Presence of the logged-in operator.
pub struct PresenceTracker {
    operator_id: OperatorId,
    api: Arc<dyn PresenceApi>,
    store: Arc<dyn ClientStateStore>,
    current: watch::Sender<Option<OperatorPresence>>,
    events: EventBus<OperatorPresence>,
    heartbeat_interval: Duration,
    attachment: AttachmentSlot,
    cancel: CancellationToken,
}

impl PresenceTracker {
    pub fn new(
        operator_id: OperatorId,
        api: Arc<dyn PresenceApi>,
        store: Arc<dyn ClientStateStore>,
        config: &PresenceConfig,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            operator_id,
            api,
            store,
            current,
            events: EventBus::default(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
            attachment: AttachmentSlot::new("presence tracker"),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the heartbeat period.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    fn actor(&self) -> Actor {
        Actor::operator(self.operator_id)
    }

    /// Last status persisted for this operator, if readable.
    pub async fn restore(&self) -> Result<Option<PresenceStatus>> {
        let stored = self.store.load(self.actor(), StateKey::Presence).await?;
        let status = match stored.as_deref().map(str::parse::<PresenceStatus>) {
            Some(Ok(status)) => Some(status),
            Some(Err(_)) => {
                warn!(operator = %self.operator_id, "discarding unreadable persisted presence");
                None
            }
            None => None,
        };
        debug!(operator = %self.operator_id, status = ?status, "presence restored");
        Ok(status)
    }

    pub fn request_status(&self, status: PresenceStatus) -> StatusChange<'_> {
        StatusChange {
            tracker: self,
            status,
        }
    }

    /// Apply an authoritative presence for this operator. Returns whether
    /// anything changed. Snapshots older than the one held are ignored.
    pub async fn apply(&self, presence: OperatorPresence) -> Result<bool> {
        if presence.operator_id != self.operator_id {
            debug!(operator = %presence.operator_id, "presence for another operator ignored");
            return Ok(false);
        }
        let status = presence.status;
        let mut status_changed = false;
        let changed = self.current.send_if_modified(|current| {
            if let Some(held) = current.as_ref() {
                if held == &presence {
                    return false;
                }
                if held.supersedes(&presence) {
                    debug!(
                        held = held.revision,
                        incoming = presence.revision,
                        "stale presence snapshot ignored"
                    );
                    return false;
                }
            }
            status_changed = current.as_ref().map(|p| p.status) != Some(status);
            *current = Some(presence.clone());
            true
        });
        if !changed {
            return Ok(false);
        }
        if status_changed {
            self.store
                .save(self.actor(), StateKey::Presence, status.to_string())
                .await?;
        }
        self.events.publish(presence);
        Ok(true)
    }

    pub fn presence(&self) -> Option<OperatorPresence> {
        self.current.borrow().clone()
    }

    pub fn status(&self) -> Option<PresenceStatus> {
        self.current.borrow().as_ref().map(|p| p.status)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<OperatorPresence>> {
        self.current.subscribe()
    }

    pub fn events(&self) -> &EventBus<OperatorPresence> {
        &self.events
    }

    /// Apply `PRESENCE_UPDATE` pushes from the operator channel.
    pub fn attach(self: &Arc<Self>, manager: &ChannelManager) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<OperatorPresence>();
        self.attachment.attach(manager, Role::Operator, move |channel| {
            let tx = tx.clone();
            channel.on(message_types::PRESENCE_UPDATE, move |envelope| {
                match envelope.decode::<OperatorPresence>() {
                    Ok(presence) => {
                        let _ = tx.send(presence);
                    }
                    Err(e) => warn!(error = %e, "malformed presence push dropped"),
                }
            });
        })?;

        let tracker = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let presence = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(presence) => presence,
                        None => break,
                    },
                };
                let Some(tracker) = tracker.upgrade() else { break };
                match tracker.apply(presence).await {
                    Ok(true) => info!(status = ?tracker.status(), "presence updated by push"),
                    Ok(false) => debug!("presence push changed nothing"),
                    Err(e) => warn!(error = %e, "failed to persist pushed presence"),
                }
            }
        });

        Ok(())
    }

    /// Heartbeat while the operator is not offline. Failures are logged and
    /// the loop carries on.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker: Weak<Self> = Arc::downgrade(self);
        let period = self.heartbeat_interval;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(tracker) = tracker.upgrade() else { break };
                if matches!(tracker.status(), None | Some(PresenceStatus::Offline)) {
                    continue;
                }
                match tracker.api.heartbeat().await {
                    Ok(()) => debug!(operator = %tracker.operator_id, "heartbeat sent"),
                    Err(e) => warn!(operator = %tracker.operator_id, error = %e, "heartbeat failed"),
                }
            }
            debug!("heartbeat loop stopped");
        })
    }

    /// Stop the heartbeat and push listener.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("operator_id", &self.operator_id)
            .field("status", &self.status())
            .finish()
    }
}
