// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unread counter for one actor and role namespace.
//!
//! One task owns the count and writes it through to the client-state store
//! in order, so every surface reading [`BadgeStore::count`] sees the same
//! value and the persisted value never lags behind a later reset.

use std::sync::Arc;

use switchboard_core::{Actor, ClientStateStore, Result, Role, StateKey};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

enum BadgeOp {
    Increment,
    Reset,
    Flush(oneshot::Sender<()>),
}

pub struct BadgeStore {
    actor: Actor,
    namespace: Role,
    count: watch::Receiver<u32>,
    ops: mpsc::UnboundedSender<BadgeOp>,
    cancel: CancellationToken,
}

impl BadgeStore {
    /// Load the persisted count and start the writer.
    pub async fn open(
        actor: Actor,
        namespace: Role,
        store: Arc<dyn ClientStateStore>,
    ) -> Result<Self> {
        let key = StateKey::Unread(namespace);
        let initial = match store.load(actor, key).await? {
            Some(raw) => raw.parse::<u32>().unwrap_or_else(|e| {
                warn!(%actor, %namespace, error = %e, "discarding unreadable unread count");
                0
            }),
            None => 0,
        };
        let (tx, count) = watch::channel(initial);
        let (ops, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        tokio::spawn(async move {
            loop {
                let op = tokio::select! {
                    _ = stop.cancelled() => break,
                    op = rx.recv() => match op {
                        Some(op) => op,
                        None => break,
                    },
                };
                let next = match op {
                    BadgeOp::Increment => tx.borrow().saturating_add(1),
                    BadgeOp::Reset => 0,
                    BadgeOp::Flush(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };
                if !tx.send_if_modified(|c| std::mem::replace(c, next) != next) {
                    continue;
                }
                if let Err(e) = store.save(actor, key, next.to_string()).await {
                    warn!(%actor, %namespace, error = %e, "failed to persist unread count");
                }
            }
            debug!(%actor, %namespace, "badge writer stopped");
        });

        Ok(Self {
            actor,
            namespace,
            count,
            ops,
            cancel,
        })
    }

    pub fn namespace(&self) -> Role {
        self.namespace
    }

    pub fn count(&self) -> u32 {
        *self.count.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.count.clone()
    }

    pub fn increment(&self) {
        self.send(BadgeOp::Increment);
    }

    pub fn reset(&self) {
        self.send(BadgeOp::Reset);
    }

    /// Resolves after every earlier operation is applied and persisted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(BadgeOp::Flush(tx));
        let _ = rx.await;
    }

    fn send(&self, op: BadgeOp) {
        if self.ops.send(op).is_err() {
            warn!(actor = %self.actor, namespace = %self.namespace, "badge writer stopped, update lost");
        }
    }
}

impl Drop for BadgeStore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for BadgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BadgeStore")
            .field("actor", &self.actor)
            .field("namespace", &self.namespace)
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::OperatorId;
    use switchboard_storage::MemoryStateStore;

    #[tokio::test]
    async fn count_is_persisted_per_namespace() {
        let store: Arc<dyn ClientStateStore> = Arc::new(MemoryStateStore::new());
        let actor = Actor::operator(OperatorId(3));

        let badge = BadgeStore::open(actor, Role::Operator, Arc::clone(&store))
            .await
            .unwrap();
        badge.increment();
        badge.increment();
        badge.increment();
        badge.flush().await;
        assert_eq!(badge.count(), 3);
        drop(badge);

        let reopened = BadgeStore::open(actor, Role::Operator, Arc::clone(&store))
            .await
            .unwrap();
        assert_eq!(reopened.count(), 3);
        let other = BadgeStore::open(actor, Role::Supervisor, store).await.unwrap();
        assert_eq!(other.count(), 0);
    }

    #[tokio::test]
    async fn reset_wins_over_earlier_increments() {
        let store: Arc<dyn ClientStateStore> = Arc::new(MemoryStateStore::new());
        let actor = Actor::operator(OperatorId(3));
        let badge = BadgeStore::open(actor, Role::Operator, Arc::clone(&store))
            .await
            .unwrap();
        badge.increment();
        badge.increment();
        badge.reset();
        badge.flush().await;
        assert_eq!(badge.count(), 0);
        assert_eq!(
            store
                .load(actor, StateKey::Unread(Role::Operator))
                .await
                .unwrap()
                .as_deref(),
            Some("0")
        );
    }

    #[tokio::test]
    async fn garbage_count_starts_from_zero() {
        let store: Arc<dyn ClientStateStore> = Arc::new(MemoryStateStore::new());
        let actor = Actor::operator(OperatorId(3));
        store
            .save(actor, StateKey::Unread(Role::Operator), "lots".into())
            .await
            .unwrap();
        let badge = BadgeStore::open(actor, Role::Operator, store).await.unwrap();
        assert_eq!(badge.count(), 0);
    }
}
