// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-actor push subscriptions.

use dashmap::DashMap;
use switchboard_core::{Actor, Envelope, Role};
use tokio::sync::mpsc;

/// Who a push is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Actor(Actor),
    /// Every connected actor of the role.
    Role(Role),
}

/// One envelope queued by a state change, delivered after it commits.
#[derive(Debug, Clone, PartialEq)]
pub struct Push {
    pub target: Target,
    pub envelope: Envelope,
}

impl Push {
    pub fn to_actor(actor: Actor, envelope: Envelope) -> Self {
        Self {
            target: Target::Actor(actor),
            envelope,
        }
    }

    pub fn to_role(role: Role, envelope: Envelope) -> Self {
        Self {
            target: Target::Role(role),
            envelope,
        }
    }
}

/// Live channel connections, keyed by the actor they authenticated as.
///
/// An actor may hold several connections; each gets every push. Closed
/// connections are pruned on the next delivery attempt.
#[derive(Debug, Default)]
pub struct PushHub {
    subscribers: DashMap<Actor, Vec<mpsc::UnboundedSender<Envelope>>>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue.
    pub fn attach(&self, actor: Actor, tx: mpsc::UnboundedSender<Envelope>) {
        self.subscribers.entry(actor).or_default().push(tx);
    }

    /// Open a new subscription for `actor`.
    pub fn subscribe(&self, actor: Actor) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.attach(actor, tx);
        rx
    }

    /// Deliver `push`, returning how many connections received it.
    pub fn deliver(&self, push: &Push) -> usize {
        match push.target {
            Target::Actor(actor) => match self.subscribers.get_mut(&actor) {
                Some(mut senders) => send_all(&mut senders, &push.envelope),
                None => 0,
            },
            Target::Role(role) => self
                .subscribers
                .iter_mut()
                .filter(|entry| entry.key().role == role)
                .map(|mut entry| send_all(entry.value_mut(), &push.envelope))
                .sum(),
        }
    }

    /// Open connections for `actor`.
    pub fn connections(&self, actor: Actor) -> usize {
        self.subscribers
            .get(&actor)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

fn send_all(senders: &mut Vec<mpsc::UnboundedSender<Envelope>>, envelope: &Envelope) -> usize {
    senders.retain(|tx| tx.send(envelope.clone()).is_ok());
    senders.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{CustomerId, OperatorId, message_types};

    #[test]
    fn role_target_reaches_every_actor_of_the_role() {
        let hub = PushHub::new();
        let mut a = hub.subscribe(Actor::operator(OperatorId(1)));
        let mut b = hub.subscribe(Actor::operator(OperatorId(2)));
        let mut c = hub.subscribe(Actor::customer(CustomerId(9)));

        let push = Push::to_role(Role::Operator, Envelope::ping());
        assert_eq!(hub.deliver(&push), 2);
        assert_eq!(a.try_recv().unwrap().kind, message_types::PING);
        assert_eq!(b.try_recv().unwrap().kind, message_types::PING);
        assert!(c.try_recv().is_err());
    }

    #[test]
    fn closed_connections_are_pruned() {
        let hub = PushHub::new();
        let actor = Actor::operator(OperatorId(1));
        let rx = hub.subscribe(actor);
        let mut live = hub.subscribe(actor);
        drop(rx);

        assert_eq!(hub.deliver(&Push::to_actor(actor, Envelope::ping())), 1);
        assert!(live.try_recv().is_ok());
        assert_eq!(hub.connections(actor), 1);
    }
}
