// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Type-keyed dispatch of inbound channel envelopes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use switchboard_core::Envelope;
use tracing::trace;

/// A registered envelope handler.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Token returned by [`EventRouter::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Publish/subscribe keyed by envelope `type`.
///
/// Handlers for one type run in registration order. Dispatch iterates over a
/// snapshot taken before the first handler runs, so handlers may call
/// [`on`](Self::on) or [`off`](Self::off) freely; such changes apply from the
/// next dispatch.
#[derive(Default)]
pub struct EventRouter {
    handlers: DashMap<String, Vec<(HandlerId, Handler)>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for envelopes of type `kind`.
    pub fn on<F>(&self, kind: &str, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Unregister a handler. Returns `false` if it was not registered for `kind`.
    pub fn off(&self, kind: &str, id: HandlerId) -> bool {
        let Some(mut entry) = self.handlers.get_mut(kind) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(hid, _)| *hid != id);
        let removed = entry.len() != before;
        let now_empty = entry.is_empty();
        drop(entry);
        if now_empty {
            self.handlers.remove_if(kind, |_, handlers| handlers.is_empty());
        }
        removed
    }

    /// Invoke every handler registered for `envelope.kind`.
    ///
    /// Returns the number of handlers invoked. Unknown types invoke nothing.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let snapshot: Vec<Handler> = match self.handlers.get(&envelope.kind) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => Vec::new(),
        };
        if snapshot.is_empty() {
            trace!(kind = %envelope.kind, "no handlers registered, ignoring");
            return 0;
        }
        for handler in &snapshot {
            handler(envelope);
        }
        snapshot.len()
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers.get(kind).map(|h| h.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("EventRouter").field("kinds", &kinds).finish()
    }
}
