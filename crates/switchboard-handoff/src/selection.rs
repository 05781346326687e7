// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session the actor has selected, persisted across restarts.
//!
//! The channel consults [`SessionSelection::accessor`] on every connect
//! attempt, so a reconnect always carries the latest selection.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use switchboard_channel::SessionAccessor;
use switchboard_core::{Actor, ClientStateStore, Result, SessionId, StateKey};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SessionSelection {
    actor: Actor,
    current: Arc<ArcSwapOption<SessionId>>,
    store: Arc<dyn ClientStateStore>,
}

impl SessionSelection {
    pub fn new(actor: Actor, store: Arc<dyn ClientStateStore>) -> Self {
        Self {
            actor,
            current: Arc::new(ArcSwapOption::empty()),
            store,
        }
    }

    /// Load the last persisted selection. Unreadable values are discarded.
    pub async fn restore(&self) -> Result<Option<SessionId>> {
        let stored = self.store.load(self.actor, StateKey::LastSession).await?;
        let session = match stored.as_deref().map(str::parse::<u64>) {
            Some(Ok(id)) => Some(SessionId(id)),
            Some(Err(e)) => {
                warn!(actor = %self.actor, error = %e, "discarding unreadable last session");
                None
            }
            None => None,
        };
        self.current.store(session.map(Arc::new));
        debug!(actor = %self.actor, session = ?session, "selection restored");
        Ok(session)
    }

    pub async fn select(&self, session_id: SessionId) -> Result<()> {
        self.current.store(Some(Arc::new(session_id)));
        self.store
            .save(self.actor, StateKey::LastSession, session_id.to_string())
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.current.store(None);
        self.store.remove(self.actor, StateKey::LastSession).await
    }

    pub fn current(&self) -> Option<SessionId> {
        self.current.load_full().map(|s| *s)
    }

    /// Accessor for [`switchboard_channel::ChannelBuilder::shared_session_accessor`].
    pub fn accessor(&self) -> SessionAccessor {
        let current = Arc::clone(&self.current);
        Arc::new(move || current.load_full().map(|s| *s))
    }
}

impl std::fmt::Debug for SessionSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSelection")
            .field("actor", &self.actor)
            .field("current", &self.current())
            .finish()
    }
}
