// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor roster of every operator's presence.

use std::sync::Arc;

use arc_swap::ArcSwap;
use switchboard_channel::{AttachmentSlot, ChannelManager};
use switchboard_core::{
    OperatorId, OperatorPresence, PresenceApi, PresenceStatus, Result, Role, message_types,
};
use tracing::{debug, info, warn};

/// Snapshot list of operators, ordered by id and swapped atomically.
pub struct PresenceBoard {
    api: Arc<dyn PresenceApi>,
    roster: Arc<ArcSwap<Vec<OperatorPresence>>>,
    attachment: AttachmentSlot,
}

impl PresenceBoard {
    pub fn new(api: Arc<dyn PresenceApi>) -> Self {
        Self {
            api,
            roster: Arc::new(ArcSwap::from_pointee(Vec::new())),
            attachment: AttachmentSlot::new("presence board"),
        }
    }

    /// Replace the roster with a fresh pull. Returns the operator count.
    pub async fn refresh(&self) -> Result<usize> {
        let mut roster = self.api.roster().await?;
        roster.sort_by_key(|p| p.operator_id);
        let count = roster.len();
        self.roster.store(Arc::new(roster));
        debug!(operators = count, "roster refreshed");
        Ok(count)
    }

    /// Apply `PRESENCE_UPDATE` pushes from the supervisor channel.
    pub fn attach(&self, manager: &ChannelManager) -> Result<()> {
        let roster = Arc::clone(&self.roster);
        self.attachment.attach(manager, Role::Supervisor, move |channel| {
            let roster = Arc::clone(&roster);
            channel.on(message_types::PRESENCE_UPDATE, move |envelope| {
                match envelope.decode::<OperatorPresence>() {
                    Ok(presence) => {
                        info!(operator = %presence.operator_id, status = %presence.status, "roster entry updated");
                        upsert(&roster, presence);
                    }
                    Err(e) => warn!(error = %e, "malformed presence push dropped"),
                }
            });
        })?;
        Ok(())
    }

    /// Override an operator's status; the result lands on the board at once.
    pub async fn force_status(
        &self,
        operator_id: OperatorId,
        status: PresenceStatus,
    ) -> Result<OperatorPresence> {
        let presence = self.api.force_status(operator_id, status).await?;
        info!(operator = %operator_id, status = %status, "status forced");
        upsert(&self.roster, presence.clone());
        Ok(presence)
    }

    /// The current roster. Holding it does not block updates.
    pub fn snapshot(&self) -> Arc<Vec<OperatorPresence>> {
        self.roster.load_full()
    }

    pub fn get(&self, operator_id: OperatorId) -> Option<OperatorPresence> {
        self.roster
            .load()
            .iter()
            .find(|p| p.operator_id == operator_id)
            .cloned()
    }

    /// Operators who could take another session right now.
    pub fn available(&self) -> Vec<OperatorPresence> {
        self.roster
            .load()
            .iter()
            .filter(|p| p.can_accept())
            .cloned()
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.roster
            .load()
            .iter()
            .filter(|p| p.status == PresenceStatus::Online)
            .count()
    }
}

impl std::fmt::Debug for PresenceBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceBoard")
            .field("operators", &self.roster.load().len())
            .finish()
    }
}

fn upsert(roster: &ArcSwap<Vec<OperatorPresence>>, presence: OperatorPresence) {
    roster.rcu(|current| {
        let mut next = Vec::clone(current);
        match next.binary_search_by_key(&presence.operator_id, |p| p.operator_id) {
            Ok(i) if next[i].supersedes(&presence) => {}
            Ok(i) => next[i] = presence.clone(),
            Err(i) => next.insert(i, presence.clone()),
        }
        next
    });
}
