// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast notifications with per-recipient read state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use switchboard_core::wire::{BroadcastBody, NotificationQuery};
use switchboard_core::{
    Actor, Notification, NotificationId, Result, Role, SwitchboardError, message_types,
};
use tracing::info;

use crate::state::DeskState;

const MAX_PAGE_SIZE: u32 = 100;

pub(crate) struct NoticeRecord {
    notification: Notification,
    read_by: HashSet<Actor>,
}

impl NoticeRecord {
    fn view(&self, actor: Actor) -> Notification {
        Notification {
            read: self.read_by.contains(&actor),
            ..self.notification.clone()
        }
    }
}

impl DeskState {
    /// Persist a notification and push it to every connected member of its
    /// audience.
    pub fn broadcast(&mut self, body: BroadcastBody, now: DateTime<Utc>) -> Result<Notification> {
        if body.title.trim().is_empty() {
            return Err(SwitchboardError::Validation("notification title is empty".into()));
        }
        let id = NotificationId(self.next_notification);
        self.next_notification += 1;
        let notification = Notification {
            id,
            title: body.title,
            content: body.content,
            audience: body.audience,
            created_at: now,
            read: false,
        };
        self.notices.push(NoticeRecord {
            notification: notification.clone(),
            read_by: HashSet::new(),
        });
        info!(notification_id = %id, audience = %notification.audience, "notification broadcast");

        for role in [Role::Operator, Role::Supervisor] {
            if notification.audience.includes(role) {
                self.push_to_role(role, message_types::ADMIN_NOTIFICATION, &notification);
            }
        }
        Ok(notification)
    }

    /// Notifications visible to `actor`, newest first, paged from 1.
    pub fn notifications(&self, actor: Actor, query: &NotificationQuery) -> Vec<Notification> {
        let size = query.size.clamp(1, MAX_PAGE_SIZE) as usize;
        let skip = (query.page.max(1) as usize - 1) * size;
        self.notices
            .iter()
            .rev()
            .filter(|n| n.notification.audience.includes(actor.role))
            .map(|n| n.view(actor))
            .filter(|n| !query.unread_only || !n.read)
            .skip(skip)
            .take(size)
            .collect()
    }

    /// Mark notifications read for `actor`; an empty list marks all visible
    /// ones. Returns how many changed.
    pub fn mark_read(&mut self, actor: Actor, ids: &[NotificationId]) -> u32 {
        let mut changed = 0;
        for notice in &mut self.notices {
            if !notice.notification.audience.includes(actor.role) {
                continue;
            }
            if !ids.is_empty() && !ids.contains(&notice.notification.id) {
                continue;
            }
            if notice.read_by.insert(actor) {
                changed += 1;
            }
        }
        changed
    }
}
