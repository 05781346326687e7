// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification fan-out across an actor's surfaces.
//!
//! The hub subscribes once per channel instance through a
//! [`ChannelManager`] installer, so however many surfaces are attached an
//! inbound event is counted exactly once. Surfaces only hold channel leases;
//! when the last one detaches the channel closes.

use std::sync::Arc;

use switchboard_bus::EventBus;
use switchboard_channel::{ChannelLease, ChannelManager, InstallerHandle};
use switchboard_core::wire::{BroadcastBody, HandoffRequestPush, NotificationQuery};
use switchboard_core::{
    Notification, NotificationApi, Result, Role, SwitchboardError, message_types,
};
use tracing::{debug, info, warn};

use crate::badge::BadgeStore;

/// Inbound event that bumped the unread counter.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Admin(Notification),
    HandoffOffered(HandoffRequestPush),
}

/// Event kinds counted for a role namespace.
pub fn qualifying_kinds(namespace: Role) -> &'static [&'static str] {
    match namespace {
        Role::Operator => &[
            message_types::HANDOFF_REQUEST,
            message_types::ADMIN_NOTIFICATION,
        ],
        Role::Supervisor => &[message_types::ADMIN_NOTIFICATION],
        Role::Customer => &[],
    }
}

pub struct NotificationHub {
    namespace: Role,
    manager: ChannelManager,
    badge: Arc<BadgeStore>,
    api: Arc<dyn NotificationApi>,
    notices: EventBus<Notice>,
    _installer: InstallerHandle,
}

impl NotificationHub {
    /// Create the hub and install its subscription on `manager`'s channels
    /// for the badge's namespace.
    pub fn new(
        manager: ChannelManager,
        badge: Arc<BadgeStore>,
        api: Arc<dyn NotificationApi>,
    ) -> Self {
        let namespace = badge.namespace();
        let notices = EventBus::default();

        let counter = Arc::clone(&badge);
        let bus = notices.clone();
        let installer = manager.register_installer(move |channel| {
            if channel.role() != namespace {
                return;
            }
            for &kind in qualifying_kinds(namespace) {
                let counter = Arc::clone(&counter);
                let bus = bus.clone();
                channel.on(kind, move |envelope| {
                    let notice = match envelope.kind.as_str() {
                        message_types::ADMIN_NOTIFICATION => {
                            envelope.decode::<Notification>().map(Notice::Admin)
                        }
                        _ => envelope
                            .decode::<HandoffRequestPush>()
                            .map(Notice::HandoffOffered),
                    };
                    match notice {
                        Ok(notice) => {
                            counter.increment();
                            bus.publish(notice);
                        }
                        Err(e) => warn!(kind = %envelope.kind, error = %e, "malformed notification dropped"),
                    }
                });
            }
            debug!(%namespace, "notification hub installed");
        });

        Self {
            namespace,
            manager,
            badge,
            api,
            notices,
            _installer: installer,
        }
    }

    pub fn namespace(&self) -> Role {
        self.namespace
    }

    pub fn badge(&self) -> &Arc<BadgeStore> {
        &self.badge
    }

    pub fn unread(&self) -> u32 {
        self.badge.count()
    }

    pub fn notices(&self) -> &EventBus<Notice> {
        &self.notices
    }

    /// Attach one surface. The returned guard keeps the channel open.
    pub fn attach_surface(&self) -> Result<Surface> {
        if qualifying_kinds(self.namespace).is_empty() {
            return Err(SwitchboardError::Validation(format!(
                "{} has no notification namespace",
                self.namespace
            )));
        }
        let lease = self.manager.acquire(self.namespace)?;
        debug!(namespace = %self.namespace, surfaces = self.surface_count(), "surface attached");
        Ok(Surface {
            lease,
            badge: Arc::clone(&self.badge),
        })
    }

    pub fn surface_count(&self) -> usize {
        self.manager.lease_count(self.namespace)
    }

    /// The user opened the notification view.
    pub fn enter_view(&self) {
        self.badge.reset();
    }

    /// Mark everything read on the server, then clear the badge.
    pub async fn mark_all_read(&self) -> Result<u32> {
        let changed = self.api.mark_read(Vec::new()).await?;
        self.badge.reset();
        info!(namespace = %self.namespace, changed, "notifications marked read");
        Ok(changed)
    }

    pub async fn list(&self, query: NotificationQuery) -> Result<Vec<Notification>> {
        self.api.list(query).await
    }

    /// Supervisors only; the server refuses anyone else.
    pub async fn broadcast(&self, body: BroadcastBody) -> Result<Notification> {
        let notification = self.api.broadcast(body).await?;
        info!(notification_id = %notification.id, audience = %notification.audience, "notification sent");
        Ok(notification)
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("namespace", &self.namespace)
            .field("unread", &self.unread())
            .finish()
    }
}

/// One attached view of the notifications. Dropping it detaches.
pub struct Surface {
    lease: ChannelLease,
    badge: Arc<BadgeStore>,
}

impl Surface {
    pub fn unread(&self) -> u32 {
        self.badge.count()
    }

    pub fn enter_view(&self) {
        self.badge.reset();
    }

    pub fn channel(&self) -> &ChannelLease {
        &self.lease
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("role", &self.lease.role())
            .field("unread", &self.unread())
            .finish()
    }
}
