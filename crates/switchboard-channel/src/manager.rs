// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference-counted channel ownership per role.
//!
//! Components never build channels themselves. They [`acquire`](ChannelManager::acquire)
//! a [`ChannelLease`]; the first lease for a role creates and connects the
//! channel, dropping the last lease disconnects it. Installers registered on
//! the manager run exactly once on every channel instance it creates, which is
//! where components subscribe to inbound message types. An installer stays
//! registered for as long as its [`InstallerHandle`] lives.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use secrecy::{ExposeSecret, SecretString};
use switchboard_config::model::ChannelConfig;
use switchboard_core::{Result, Role, SwitchboardError};
use tracing::{debug, info};

use crate::channel::{DurableChannel, SessionAccessor};

/// Builds a channel for a role. Called on the first acquire after the role
/// had no live lease.
pub type ChannelFactory = Arc<dyn Fn(Role) -> DurableChannel + Send + Sync>;

/// Runs once per new channel instance, before it connects.
pub type Installer = Arc<dyn Fn(&DurableChannel) + Send + Sync>;

struct Slot {
    channel: Arc<DurableChannel>,
    leases: usize,
}

struct Inner {
    factory: ChannelFactory,
    next_installer: AtomicU64,
    installers: Mutex<Vec<(u64, Installer)>>,
    slots: Mutex<HashMap<Role, Slot>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn deregister(&self, id: u64) {
        let mut installers = lock(&self.installers);
        installers.retain(|(key, _)| *key != id);
        debug!(installer = id, remaining = installers.len(), "installer removed");
    }

    fn release(&self, role: Role) {
        let released = {
            let mut slots = lock(&self.slots);
            let Some(slot) = slots.get_mut(&role) else {
                return;
            };
            slot.leases = slot.leases.saturating_sub(1);
            if slot.leases > 0 {
                debug!(%role, leases = slot.leases, "channel lease released");
                return;
            }
            slots.remove(&role).map(|slot| slot.channel)
        };
        if let Some(channel) = released {
            info!(%role, "last channel lease released, disconnecting");
            channel.disconnect();
        }
    }
}

/// Injected owner of every durable channel in the process.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

impl ChannelManager {
    pub fn new(factory: ChannelFactory) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                next_installer: AtomicU64::new(1),
                installers: Mutex::new(Vec::new()),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Manager whose channels all use the `[channel]` section, one credential
    /// and an optional session accessor.
    pub fn from_config(
        config: ChannelConfig,
        credential: SecretString,
        session: Option<SessionAccessor>,
    ) -> Self {
        Self::new(Arc::new(move |role| {
            let mut builder = DurableChannel::from_config(role, &config)
                .credential(credential.expose_secret().to_string());
            if let Some(accessor) = &session {
                builder = builder.shared_session_accessor(Arc::clone(accessor));
            }
            builder.build()
        }))
    }

    /// Register an installer. It also runs immediately on every live channel,
    /// so late registration does not miss the current instance. Dropping the
    /// handle keeps it off channels created afterwards.
    #[must_use = "dropping the handle removes the installer"]
    pub fn register_installer<F>(&self, installer: F) -> InstallerHandle
    where
        F: Fn(&DurableChannel) + Send + Sync + 'static,
    {
        let installer: Installer = Arc::new(installer);
        let id = self.inner.next_installer.fetch_add(1, Ordering::Relaxed);
        let live: Vec<Arc<DurableChannel>> = lock(&self.inner.slots)
            .values()
            .map(|slot| Arc::clone(&slot.channel))
            .collect();
        lock(&self.inner.installers).push((id, Arc::clone(&installer)));
        for channel in &live {
            installer(channel);
        }
        InstallerHandle {
            id,
            manager: Arc::downgrade(&self.inner),
        }
    }

    /// Register `installer` and lease `role`'s channel. If the lease cannot
    /// be taken the installer is removed again.
    pub fn attach<F>(&self, role: Role, installer: F) -> Result<Attachment>
    where
        F: Fn(&DurableChannel) + Send + Sync + 'static,
    {
        let installer = self.register_installer(installer);
        let lease = self.acquire(role)?;
        Ok(Attachment {
            lease,
            _installer: installer,
        })
    }

    pub fn installer_count(&self) -> usize {
        lock(&self.inner.installers).len()
    }

    /// Take a lease on the role's channel, creating and connecting it if no
    /// lease is live.
    pub fn acquire(&self, role: Role) -> Result<ChannelLease> {
        let mut slots = lock(&self.inner.slots);
        if let Some(slot) = slots.get_mut(&role) {
            slot.leases += 1;
            debug!(%role, leases = slot.leases, "channel lease acquired");
            return Ok(ChannelLease {
                role,
                channel: Arc::clone(&slot.channel),
                manager: Arc::downgrade(&self.inner),
            });
        }

        let channel = Arc::new((self.inner.factory)(role));
        let installers: Vec<Installer> = lock(&self.inner.installers)
            .iter()
            .map(|(_, installer)| Arc::clone(installer))
            .collect();
        for installer in &installers {
            installer(&channel);
        }
        channel.connect()?;
        info!(%role, installers = installers.len(), "channel created");

        slots.insert(
            role,
            Slot {
                channel: Arc::clone(&channel),
                leases: 1,
            },
        );
        Ok(ChannelLease {
            role,
            channel,
            manager: Arc::downgrade(&self.inner),
        })
    }

    /// The live channel for `role`, without taking a lease.
    pub fn peek(&self, role: Role) -> Option<Arc<DurableChannel>> {
        lock(&self.inner.slots)
            .get(&role)
            .map(|slot| Arc::clone(&slot.channel))
    }

    pub fn lease_count(&self, role: Role) -> usize {
        lock(&self.inner.slots)
            .get(&role)
            .map(|slot| slot.leases)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let roles: Vec<(Role, usize)> = lock(&self.inner.slots)
            .iter()
            .map(|(role, slot)| (*role, slot.leases))
            .collect();
        f.debug_struct("ChannelManager").field("leases", &roles).finish()
    }
}

/// A live claim on a role's channel. Dropping it releases the claim.
pub struct ChannelLease {
    role: Role,
    channel: Arc<DurableChannel>,
    manager: Weak<Inner>,
}

impl ChannelLease {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn channel(&self) -> &Arc<DurableChannel> {
        &self.channel
    }
}

impl Deref for ChannelLease {
    type Target = DurableChannel;

    fn deref(&self) -> &DurableChannel {
        &self.channel
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.release(self.role);
        }
    }
}

impl std::fmt::Debug for ChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLease").field("role", &self.role).finish()
    }
}

/// Keeps an installer registered. Subscriptions it already made on a live
/// channel stay until that channel instance is gone.
pub struct InstallerHandle {
    id: u64,
    manager: Weak<Inner>,
}

impl Drop for InstallerHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.deregister(self.id);
        }
    }
}

impl std::fmt::Debug for InstallerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerHandle").field("id", &self.id).finish()
    }
}

/// An installer together with a lease on the channel it listens to.
pub struct Attachment {
    lease: ChannelLease,
    _installer: InstallerHandle,
}

impl Attachment {
    pub fn lease(&self) -> &ChannelLease {
        &self.lease
    }
}

impl Deref for Attachment {
    type Target = DurableChannel;

    fn deref(&self) -> &DurableChannel {
        &self.lease
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("role", &self.lease.role())
            .finish()
    }
}

/// Holds at most one [`Attachment`] for a component. The slot is claimed
/// before anything is registered, so racing attach calls register once.
pub struct AttachmentSlot {
    owner: &'static str,
    claimed: AtomicBool,
    attachment: OnceLock<Attachment>,
}

impl AttachmentSlot {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            claimed: AtomicBool::new(false),
            attachment: OnceLock::new(),
        }
    }

    pub fn attach<F>(&self, manager: &ChannelManager, role: Role, installer: F) -> Result<&Attachment>
    where
        F: Fn(&DurableChannel) + Send + Sync + 'static,
    {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(SwitchboardError::Validation(format!(
                "{} is already attached",
                self.owner
            )));
        }
        match manager.attach(role, installer) {
            Ok(attachment) => Ok(self.attachment.get_or_init(|| attachment)),
            Err(e) => {
                self.claimed.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    pub fn get(&self) -> Option<&Attachment> {
        self.attachment.get()
    }

    /// Detach: drops the lease and the installer.
    pub fn take(&mut self) -> Option<Attachment> {
        let taken = self.attachment.take();
        *self.claimed.get_mut() = false;
        taken
    }
}

impl std::fmt::Debug for AttachmentSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentSlot")
            .field("owner", &self.owner)
            .field("attached", &self.attachment.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> (ChannelManager, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let manager = ChannelManager::new(Arc::new(move |role| {
            counter.fetch_add(1, Ordering::SeqCst);
            DurableChannel::builder(role, "ws://127.0.0.1:9")
                .credential("tok")
                .build()
        }));
        (manager, built)
    }

    #[tokio::test]
    async fn leases_share_one_channel() {
        let (manager, built) = manager();
        let a = manager.acquire(Role::Operator).unwrap();
        let b = manager.acquire(Role::Operator).unwrap();
        assert!(Arc::ptr_eq(a.channel(), b.channel()));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(manager.lease_count(Role::Operator), 2);

        drop(a);
        assert_eq!(manager.lease_count(Role::Operator), 1);
        assert!(manager.peek(Role::Operator).is_some());

        drop(b);
        assert_eq!(manager.lease_count(Role::Operator), 0);
        assert!(manager.peek(Role::Operator).is_none());
    }

    #[tokio::test]
    async fn installers_run_once_per_instance() {
        let (manager, built) = manager();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let _installer = manager.register_installer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let first = manager.acquire(Role::Supervisor).unwrap();
        let second = manager.acquire(Role::Supervisor).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        drop((first, second));

        let _again = manager.acquire(Role::Supervisor).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn late_installer_reaches_live_channel() {
        let (manager, _) = manager();
        let lease = manager.acquire(Role::Operator).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let _installer = manager.register_installer(move |channel| {
            assert_eq!(channel.role(), Role::Operator);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        drop(lease);
    }

    #[tokio::test]
    async fn dropped_installer_skips_later_channels() {
        let (manager, _) = manager();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let installer = manager.register_installer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(manager.installer_count(), 1);

        drop(manager.acquire(Role::Operator).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        drop(installer);
        assert_eq!(manager.installer_count(), 0);
        let _lease = manager.acquire(Role::Operator).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_attach_registers_once() {
        let (manager, _) = manager();
        let slot = Arc::new(AttachmentSlot::new("test component"));
        let mut joins = Vec::new();
        for _ in 0..8 {
            let slot = Arc::clone(&slot);
            let manager = manager.clone();
            joins.push(tokio::spawn(async move {
                slot.attach(&manager, Role::Operator, |_| {}).is_ok()
            }));
        }
        let mut won = 0;
        for join in joins {
            if join.await.unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
        assert_eq!(manager.installer_count(), 1);
        assert_eq!(manager.lease_count(Role::Operator), 1);
    }

    #[tokio::test]
    async fn taking_the_attachment_detaches() {
        let (manager, _) = manager();
        let mut slot = AttachmentSlot::new("test component");
        slot.attach(&manager, Role::Supervisor, |_| {}).unwrap();
        assert!(slot.attach(&manager, Role::Supervisor, |_| {}).is_err());

        drop(slot.take());
        assert_eq!(manager.installer_count(), 0);
        assert_eq!(manager.lease_count(Role::Supervisor), 0);
        slot.attach(&manager, Role::Supervisor, |_| {}).unwrap();
    }

    #[tokio::test]
    async fn roles_are_independent() {
        let (manager, built) = manager();
        let _op = manager.acquire(Role::Operator).unwrap();
        let _sup = manager.acquire(Role::Supervisor).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }
}
