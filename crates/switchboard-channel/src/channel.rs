// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One reconnecting, authenticated, heartbeated WebSocket per actor role.
//!
//! Frames are JSON [`Envelope`]s. A single background task owns the socket:
//! it writes queued sends and heartbeat pings, reads inbound frames and
//! dispatches them through the channel's [`EventRouter`] in arrival order.
//!
//! ```text
//! connect() ──> Connecting ──ok──> Open{epoch} ──abnormal close──> Disconnected ──backoff──> Connecting
//!                   │                   │
//!                   └──error──> Disconnected     └──close 1000 / disconnect()──> Closed
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use switchboard_bus::{EventRouter, HandlerId};
use switchboard_config::model::ChannelConfig;
use switchboard_core::{Envelope, Result, Role, SessionId, SwitchboardError, message_types};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::backoff::ReconnectPolicy;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Supplies the currently selected session, consulted on every connect attempt.
pub type SessionAccessor = Arc<dyn Fn() -> Option<SessionId> + Send + Sync>;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not connected; a reconnect may be pending.
    Disconnected,
    Connecting,
    /// `epoch` counts successful opens of this channel instance, starting at 1.
    Open { epoch: u64 },
    /// Stopped by `disconnect()` or a normal server close. No reconnect follows.
    Closed,
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn epoch(&self) -> Option<u64> {
        match self {
            Self::Open { epoch } => Some(*epoch),
            _ => None,
        }
    }
}

/// What happened to a message handed to [`DurableChannel::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the open connection.
    Queued,
    /// Discarded because the channel was not open or the buffer was full.
    Dropped,
}

struct Endpoint {
    role: Role,
    base_url: String,
    credential: Option<SecretString>,
    session: Option<SessionAccessor>,
}

impl Endpoint {
    fn current_session(&self) -> Option<SessionId> {
        self.session.as_ref().and_then(|accessor| accessor())
    }

    /// `{base}/ws/{role}?token=..[&sessionId=..]`
    fn url(&self, session: Option<SessionId>) -> Result<Url> {
        let credential = self
            .credential
            .as_ref()
            .filter(|c| !c.expose_secret().is_empty())
            .ok_or_else(|| {
                SwitchboardError::Validation(format!("{} channel has no credential", self.role))
            })?;
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            SwitchboardError::Validation(format!(
                "invalid channel base url `{}`: {e}",
                self.base_url
            ))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                SwitchboardError::Validation(format!(
                    "channel base url `{}` cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push("ws")
            .push(&self.role.to_string());
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", credential.expose_secret());
            if let Some(session) = session {
                query.append_pair("sessionId", &session.to_string());
            }
        }
        Ok(url)
    }
}

/// Builder for [`DurableChannel`].
pub struct ChannelBuilder {
    role: Role,
    base_url: String,
    credential: Option<SecretString>,
    session: Option<SessionAccessor>,
    heartbeat: Duration,
    policy: ReconnectPolicy,
    outbound_buffer: usize,
}

impl ChannelBuilder {
    pub fn credential(mut self, token: impl Into<String>) -> Self {
        self.credential = Some(SecretString::from(token.into()));
        self
    }

    pub fn session_accessor<F>(mut self, accessor: F) -> Self
    where
        F: Fn() -> Option<SessionId> + Send + Sync + 'static,
    {
        self.session = Some(Arc::new(accessor));
        self
    }

    pub fn shared_session_accessor(mut self, accessor: SessionAccessor) -> Self {
        self.session = Some(accessor);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity;
        self
    }

    pub fn build(self) -> DurableChannel {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        DurableChannel {
            endpoint: Arc::new(Endpoint {
                role: self.role,
                base_url: self.base_url,
                credential: self.credential,
                session: self.session,
            }),
            heartbeat: self.heartbeat.max(Duration::from_millis(10)),
            policy: self.policy,
            outbound_buffer: self.outbound_buffer.max(1),
            router: Arc::new(EventRouter::new()),
            state: Arc::new(state),
            epoch: Arc::new(AtomicU64::new(0)),
            outbound: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A durable channel for one actor role.
pub struct DurableChannel {
    endpoint: Arc<Endpoint>,
    heartbeat: Duration,
    policy: ReconnectPolicy,
    outbound_buffer: usize,
    router: Arc<EventRouter>,
    state: Arc<watch::Sender<ChannelState>>,
    epoch: Arc<AtomicU64>,
    outbound: Mutex<Option<mpsc::Sender<Envelope>>>,
    worker: Mutex<Option<Worker>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DurableChannel {
    pub fn builder(role: Role, base_url: impl Into<String>) -> ChannelBuilder {
        let defaults = ChannelConfig::default();
        ChannelBuilder {
            role,
            base_url: base_url.into(),
            credential: None,
            session: None,
            heartbeat: defaults.heartbeat_interval(),
            policy: ReconnectPolicy::from_config(&defaults),
            outbound_buffer: defaults.outbound_buffer,
        }
    }

    /// Builder preloaded from the `[channel]` config section.
    pub fn from_config(role: Role, config: &ChannelConfig) -> ChannelBuilder {
        Self::builder(role, config.base_url.clone())
            .heartbeat_interval(config.heartbeat_interval())
            .reconnect_policy(ReconnectPolicy::from_config(config))
            .outbound_buffer(config.outbound_buffer)
    }

    pub fn role(&self) -> Role {
        self.endpoint.role
    }

    /// Start the connection task. Returns once the task is spawned; use
    /// [`wait_open`](Self::wait_open) to wait for the first open.
    ///
    /// Fails fast with a validation error when the credential or base URL is
    /// unusable. Calling it while the task is already running is a no-op.
    pub fn connect(&self) -> Result<()> {
        self.endpoint.url(None)?;

        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!(role = %self.endpoint.role, "channel already running");
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        *lock(&self.outbound) = Some(tx);

        let cancel = CancellationToken::new();
        let ctx = RunContext {
            endpoint: Arc::clone(&self.endpoint),
            router: Arc::clone(&self.router),
            state: Arc::clone(&self.state),
            epoch: Arc::clone(&self.epoch),
            heartbeat: self.heartbeat,
            policy: self.policy,
        };
        let handle = tokio::spawn(run(ctx, rx, cancel.clone()));
        *worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Close the connection with status 1000 and suppress reconnection.
    pub fn disconnect(&self) {
        lock(&self.outbound).take();
        if let Some(worker) = lock(&self.worker).as_ref() {
            worker.cancel.cancel();
            info!(role = %self.endpoint.role, "channel disconnect requested");
        }
    }

    /// [`disconnect`](Self::disconnect) and wait for the connection task to finish.
    pub async fn shutdown(&self) {
        self.disconnect();
        let handle = lock(&self.worker).take().map(|w| w.handle);
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(role = %self.endpoint.role, error = %e, "channel task failed");
        }
    }

    pub fn send(&self, kind: &str, payload: serde_json::Value) -> Delivery {
        self.send_envelope(Envelope::new(kind, payload))
    }

    pub fn send_typed<T: Serialize>(&self, kind: &str, payload: &T) -> Result<Delivery> {
        Ok(self.send_envelope(Envelope::typed(kind, payload)?))
    }

    /// Queue an envelope on the open connection. Nothing is buffered while
    /// the channel is not open.
    pub fn send_envelope(&self, envelope: Envelope) -> Delivery {
        let role = self.endpoint.role;
        if !self.state().is_open() {
            warn!(%role, kind = %envelope.kind, "channel not open, message dropped");
            return Delivery::Dropped;
        }
        let Some(sender) = lock(&self.outbound).clone() else {
            warn!(%role, kind = %envelope.kind, "channel stopping, message dropped");
            return Delivery::Dropped;
        };
        match sender.try_send(envelope) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                warn!(%role, kind = %envelope.kind, "outbound buffer full, message dropped");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(envelope)) => {
                warn!(%role, kind = %envelope.kind, "channel task gone, message dropped");
                Delivery::Dropped
            }
        }
    }

    pub fn on<F>(&self, kind: &str, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.router.on(kind, handler)
    }

    pub fn off(&self, kind: &str, id: HandlerId) -> bool {
        self.router.off(kind, id)
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Wait until `predicate` holds for the current state.
    pub async fn wait_for_state<F>(&self, timeout: Duration, predicate: F) -> Result<ChannelState>
    where
        F: FnMut(&ChannelState) -> bool,
    {
        let mut rx = self.state.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_)) => Err(SwitchboardError::Internal("channel state sender dropped".into())),
            Err(_) => Err(SwitchboardError::Timeout { duration: timeout }),
        }
    }

    /// Wait for the channel to be open and return its epoch.
    pub async fn wait_open(&self, timeout: Duration) -> Result<u64> {
        let state = self.wait_for_state(timeout, ChannelState::is_open).await?;
        Ok(state.epoch().unwrap_or_default())
    }
}

impl Drop for DurableChannel {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = worker.take() {
            worker.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for DurableChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableChannel")
            .field("role", &self.endpoint.role)
            .field("base_url", &self.endpoint.base_url)
            .field("credential", &"[REDACTED]")
            .field("state", &self.state())
            .finish()
    }
}

struct RunContext {
    endpoint: Arc<Endpoint>,
    router: Arc<EventRouter>,
    state: Arc<watch::Sender<ChannelState>>,
    epoch: Arc<AtomicU64>,
    heartbeat: Duration,
    policy: ReconnectPolicy,
}

impl RunContext {
    fn deliver(&self, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                if envelope.kind == message_types::PONG {
                    trace!(role = %self.endpoint.role, "heartbeat acknowledged");
                }
                let handled = self.router.dispatch(&envelope);
                trace!(kind = %envelope.kind, handled, "inbound envelope dispatched");
            }
            Err(e) => {
                warn!(role = %self.endpoint.role, error = %e, "malformed inbound frame dropped");
            }
        }
    }
}

enum Ended {
    Manual,
    NormalClose,
    Abnormal(String),
}

async fn run(ctx: RunContext, mut outbound: mpsc::Receiver<Envelope>, cancel: CancellationToken) {
    let role = ctx.endpoint.role;
    let mut attempt: u32 = 0;

    loop {
        ctx.state.send_replace(ChannelState::Connecting);
        let session = ctx.endpoint.current_session();
        let url = match ctx.endpoint.url(session) {
            Ok(url) => url,
            Err(e) => {
                error!(%role, error = %e, "channel endpoint unusable, giving up");
                break;
            }
        };
        debug!(%role, session = ?session, attempt, "connecting channel");

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((socket, _response)) => {
                attempt = 0;
                let mut stale = 0usize;
                while outbound.try_recv().is_ok() {
                    stale += 1;
                }
                if stale > 0 {
                    debug!(%role, stale, "discarded sends left over from the previous connection");
                }

                let epoch = ctx.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.state.send_replace(ChannelState::Open { epoch });
                info!(%role, epoch, session = ?session, "channel open");

                match serve(socket, &ctx, &mut outbound, &cancel).await {
                    Ended::Manual => break,
                    Ended::NormalClose => {
                        info!(%role, "server closed channel normally");
                        break;
                    }
                    Ended::Abnormal(reason) => {
                        warn!(%role, %reason, "channel closed abnormally");
                    }
                }
            }
            Err(e) => {
                warn!(%role, attempt, error = %e, "channel connect failed");
            }
        }

        ctx.state.send_replace(ChannelState::Disconnected);
        let delay = ctx.policy.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        info!(%role, delay_ms = delay.as_millis() as u64, "channel reconnect scheduled");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    ctx.state.send_replace(ChannelState::Closed);
    info!(%role, "channel closed");
}

async fn serve(
    socket: Socket,
    ctx: &RunContext,
    outbound: &mut mpsc::Receiver<Envelope>,
    cancel: &CancellationToken,
) -> Ended {
    let role = ctx.endpoint.role;
    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = tokio::time::interval_at(Instant::now() + ctx.heartbeat, ctx.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!(%role, error = %e, "close frame not delivered");
                }
                return Ended::Manual;
            }
            _ = heartbeat.tick() => {
                if let Err(e) = write_envelope(&mut sink, &Envelope::ping()).await {
                    return Ended::Abnormal(format!("heartbeat write failed: {e}"));
                }
                trace!(%role, "heartbeat sent");
            }
            Some(envelope) = outbound.recv() => {
                if let Err(e) = write_envelope(&mut sink, &envelope).await {
                    return Ended::Abnormal(format!("write of {} failed: {e}", envelope.kind));
                }
            }
            frame = stream.next() => match frame {
                None => return Ended::Abnormal("stream ended without close frame".into()),
                Some(Err(e)) => return Ended::Abnormal(e.to_string()),
                Some(Ok(Message::Text(text))) => ctx.deliver(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) if frame.code == CloseCode::Normal => Ended::NormalClose,
                        Some(frame) => {
                            Ended::Abnormal(format!("close code {}", u16::from(frame.code)))
                        }
                        None => Ended::Abnormal("close frame without status".into()),
                    };
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn write_envelope<S>(sink: &mut S, envelope: &Envelope) -> std::result::Result<(), WsError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = match serde_json::to_string(envelope) {
        Ok(text) => text,
        Err(e) => {
            warn!(kind = %envelope.kind, error = %e, "outbound envelope not encodable, dropped");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}
