// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable WebSocket server for exercising durable channels.
//!
//! `RelayServer` accepts any path, records each handshake's path and query,
//! captures client frames, and lets a test push frames, drop connections
//! without a close frame, or close them with a chosen status code.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use switchboard_core::{Envelope, SwitchboardError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::debug;

/// One recorded upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub path: String,
    pub query: HashMap<String, String>,
}

impl Handshake {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    fn from_request(request: &Request) -> Self {
        let uri = request.uri();
        let query = uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            path: uri.path().to_string(),
            query,
        }
    }
}

enum Control {
    Push(String),
    Drop,
    Close(u16),
}

#[derive(Default)]
struct Shared {
    handshakes: Mutex<Vec<Handshake>>,
    peers: Mutex<Vec<mpsc::UnboundedSender<Control>>>,
    accepted: AtomicUsize,
    reject_remaining: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A local WebSocket server on an ephemeral port.
pub struct RelayServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    frames: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    accept_task: JoinHandle<()>,
}

impl RelayServer {
    pub async fn start() -> Result<Self, SwitchboardError> {
        Self::start_rejecting(0).await
    }

    /// Start a server that answers the first `rejections` upgrade requests
    /// with HTTP 403.
    pub async fn start_rejecting(rejections: usize) -> Result<Self, SwitchboardError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| SwitchboardError::Transport {
                message: "relay bind failed".into(),
                source: Some(Box::new(e)),
            })?;
        let addr = listener.local_addr().map_err(|e| SwitchboardError::Transport {
            message: "relay address unavailable".into(),
            source: Some(Box::new(e)),
        })?;

        let shared = Arc::new(Shared::default());
        shared.reject_remaining.store(rejections, Ordering::SeqCst);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(accept_peer(
                    stream,
                    Arc::clone(&accept_shared),
                    frames_tx.clone(),
                ));
            }
        });

        Ok(Self {
            addr,
            shared,
            frames: tokio::sync::Mutex::new(frames_rx),
            accept_task,
        })
    }

    /// Base URL for a channel, e.g. `ws://127.0.0.1:40123`.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every upgrade request seen so far, including rejected ones.
    pub fn handshakes(&self) -> Vec<Handshake> {
        lock(&self.shared.handshakes).clone()
    }

    /// Connections accepted since start.
    pub fn connection_count(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` connections were accepted.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.connection_count() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    pub fn push(&self, envelope: &Envelope) {
        if let Ok(text) = serde_json::to_string(envelope) {
            self.push_raw(&text);
        }
    }

    /// Send a text frame verbatim to every live connection.
    pub fn push_raw(&self, text: &str) {
        self.broadcast(|| Control::Push(text.to_string()));
    }

    /// Drop every live connection without a close frame.
    pub fn drop_connections(&self) {
        self.broadcast(|| Control::Drop);
    }

    /// Close every live connection with `code`.
    pub fn close_connections(&self, code: u16) {
        self.broadcast(|| Control::Close(code));
    }

    fn broadcast(&self, control: impl Fn() -> Control) {
        let mut peers = lock(&self.shared.peers);
        peers.retain(|peer| peer.send(control()).is_ok());
    }

    /// Next frame any client sent.
    pub async fn next_frame(&self, timeout: Duration) -> Option<Envelope> {
        let mut frames = self.frames.lock().await;
        tokio::time::timeout(timeout, frames.recv()).await.ok().flatten()
    }

    /// Next client frame of type `kind`, skipping others.
    pub async fn next_frame_of(&self, kind: &str, timeout: Duration) -> Option<Envelope> {
        let mut frames = self.frames.lock().await;
        tokio::time::timeout(timeout, async {
            while let Some(envelope) = frames.recv().await {
                if envelope.kind == kind {
                    return Some(envelope);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

async fn accept_peer(
    stream: TcpStream,
    shared: Arc<Shared>,
    frames: mpsc::UnboundedSender<Envelope>,
) {
    let record = Arc::clone(&shared);
    let callback = move |request: &Request, response: Response| {
        lock(&record.handshakes).push(Handshake::from_request(request));
        let rejecting = record
            .reject_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejecting {
            let mut rejection = ErrorResponse::new(Some("relay rejecting".into()));
            *rejection.status_mut() = StatusCode::FORBIDDEN;
            return Err(rejection);
        }
        Ok(response)
    };

    let socket = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(error = %e, "relay handshake ended");
            return;
        }
    };

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    lock(&shared.peers).push(control_tx);
    shared.accepted.fetch_add(1, Ordering::SeqCst);
    serve_peer(socket, control_rx, frames).await;
}

async fn serve_peer(
    socket: WebSocketStream<TcpStream>,
    mut control: mpsc::UnboundedReceiver<Control>,
    frames: mpsc::UnboundedSender<Envelope>,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            command = control.recv() => match command {
                Some(Control::Push(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Control::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "relay close".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                Some(Control::Drop) | None => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(envelope) = serde_json::from_str::<Envelope>(text.as_str()) {
                        let _ = frames.send(envelope);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
