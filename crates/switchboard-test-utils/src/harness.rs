// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `DeskHarness` serves a reference desk on an ephemeral port and logs actors
//! in over HTTP, handing back a REST client and the channel settings each
//! actor needs. It also owns a temp directory for SQLite client state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use switchboard_config::model::{
    ApiConfig, ChannelConfig, DeskConfig, RatingConfig, StorageConfig,
};
use switchboard_core::wire::ApiResponse;
use switchboard_core::{Actor, Result, SwitchboardError};
use switchboard_desk::{Credentials, Desk, Login};
use switchboard_rest::RestClient;
use switchboard_storage::SqliteStateStore;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Builder for [`DeskHarness`].
pub struct DeskHarnessBuilder {
    desk: DeskConfig,
    rating: RatingConfig,
}

impl DeskHarnessBuilder {
    fn new() -> Self {
        Self {
            desk: DeskConfig::default(),
            rating: RatingConfig::default(),
        }
    }

    pub fn auto_assign(mut self, enabled: bool) -> Self {
        self.desk.auto_assign = enabled;
        self
    }

    pub fn max_queue_length(mut self, length: usize) -> Self {
        self.desk.max_queue_length = length;
        self
    }

    pub fn offline_grace_secs(mut self, secs: u64) -> Self {
        self.desk.offline_grace_secs = secs;
        self
    }

    pub fn rating_expiry_hours(mut self, hours: u64) -> Self {
        self.rating.expiry_hours = hours;
        self
    }

    /// Bind, spawn the server, and create the state directory.
    pub async fn build(self) -> Result<DeskHarness> {
        let temp_dir = TempDir::new().map_err(|e| SwitchboardError::Storage { source: e.into() })?;

        let config = DeskConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..self.desk
        };
        let desk = Desk::new(config.clone(), self.rating);
        let listener = switchboard_desk::bind(&config).await?;
        let addr = listener.local_addr().map_err(|e| SwitchboardError::Transport {
            message: "desk address unavailable".into(),
            source: Some(Box::new(e)),
        })?;
        let server = tokio::spawn(switchboard_desk::serve(desk.clone(), listener));

        Ok(DeskHarness {
            desk,
            addr,
            server: Some(server),
            temp_dir,
            http: reqwest::Client::new(),
        })
    }
}

/// A logged-in actor.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    pub actor: Actor,
    pub token: SecretString,
    pub client: Arc<RestClient>,
}

/// A reference desk served on `127.0.0.1:0`.
pub struct DeskHarness {
    desk: Desk,
    addr: SocketAddr,
    server: Option<JoinHandle<Result<()>>>,
    temp_dir: TempDir,
    http: reqwest::Client,
}

impl DeskHarness {
    pub fn builder() -> DeskHarnessBuilder {
        DeskHarnessBuilder::new()
    }

    /// Desk with default settings.
    pub async fn start() -> Result<Self> {
        Self::builder().build().await
    }

    pub fn desk(&self) -> &Desk {
        &self.desk
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// REST base, e.g. `http://127.0.0.1:40123/api`.
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Channel base, e.g. `ws://127.0.0.1:40123`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// `[api]` section pointing at this desk, without retries.
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_url(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    /// `[channel]` section pointing at this desk, with test-speed timings.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            base_url: self.ws_url(),
            heartbeat_interval_secs: 1,
            reconnect_initial_secs: 1,
            reconnect_max_secs: 1,
            reconnect_multiplier: 1.0,
            ..ChannelConfig::default()
        }
    }

    /// `[storage]` section for a fresh SQLite file named `name` in the temp dir.
    pub fn storage_config(&self, name: &str) -> StorageConfig {
        StorageConfig {
            database_path: self
                .temp_dir
                .path()
                .join(format!("{name}.db"))
                .to_string_lossy()
                .to_string(),
            wal_mode: true,
        }
    }

    /// Open (or reopen) the SQLite client-state store `name`.
    pub async fn state_store(&self, name: &str) -> Result<Arc<SqliteStateStore>> {
        Ok(Arc::new(SqliteStateStore::open(&self.storage_config(name)).await?))
    }

    /// Log `actor` in with default profile settings.
    pub async fn login(&self, actor: Actor) -> Result<ActorHandle> {
        self.login_with(Login::new(actor)).await
    }

    /// `POST /api/session/login`, then build a REST client for the token.
    pub async fn login_with(&self, login: Login) -> Result<ActorHandle> {
        let response = self
            .http
            .post(format!("{}/session/login", self.api_url()))
            .json(&login)
            .send()
            .await
            .map_err(|e| SwitchboardError::Api {
                message: format!("login request failed: {e}"),
                status: None,
            })?;
        let body: ApiResponse<Credentials> =
            response.json().await.map_err(|e| SwitchboardError::Api {
                message: format!("malformed login response: {e}"),
                status: None,
            })?;
        let credentials = body.into_result()?.ok_or_else(|| SwitchboardError::Api {
            message: "login response carried no credentials".into(),
            status: None,
        })?;

        let token = SecretString::from(credentials.token);
        let client = RestClient::new(&self.api_config(), &token)?
            .with_retry_delay(Duration::from_millis(10));
        Ok(ActorHandle {
            actor: credentials.actor,
            token,
            client: Arc::new(client),
        })
    }

    /// Stop the server and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.desk.shutdown();
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
    }
}

impl Drop for DeskHarness {
    fn drop(&mut self) {
        self.desk.shutdown();
    }
}

impl std::fmt::Debug for DeskHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskHarness").field("addr", &self.addr).finish()
    }
}
