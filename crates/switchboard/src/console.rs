// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pieces every console shares: credentials, collaborators, and the
//! readline input thread.

use std::sync::Arc;

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use secrecy::SecretString;
use switchboard_channel::{ChannelManager, SessionAccessor};
use switchboard_config::SwitchboardConfig;
use switchboard_core::wire::ApiResponse;
use switchboard_core::{Actor, Result, SwitchboardError};
use switchboard_desk::{Credentials, Login};
use switchboard_rest::RestClient;
use switchboard_storage::SqliteStateStore;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Get a token: the one given on the command line, or a development login
/// against the reference desk.
pub async fn credentials(
    config: &SwitchboardConfig,
    actor: Actor,
    token: Option<String>,
) -> Result<SecretString> {
    if let Some(token) = token {
        return Ok(SecretString::from(token));
    }
    let url = format!("{}/session/login", config.api.base_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .json(&Login::new(actor))
        .send()
        .await
        .map_err(|e| SwitchboardError::Transport {
            message: format!("login request to {url} failed"),
            source: Some(Box::new(e)),
        })?;
    let body: ApiResponse<Credentials> = response.json().await.map_err(|e| SwitchboardError::Api {
        message: format!("malformed login response: {e}"),
        status: None,
    })?;
    let credentials = body.into_result()?.ok_or_else(|| SwitchboardError::Api {
        message: "login response carried no credentials".into(),
        status: None,
    })?;
    info!(actor = %credentials.actor, "logged in");
    Ok(SecretString::from(credentials.token))
}

/// The collaborators one logged-in actor works with.
pub struct Connection {
    pub actor: Actor,
    pub client: Arc<RestClient>,
    pub channels: ChannelManager,
    pub store: Arc<SqliteStateStore>,
}

impl Connection {
    pub async fn open(
        config: &SwitchboardConfig,
        actor: Actor,
        token: SecretString,
        store: Arc<SqliteStateStore>,
        session: Option<SessionAccessor>,
    ) -> Result<Self> {
        let client = Arc::new(RestClient::new(&config.api, &token)?);
        let channels = ChannelManager::from_config(config.channel.clone(), token, session);
        debug!(%actor, api = client.base_url(), "connection ready");
        Ok(Self {
            actor,
            client,
            channels,
            store,
        })
    }
}

pub async fn open_store(config: &SwitchboardConfig) -> Result<Arc<SqliteStateStore>> {
    Ok(Arc::new(SqliteStateStore::open(&config.storage).await?))
}

/// Lines typed at the console, read on a dedicated thread.
pub struct LineReader {
    rx: mpsc::Receiver<String>,
}

impl LineReader {
    pub fn spawn(prompt: String) -> Result<Self> {
        let (tx, rx) = mpsc::channel(16);
        std::thread::Builder::new()
            .name("console-input".into())
            .spawn(move || {
                let mut rl = match DefaultEditor::new() {
                    Ok(rl) => rl,
                    Err(e) => {
                        eprintln!("{}: failed to initialize readline: {e}", "error".red());
                        return;
                    }
                };
                loop {
                    match rl.readline(&prompt) {
                        Ok(line) => {
                            let _ = rl.add_history_entry(line.as_str());
                            if tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                        Err(e) => {
                            eprintln!("{}: {e}", "error".red());
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SwitchboardError::Internal(format!("failed to start input thread: {e}")))?;
        Ok(Self { rx })
    }

    /// Next line, or `None` once the user closed the input.
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

pub fn print_error(e: &SwitchboardError) {
    if e.is_user_facing() {
        eprintln!("{}", e.to_string().yellow());
    } else {
        eprintln!("{}: {e}", "error".red());
    }
}

pub fn print_notice(text: impl AsRef<str>) {
    println!("{}", text.as_ref().dimmed());
}

pub fn banner(title: &str, actor: Actor) {
    println!("{} {}", title.bold().green(), actor.to_string().dimmed());
    println!("Type {} for commands, {} to exit.\n", "/help".yellow(), "/quit".yellow());
}
