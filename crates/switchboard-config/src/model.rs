// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level switchboard configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchboardConfig {
    /// Client process settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Durable channel settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// REST collaborator settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Persisted client state.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Operator presence heartbeat.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Post-handoff rating rules.
    #[serde(default)]
    pub rating: RatingConfig,

    /// Reference desk server.
    #[serde(default)]
    pub desk: DeskConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Durable channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// WebSocket base URL; `/ws/{role}` is appended.
    #[serde(default = "default_channel_url")]
    pub base_url: String,

    /// Seconds between liveness pings while open.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,

    /// Delay before the first reconnect attempt.
    #[serde(default = "default_reconnect_initial_secs")]
    pub reconnect_initial_secs: u64,

    /// Upper bound on the reconnect delay.
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,

    /// Growth factor per failed attempt. `1.0` keeps the delay fixed.
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,

    /// Outbound frames buffered while the writer is busy.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: default_channel_url(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            reconnect_initial_secs: default_reconnect_initial_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
            reconnect_multiplier: default_reconnect_multiplier(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl ChannelConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn default_channel_url() -> String {
    "ws://127.0.0.1:8787".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_reconnect_initial_secs() -> u64 {
    5
}

fn default_reconnect_max_secs() -> u64 {
    60
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

fn default_outbound_buffer() -> usize {
    64
}

/// REST collaborator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL that the REST paths are joined onto.
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on transient (5xx / connection) failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            timeout_secs: default_api_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:8787/api".to_string()
}

fn default_api_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    1
}

/// Client state storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("switchboard").join("client.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("switchboard-client.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Seconds between operator heartbeat calls.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RatingConfig {
    /// Hours after completion during which a rating is still collected.
    #[serde(default = "default_rating_expiry_hours")]
    pub expiry_hours: u64,

    /// Longest accepted comment, in characters.
    #[serde(default = "default_max_comment_len")]
    pub max_comment_len: usize,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            expiry_hours: default_rating_expiry_hours(),
            max_comment_len: default_max_comment_len(),
        }
    }
}

fn default_rating_expiry_hours() -> u64 {
    72
}

fn default_max_comment_len() -> usize {
    500
}

/// Reference desk configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeskConfig {
    /// Address to bind the HTTP/WebSocket front.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Offer new requests to the best operator immediately.
    #[serde(default = "default_auto_assign")]
    pub auto_assign: bool,

    /// Requests beyond this queue length fall back to a ticket.
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,

    /// Seconds of wait estimated per queue position.
    #[serde(default = "default_avg_handle_secs")]
    pub avg_handle_secs: u64,

    /// Concurrent sessions for operators registered without an explicit limit.
    #[serde(default = "default_max_sessions")]
    pub default_max_sessions: u32,

    /// Heartbeat silence after which an operator is demoted to offline.
    #[serde(default = "default_offline_grace_secs")]
    pub offline_grace_secs: u64,

    /// Seconds between presence sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            auto_assign: default_auto_assign(),
            max_queue_length: default_max_queue_length(),
            avg_handle_secs: default_avg_handle_secs(),
            default_max_sessions: default_max_sessions(),
            offline_grace_secs: default_offline_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_auto_assign() -> bool {
    true
}

fn default_max_queue_length() -> usize {
    50
}

fn default_avg_handle_secs() -> u64 {
    30
}

fn default_max_sessions() -> u32 {
    5
}

fn default_offline_grace_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.channel.heartbeat_interval_secs, 30);
        assert_eq!(config.channel.reconnect_initial_secs, 5);
        assert_eq!(config.desk.default_max_sessions, 5);
        assert_eq!(config.desk.avg_handle_secs, 30);
        assert_eq!(config.desk.offline_grace_secs, 1800);
        assert_eq!(config.rating.max_comment_len, 500);
    }

    #[test]
    fn database_path_has_a_default() {
        assert!(!StorageConfig::default().database_path.is_empty());
    }
}
