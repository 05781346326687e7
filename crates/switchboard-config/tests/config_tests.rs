// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the configuration system.

use switchboard_config::diagnostic::ConfigError;
use switchboard_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_file_deserializes() {
    let toml = r#"
[client]
log_level = "debug"

[channel]
base_url = "wss://desk.example.com"
heartbeat_interval_secs = 20
reconnect_initial_secs = 5
reconnect_max_secs = 5
reconnect_multiplier = 1.0

[api]
base_url = "https://desk.example.com/api"
timeout_secs = 5
max_retries = 0

[storage]
database_path = "/tmp/switchboard-test.db"
wal_mode = false

[presence]
heartbeat_interval_secs = 15

[rating]
expiry_hours = 24
max_comment_len = 200

[desk]
bind_address = "0.0.0.0"
port = 9000
auto_assign = false
max_queue_length = 3
avg_handle_secs = 45
default_max_sessions = 2
offline_grace_secs = 120
sweep_interval_secs = 10
"#;

    let config = load_and_validate_str(toml).expect("valid file");
    assert_eq!(config.client.log_level, "debug");
    assert_eq!(config.channel.base_url, "wss://desk.example.com");
    assert_eq!(config.channel.reconnect_multiplier, 1.0);
    assert_eq!(config.api.max_retries, 0);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.presence.heartbeat_interval_secs, 15);
    assert_eq!(config.rating.max_comment_len, 200);
    assert!(!config.desk.auto_assign);
    assert_eq!(config.desk.port, 9000);
    assert_eq!(config.desk.max_queue_length, 3);
}

#[test]
fn empty_file_yields_defaults() {
    let config = load_and_validate_str("").expect("defaults are valid");
    assert_eq!(config.channel.heartbeat_interval_secs, 30);
    assert_eq!(config.desk.port, 8787);
}

#[test]
fn unknown_key_gets_a_suggestion() {
    let toml = r#"
[channel]
hearbeat_interval_secs = 10
"#;
    let errors = load_and_validate_str(toml).expect_err("typo must be rejected");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "hearbeat_interval_secs");
            assert_eq!(suggestion.as_deref(), Some("heartbeat_interval_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let err = load_config_from_str("[telemetry]\nenabled = true\n").expect_err("unknown section");
    assert!(err.to_string().contains("telemetry"));
}

#[test]
fn wrong_type_is_reported_with_path() {
    let errors = load_and_validate_str("[desk]\nport = \"eighty\"\n").expect_err("bad type");
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert_eq!(key, "desk.port"),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

#[test]
fn semantic_errors_surface_as_validation() {
    let errors =
        load_and_validate_str("[api]\nbase_url = \"ftp://desk\"\n").expect_err("bad scheme");
    assert!(matches!(
        &errors[0],
        ConfigError::Validation { key, .. } if key == "api.base_url"
    ));
}
