// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation.
//!
//! Checks the constraints serde cannot express: URL schemes, non-zero
//! intervals, and backoff bounds that must agree with each other.

use crate::diagnostic::ConfigError;
use crate::model::SwitchboardConfig;

/// Validate a deserialized configuration, collecting every problem.
pub fn validate_config(config: &SwitchboardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !matches!(
        config.client.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ConfigError::invalid(
            "client.log_level",
            format!("unknown level `{}`", config.client.log_level),
        ));
    }

    check_url(&mut errors, "channel.base_url", &config.channel.base_url, &["ws", "wss"]);
    check_url(&mut errors, "api.base_url", &config.api.base_url, &["http", "https"]);

    let channel = &config.channel;
    if channel.heartbeat_interval_secs == 0 {
        errors.push(ConfigError::invalid(
            "channel.heartbeat_interval_secs",
            "must be greater than zero",
        ));
    }
    if channel.reconnect_initial_secs == 0 {
        errors.push(ConfigError::invalid(
            "channel.reconnect_initial_secs",
            "must be greater than zero",
        ));
    }
    if channel.reconnect_max_secs < channel.reconnect_initial_secs {
        errors.push(ConfigError::invalid(
            "channel.reconnect_max_secs",
            format!(
                "must be at least reconnect_initial_secs ({}), got {}",
                channel.reconnect_initial_secs, channel.reconnect_max_secs
            ),
        ));
    }
    if !channel.reconnect_multiplier.is_finite() || channel.reconnect_multiplier < 1.0 {
        errors.push(ConfigError::invalid(
            "channel.reconnect_multiplier",
            format!("must be a finite value >= 1.0, got {}", channel.reconnect_multiplier),
        ));
    }
    if channel.outbound_buffer == 0 {
        errors.push(ConfigError::invalid(
            "channel.outbound_buffer",
            "must be greater than zero",
        ));
    }

    if config.api.timeout_secs == 0 {
        errors.push(ConfigError::invalid("api.timeout_secs", "must be greater than zero"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path", "must not be empty"));
    }

    if config.presence.heartbeat_interval_secs == 0 {
        errors.push(ConfigError::invalid(
            "presence.heartbeat_interval_secs",
            "must be greater than zero",
        ));
    }

    if config.rating.expiry_hours == 0 {
        errors.push(ConfigError::invalid("rating.expiry_hours", "must be greater than zero"));
    }

    let desk = &config.desk;
    if desk.bind_address.trim().is_empty() {
        errors.push(ConfigError::invalid("desk.bind_address", "must not be empty"));
    } else if desk.bind_address.parse::<std::net::IpAddr>().is_err()
        && !desk
            .bind_address
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::invalid(
            "desk.bind_address",
            format!("`{}` is not an IP address or hostname", desk.bind_address),
        ));
    }
    if desk.default_max_sessions == 0 {
        errors.push(ConfigError::invalid(
            "desk.default_max_sessions",
            "must be greater than zero",
        ));
    }
    if desk.offline_grace_secs <= config.presence.heartbeat_interval_secs {
        errors.push(ConfigError::invalid(
            "desk.offline_grace_secs",
            format!(
                "must exceed presence.heartbeat_interval_secs ({})",
                config.presence.heartbeat_interval_secs
            ),
        ));
    }
    if desk.sweep_interval_secs == 0 {
        errors.push(ConfigError::invalid(
            "desk.sweep_interval_secs",
            "must be greater than zero",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_url(errors: &mut Vec<ConfigError>, key: &str, value: &str, schemes: &[&str]) {
    match url::Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ConfigError::invalid(
            key,
            format!("scheme `{}` not allowed, expected one of {}", url.scheme(), schemes.join(", ")),
        )),
        Err(e) => errors.push(ConfigError::invalid(key, format!("`{value}` is not a URL: {e}"))),
    }
}
