// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnect delay schedule.

use std::time::Duration;

use switchboard_config::model::ChannelConfig;

/// Capped exponential backoff between reconnect attempts.
///
/// Attempt `n` (0-based, counted since the last successful open) waits
/// `min(initial * multiplier^n, max)`. A multiplier of 1.0 gives a fixed
/// interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            initial: Duration::from_secs(config.reconnect_initial_secs),
            max: Duration::from_secs(config.reconnect_max_secs),
            multiplier: config.reconnect_multiplier,
        }
    }

    /// Same delay before every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            multiplier: 1.0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ChannelConfig::default())
    }
}
