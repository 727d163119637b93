//! Session configuration loaded from environment variables.
//!
//! Every knob has a typed default; unset or unparsable variables fall back to
//! it silently. `from_lookup` takes the variable source as a function so tests
//! can supply values without mutating the process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::throttle::DEFAULT_THROTTLE_INTERVAL;

const DEFAULT_DELTA_TTL_MS: u64 = 5_000;
const DEFAULT_PASTE_OFFSET: f64 = 20.0;
const DEFAULT_FILL: &str = "#3B82F6";
const DEFAULT_SIZE: f64 = 100.0;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tuning knobs for one synchronization session.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Minimum spacing between throttled ephemeral sends.
    pub throttle_interval: Duration,
    /// Records kept per undo/redo stack.
    pub history_capacity: usize,
    /// How long a delta stays on the ephemeral channel after a durable write.
    pub delta_ttl: Duration,
    /// Cascade step between successive pastes, on both axes.
    pub paste_offset: f64,
    /// Fill used when a create request names none.
    pub default_fill: String,
    /// Width and height used when a create request names none.
    pub default_size: f64,
    /// Buffer size of subscriber queues on in-memory transports.
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            delta_ttl: Duration::from_millis(DEFAULT_DELTA_TTL_MS),
            paste_offset: DEFAULT_PASTE_OFFSET,
            default_fill: DEFAULT_FILL.to_owned(),
            default_size: DEFAULT_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let throttle_ms = parse_or(&lookup, "SCENESYNC_THROTTLE_MS", millis(defaults.throttle_interval));
        let ttl_ms = parse_or(&lookup, "SCENESYNC_DELTA_TTL_MS", millis(defaults.delta_ttl));
        let default_fill = lookup("SCENESYNC_DEFAULT_FILL")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_fill);

        Self {
            throttle_interval: Duration::from_millis(throttle_ms),
            history_capacity: parse_or(&lookup, "SCENESYNC_HISTORY_CAPACITY", defaults.history_capacity).max(1),
            delta_ttl: Duration::from_millis(ttl_ms),
            paste_offset: parse_or(&lookup, "SCENESYNC_PASTE_OFFSET", defaults.paste_offset),
            default_fill,
            default_size: positive_or(
                parse_or(&lookup, "SCENESYNC_DEFAULT_SIZE", defaults.default_size),
                defaults.default_size,
            ),
            channel_capacity: parse_or(&lookup, "SCENESYNC_CHANNEL_CAPACITY", defaults.channel_capacity).max(1),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        _ => default,
    }
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { default }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
