//! Presence and relay configuration.
//!
//! Presence knobs are parsed from environment variables. Every knob has a
//! default; absent or unparseable values fall back to it. The relay's
//! listen address is owned by the CLI, which reads `BIND_ADDR` and `PORT`.

use std::time::Duration;

pub const DEFAULT_TOPIC: &str = "live-presence";
pub const DEFAULT_THROTTLE_MS: u64 = 50;
pub const DEFAULT_STALE_MS: u64 = 5000;
pub const DEFAULT_SWEEP_MS: u64 = 2000;
pub const DEFAULT_MAX_CURSORS: usize = 10;
pub const DEFAULT_NOTICE_MS: u64 = 3000;
pub const DEFAULT_SUBSCRIBE_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Shared channel name across all visitors.
    pub topic: String,
    /// Minimum gap between outbound cursor broadcasts.
    pub throttle: Duration,
    /// Age after which a remote cursor is swept.
    pub stale_after: Duration,
    pub sweep_every: Duration,
    pub max_cursors: usize,
    /// How long a join notice stays visible.
    pub notice_for: Duration,
    pub subscribe_timeout: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            stale_after: Duration::from_millis(DEFAULT_STALE_MS),
            sweep_every: Duration::from_millis(DEFAULT_SWEEP_MS),
            max_cursors: DEFAULT_MAX_CURSORS,
            notice_for: Duration::from_millis(DEFAULT_NOTICE_MS),
            subscribe_timeout: Duration::from_millis(DEFAULT_SUBSCRIBE_TIMEOUT_MS),
        }
    }
}

impl PresenceConfig {
    /// Build config from environment variables.
    ///
    /// - `PRESENCE_TOPIC`: default `live-presence`
    /// - `PRESENCE_THROTTLE_MS`: default 50
    /// - `PRESENCE_STALE_MS`: default 5000
    /// - `PRESENCE_SWEEP_MS`: default 2000
    /// - `PRESENCE_MAX_CURSORS`: default 10
    /// - `PRESENCE_NOTICE_MS`: default 3000
    /// - `PRESENCE_SUBSCRIBE_TIMEOUT_MS`: default 5000
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str, default: u64| Duration::from_millis(parse_or(&lookup, key, default));

        let topic = lookup("PRESENCE_TOPIC")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

        Self {
            topic,
            throttle: millis("PRESENCE_THROTTLE_MS", DEFAULT_THROTTLE_MS),
            stale_after: millis("PRESENCE_STALE_MS", DEFAULT_STALE_MS),
            sweep_every: millis("PRESENCE_SWEEP_MS", DEFAULT_SWEEP_MS).max(Duration::from_millis(1)),
            max_cursors: parse_or(&lookup, "PRESENCE_MAX_CURSORS", DEFAULT_MAX_CURSORS).max(1),
            notice_for: millis("PRESENCE_NOTICE_MS", DEFAULT_NOTICE_MS),
            subscribe_timeout: millis("PRESENCE_SUBSCRIBE_TIMEOUT_MS", DEFAULT_SUBSCRIBE_TIMEOUT_MS),
        }
    }
}

/// Where the relay listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl RelayConfig {
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
