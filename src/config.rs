//! Relay configuration parsed from environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::hub::{DEFAULT_QUEUE_CAPACITY, MIN_QUEUE_CAPACITY};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STATIC_DIR: &str = "./client/dist";
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 1000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OUTBOUND_QUEUE_CAPACITY must be at least {min}, got {got}")]
    QueueCapacityTooSmall { got: usize, min: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub static_dir: PathBuf,
    pub queue_capacity: usize,
    pub close_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            close_grace: Duration::from_millis(DEFAULT_CLOSE_GRACE_MS),
        }
    }
}

impl RelayConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `BIND_ADDR`: default `0.0.0.0`
    /// - `PORT`: default 8080
    /// - `STATIC_DIR`: default `./client/dist`
    /// - `OUTBOUND_QUEUE_CAPACITY`: default 256
    /// - `SESSION_CLOSE_GRACE_MS`: default 1000
    ///
    /// Unparseable values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::QueueCapacityTooSmall` if the queue capacity
    /// cannot hold the envelopes queued during registration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ip = parse_or(&lookup, "BIND_ADDR", defaults.bind.ip());
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT);
        let static_dir = lookup("STATIC_DIR")
            .filter(|s| !s.is_empty())
            .map_or(defaults.static_dir, PathBuf::from);
        let queue_capacity = parse_or(&lookup, "OUTBOUND_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY);
        if queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(ConfigError::QueueCapacityTooSmall { got: queue_capacity, min: MIN_QUEUE_CAPACITY });
        }
        let close_grace = Duration::from_millis(parse_or(&lookup, "SESSION_CLOSE_GRACE_MS", DEFAULT_CLOSE_GRACE_MS));

        Ok(Self { bind: SocketAddr::new(ip, port), static_dir, queue_capacity, close_grace })
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
