// ── Runtime connection configuration ──
//
// These types describe *how* to talk to an IntelliCenter controller.
// They carry connection tuning only and never touch disk.
// The CLI (or any other consumer) builds a `ControllerConfig` and hands it in.

use std::time::Duration;

use intellicenter_api::codec::DEFAULT_MAX_LINE_LENGTH;
use intellicenter_api::{ConnectionConfig, DEFAULT_PORT, HealthConfig};

use crate::model::{AttributeMap, default_attribute_map};

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 30s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 5 minutes.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            max_retries: None,
        }
    }
}

/// Configuration for connecting to a single controller.
///
/// Built by the consumer, passed to `Controller` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller host name or IP address.
    pub host: String,
    /// TCP port (6681 on every controller seen so far).
    pub port: u16,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// How long awaited requests (handshake, confirmed changes) may take.
    pub request_timeout: Duration,
    /// Longest accepted line before the connection is dropped.
    pub max_line_length: usize,
    /// Keepalive, stall and idle detection.
    pub health: HealthConfig,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Object type → attributes to subscribe to.
    pub tracked_attributes: AttributeMap,
}

impl ControllerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Wire-level settings for one connection.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            max_line_length: self.max_line_length,
            health: self.health.clone(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            health: HealthConfig::default(),
            reconnect: ReconnectConfig::default(),
            tracked_attributes: default_attribute_map(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let config = ControllerConfig::new("pool.local");
        assert_eq!(config.port, 6681);
        assert_eq!(config.health.keepalive_interval, Duration::from_secs(90));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(30));
        assert!(config.reconnect.max_retries.is_none());

        let conn = config.connection();
        assert_eq!(conn.addr(), "pool.local:6681");
    }
}
