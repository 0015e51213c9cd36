//! WebSocket hub configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and liveness settings shared by every connection of a hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Maximum reassembled message size in bytes
    pub max_message_size: usize,
    /// Maximum single frame payload in bytes
    pub max_frame_size: usize,
    /// Interval at which the hub owner is expected to ping, in milliseconds
    pub ping_interval_ms: u64,
    /// Silence after which a connection counts as stale, in milliseconds
    pub pong_timeout_ms: u64,
    /// Maximum number of registered connections
    pub max_connections: usize,
    /// Reject client frames that are not masked
    pub require_masked: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024,
            max_frame_size: 64 * 1024,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 60_000,
            max_connections: 1024,
            require_masked: true,
        }
    }
}

impl WebSocketConfig {
    /// Create a builder starting from the defaults.
    pub fn builder() -> WebSocketConfigBuilder {
        WebSocketConfigBuilder::default()
    }

    /// Ping interval as a duration.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Pong timeout as a duration.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

/// Builder for [`WebSocketConfig`].
#[derive(Debug, Default)]
pub struct WebSocketConfigBuilder {
    config: WebSocketConfig,
}

impl WebSocketConfigBuilder {
    /// Set the maximum message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the ping interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the pong timeout.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.config.pong_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the connection limit.
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.config.max_connections = limit;
        self
    }

    /// Accept or reject unmasked client frames.
    pub fn require_masked(mut self, required: bool) -> Self {
        self.config.require_masked = required;
        self
    }

    /// Finish building.
    pub fn build(self) -> WebSocketConfig {
        self.config
    }
}
