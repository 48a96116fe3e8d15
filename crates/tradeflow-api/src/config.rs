//! Connection settings for the REST client and the push stream.

use std::time::Duration;

/// REST client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend root, without the `/api/v1` prefix.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Config {
    /// Settings for the backend at `base_url` with a 10 s timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(crate::DEFAULT_BASE_URL)
    }
}

/// Push stream settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsConfig {
    /// Stream endpoint.
    pub url: String,
    /// Interval between protocol-level pings on an open connection.
    pub ping_interval: Duration,
    /// Upper bound on the handshake.
    pub connect_timeout: Duration,
    /// Capacity of the event channel handed to the caller.
    pub channel_buffer_size: usize,
}

impl WsConfig {
    /// Settings for the stream at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            channel_buffer_size: 1000,
        }
    }

    /// Replace the ping interval.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Replace the handshake bound.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self::new(crate::DEFAULT_WS_URL)
    }
}
