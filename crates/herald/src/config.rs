//! Publisher and subscriber configuration.
//!
//! Both configs deserialize from partial documents; missing fields take the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Port the demo publisher listens on.
pub const DEFAULT_PORT: u16 = 9853;

/// Publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on. 0 picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound for each accept, read and write attempt, in milliseconds.
    /// Shutdown is observed at least this often.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a new connection may take to send its subscribe request, in
    /// milliseconds. 0 waits indefinitely.
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout_ms: u64,
}

/// Subscriber configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Capacity of the delivery queue between the receive task and the
    /// application. A full queue stalls the receive task.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound for each read attempt, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Bound for dialing and sending the subscribe request, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll_interval() -> u64 {
    500
}

fn default_subscribe_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_queue_capacity() -> usize {
    128
}

fn default_connect_timeout() -> u64 {
    5_000
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            poll_interval_ms: default_poll_interval(),
            subscribe_timeout_ms: default_subscribe_timeout(),
        }
    }
}

impl PublisherConfig {
    /// Config listening on `port` with all other settings at their defaults.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bounded timeout for one transport attempt.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Handshake deadline, if any.
    #[must_use]
    pub fn subscribe_timeout(&self) -> Option<Duration> {
        (self.subscribe_timeout_ms > 0).then(|| Duration::from_millis(self.subscribe_timeout_ms))
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_interval_ms: default_poll_interval(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl SubscriberConfig {
    /// Bounded timeout for one read attempt.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Bound for the connect handshake.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}
