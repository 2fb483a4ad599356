//! Transport abstraction traits for Herald.
//!
//! Every blocking operation takes a timeout and reports expiry as
//! [`TransportError::Timeout`], distinct from hard failures. Callers retry
//! timeouts after checking for shutdown and abandon the connection on
//! anything else.

use async_trait::async_trait;
use herald_protocol::Frame;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Allocate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{n}"))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The operation did not complete before its deadline. Retryable.
    #[error("Operation timed out")]
    Timeout,

    /// The peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] herald_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this is a deadline expiry rather than a failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// A listener that accepts subscriber connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept a new connection, waiting at most `timeout`.
    ///
    /// Cancel-safe: dropping the future never loses a connection.
    async fn accept(&self, timeout: Duration) -> Result<Box<dyn Connection>, TransportError>;

    /// Address the transport is listening on.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Get the transport name (e.g., "tcp").
    fn name(&self) -> &'static str;
}

/// An established, framed byte-stream connection.
///
/// Sending is split in two so a timed-out write can be resumed without
/// re-encoding or duplicating bytes: [`start_send`](Connection::start_send)
/// queues an encoded frame, [`flush`](Connection::flush) pushes queued bytes
/// out and may be retried after a timeout.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next frame, waiting at most `timeout`.
    ///
    /// Partially received frames are kept across calls, so a timeout never
    /// loses data. A clean end of stream is [`TransportError::ConnectionClosed`].
    async fn recv(&mut self, timeout: Duration) -> Result<Frame, TransportError>;

    /// Encode a frame into the outgoing buffer without writing it.
    fn start_send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Write buffered frames, waiting at most `timeout`.
    async fn flush(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Whether queued bytes are still waiting for [`flush`](Connection::flush).
    fn has_pending(&self) -> bool;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn_"));
    }

    #[test]
    fn test_timeout_classification() {
        assert!(TransportError::Timeout.is_timeout());
        assert!(!TransportError::ConnectionClosed.is_timeout());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!TransportError::from(io).is_timeout());
    }
}
