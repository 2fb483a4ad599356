//! Error types for the publisher and subscriber.

use herald_transport::TransportError;
use thiserror::Error;

/// Publisher errors.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// The listen address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// `listen` was already called.
    #[error("Publisher is already listening")]
    AlreadyListening,

    /// The publisher has been closed.
    #[error("Publisher is closed")]
    Closed,
}

/// Subscriber errors.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// The publisher could not be reached.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        /// Publisher address.
        addr: String,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// Dialing did not complete in time.
    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    /// The subscribe request could not be sent.
    #[error("Failed to send subscribe request: {0}")]
    Handshake(#[source] TransportError),

    /// This subscriber already has a live subscription.
    #[error("Already subscribed")]
    AlreadySubscribed,

    /// The subscriber has been stopped.
    #[error("Subscriber is stopped")]
    Stopped,
}
