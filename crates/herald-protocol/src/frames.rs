//! Frame types for the Herald protocol.
//!
//! A connection carries exactly two kinds of frames: one `subscribe` request
//! from the subscriber, followed by a stream of `message` frames from the
//! publisher. Frames are internally tagged by a `type` field so both sides
//! can discriminate them without an out-of-band registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::version::{Version, PROTOCOL_VERSION};

/// Sequence number assigned to a message when it is appended to the log.
///
/// The first published message has sequence 1; 0 denotes "nothing seen yet".
pub type Sequence = u64;

/// Application payload carried by a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Binary(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Structured value of arbitrary shape.
    Json(serde_json::Value),
}

impl Payload {
    /// Create a text payload.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Payload::Text(s.into())
    }

    /// Create a binary payload.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Payload::Binary(data.into())
    }

    /// Get the text if this is a text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(data)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(s) => f.write_str(s),
            Payload::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Payload::Json(v) => write!(f, "{v}"),
        }
    }
}

/// A published message.
///
/// Messages are immutable once appended and shared between every session
/// that delivers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Position in publish order.
    pub sequence: Sequence,
    /// Application payload.
    pub payload: Payload,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(sequence: Sequence, payload: impl Into<Payload>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Subscribe request, sent once by the subscriber after connecting.
    #[serde(rename = "subscribe")]
    Subscribe {
        /// Protocol version spoken by the subscriber.
        version: Version,
        /// Resume after this sequence instead of replaying from the start.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<Sequence>,
    },

    /// A log entry delivered to a subscriber.
    #[serde(rename = "message")]
    Message(Arc<Message>),
}

impl Frame {
    /// Create a subscribe request that replays the whole log.
    #[must_use]
    pub fn subscribe() -> Self {
        Frame::Subscribe {
            version: PROTOCOL_VERSION,
            last_seen: None,
        }
    }

    /// Create a subscribe request that resumes after `last_seen`.
    #[must_use]
    pub fn subscribe_from(last_seen: Sequence) -> Self {
        Frame::Subscribe {
            version: PROTOCOL_VERSION,
            last_seen: Some(last_seen),
        }
    }

    /// Create a message frame.
    #[must_use]
    pub fn message(message: Arc<Message>) -> Self {
        Frame::Message(message)
    }

    /// Short name of the frame kind, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Subscribe { .. } => "subscribe",
            Frame::Message(_) => "message",
        }
    }
}
