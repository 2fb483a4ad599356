//! # herald-protocol
//!
//! Wire protocol definitions for the Herald message distributor.
//!
//! A subscriber opens a connection and sends one `subscribe` frame; the
//! publisher answers with an unbounded sequence of `message` frames, oldest
//! first. Frames are length-prefixed MessagePack, see [`codec`].
//!
//! ## Example
//!
//! ```rust
//! use herald_protocol::{codec, Frame, Message};
//! use std::sync::Arc;
//!
//! let frame = Frame::message(Arc::new(Message::new(1, "Hello, world!")));
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{Frame, Message, Payload, Sequence};
pub use version::{Version, PROTOCOL_VERSION};
