//! # herald-transport
//!
//! Transport abstraction layer for Herald.
//!
//! The publisher and subscriber only see the [`Transport`] and
//! [`Connection`] traits. Each operation is bounded by a caller-supplied
//! timeout, and a timeout is reported separately from real failures so
//! callers can poll for shutdown between attempts.
//!
//! ```rust,ignore
//! use herald_transport::{Connection, TransportError};
//! use std::time::Duration;
//!
//! async fn drain(mut conn: Box<dyn Connection>) {
//!     loop {
//!         match conn.recv(Duration::from_millis(500)).await {
//!             Ok(frame) => { /* process frame */ }
//!             Err(TransportError::Timeout) => continue,
//!             Err(_) => break,
//!         }
//!     }
//! }
//! ```

pub mod traits;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use traits::{Connection, ConnectionId, Transport, TransportError};

#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpTransport};
