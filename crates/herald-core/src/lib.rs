//! # herald-core
//!
//! The shared state behind a Herald publisher.
//!
//! - **MessageLog** - append-only, lock-free-to-read log with durable cursors
//! - **PublishCoordinator** - serializes appends and wakes waiting readers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  publish  ┌──────────────────────┐  notify-all  ┌──────────┐
//! │ Application │──────────▶│  PublishCoordinator  │─────────────▶│ Sessions │
//! └─────────────┘           │  (mutex + MessageLog)│              └────┬─────┘
//!                           └──────────────────────┘                   │
//!                                      ▲        cursor.next() (no lock)│
//!                                      └───────────────────────────────┘
//! ```

pub mod coordinator;
pub mod log;

pub use coordinator::{PublishCoordinator, WaitOutcome};
pub use herald_protocol::{Message, Payload, Sequence};
pub use log::{Cursor, MessageLog};
