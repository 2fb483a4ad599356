//! Publisher-side subscriber sessions.
//!
//! One session task serves one connection:
//!
//! ```text
//! AwaitingSubscribe ──▶ Replaying ◀──▶ Parked
//!        │                  │            │
//!        └──────────────────┴────────────┴──▶ Closed
//! ```
//!
//! The session owns its cursor. It only advances after the frames up to that
//! position have been flushed to the connection, so what the subscriber
//! observes is always a prefix of the log.

use herald_core::{Cursor, PublishCoordinator, WaitOutcome};
use herald_protocol::{Frame, PROTOCOL_VERSION};
use herald_transport::{Connection, TransportError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::metrics::{self, SessionMetricsGuard};

/// Most frames encoded before a flush.
const MAX_BATCH: usize = 64;

/// Shared by every session of one publisher.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) coordinator: Arc<PublishCoordinator>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) poll_interval: Duration,
    pub(crate) subscribe_timeout: Option<Duration>,
}

enum SessionState {
    AwaitingSubscribe,
    Replaying(Cursor),
    Parked(Cursor),
    Closed(CloseReason),
}

#[derive(Debug)]
enum CloseReason {
    Shutdown,
    PeerClosed,
    HandshakeTimeout,
    Rejected(&'static str),
    Transport(TransportError),
}

impl From<TransportError> for CloseReason {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => CloseReason::PeerClosed,
            other => CloseReason::Transport(other),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Shutdown => f.write_str("shutdown"),
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::HandshakeTimeout => f.write_str("no subscribe request"),
            CloseReason::Rejected(why) => write!(f, "rejected: {why}"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

pub(crate) struct Session {
    conn: Box<dyn Connection>,
    ctx: SessionContext,
}

impl Session {
    pub(crate) fn new(conn: Box<dyn Connection>, ctx: SessionContext) -> Self {
        Self { conn, ctx }
    }

    /// Drive the session until it closes.
    pub(crate) async fn run(mut self) {
        let _metrics = SessionMetricsGuard::new();
        debug!(
            connection = %self.conn.id(),
            remote = self.conn.remote_addr().as_deref().unwrap_or("-"),
            "Session started"
        );

        let mut state = SessionState::AwaitingSubscribe;
        let reason = loop {
            state = match state {
                SessionState::AwaitingSubscribe => self.await_subscribe().await,
                SessionState::Replaying(cursor) => self.replay(cursor).await,
                SessionState::Parked(cursor) => self.park(cursor).await,
                SessionState::Closed(reason) => break reason,
            };
        };

        if let CloseReason::Transport(_) = reason {
            metrics::record_error("session");
        }
        if let Err(e) = self.conn.close().await {
            trace!(connection = %self.conn.id(), error = %e, "Close failed");
        }
        debug!(connection = %self.conn.id(), reason = %reason, "Session closed");
    }

    async fn await_subscribe(&mut self) -> SessionState {
        let deadline = self.ctx.subscribe_timeout.map(|t| Instant::now() + t);
        let shutdown = self.ctx.shutdown.clone();

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return SessionState::Closed(CloseReason::HandshakeTimeout);
            }

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionState::Closed(CloseReason::Shutdown),
                received = self.conn.recv(self.ctx.poll_interval) => received,
            };

            match received {
                Ok(Frame::Subscribe { version, last_seen }) => {
                    if !PROTOCOL_VERSION.is_compatible_with(&version) {
                        debug!(
                            connection = %self.conn.id(),
                            version = %version,
                            "Incompatible subscriber version"
                        );
                        return SessionState::Closed(CloseReason::Rejected(
                            "incompatible protocol version",
                        ));
                    }

                    let cursor = match last_seen {
                        Some(sequence) => self.ctx.coordinator.seek(sequence),
                        None => self.ctx.coordinator.head(),
                    };
                    debug!(
                        connection = %self.conn.id(),
                        after = cursor.sequence(),
                        "Subscribed"
                    );
                    return SessionState::Replaying(cursor);
                }
                Ok(other) => {
                    debug!(
                        connection = %self.conn.id(),
                        kind = other.kind(),
                        "Expected a subscribe request"
                    );
                    return SessionState::Closed(CloseReason::Rejected("unexpected request"));
                }
                Err(TransportError::Timeout) => continue,
                Err(e) => return SessionState::Closed(e.into()),
            }
        }
    }

    async fn replay(&mut self, mut cursor: Cursor) -> SessionState {
        loop {
            if self.ctx.shutdown.is_cancelled() {
                return SessionState::Closed(CloseReason::Shutdown);
            }

            let mut pending = cursor.clone();
            let mut batched = 0;
            let mut queued = 0;
            while batched < MAX_BATCH {
                let Some(next) = pending.next() else { break };
                if let Some(message) = next.message() {
                    match self.conn.start_send(&Frame::message(Arc::clone(message))) {
                        Ok(()) => queued += 1,
                        // The entry can never be encoded; every subscriber skips it.
                        Err(TransportError::Protocol(e)) => {
                            warn!(
                                connection = %self.conn.id(),
                                sequence = message.sequence,
                                error = %e,
                                "Skipping undeliverable message"
                            );
                            metrics::record_error("undeliverable");
                        }
                        Err(e) => return SessionState::Closed(e.into()),
                    }
                }
                pending = next;
                batched += 1;
            }

            if batched == 0 {
                return SessionState::Parked(cursor);
            }

            if self.conn.has_pending() {
                if let Err(reason) = self.flush().await {
                    return SessionState::Closed(reason);
                }
            }

            metrics::record_delivered(queued);
            trace!(
                connection = %self.conn.id(),
                through = pending.sequence(),
                count = queued,
                "Delivered"
            );
            cursor = pending;
        }
    }

    async fn flush(&mut self) -> Result<(), CloseReason> {
        let shutdown = self.ctx.shutdown.clone();
        loop {
            let flushed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(CloseReason::Shutdown),
                flushed = self.conn.flush(self.ctx.poll_interval) => flushed,
            };

            match flushed {
                Ok(()) => return Ok(()),
                Err(e) if e.is_timeout() => {
                    trace!(connection = %self.conn.id(), "Slow subscriber, retrying flush");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wait for the log to advance. Meanwhile keep reading so a subscriber
    /// that hangs up is noticed without waiting for the next publish.
    async fn park(&mut self, cursor: Cursor) -> SessionState {
        let coordinator = Arc::clone(&self.ctx.coordinator);
        loop {
            let received = tokio::select! {
                outcome = coordinator.wait_for_more(&cursor) => {
                    return match outcome {
                        WaitOutcome::MoreAvailable => SessionState::Replaying(cursor),
                        WaitOutcome::Stopped => SessionState::Closed(CloseReason::Shutdown),
                    };
                }
                received = self.conn.recv(self.ctx.poll_interval) => received,
            };

            match received {
                Err(TransportError::Timeout) => continue,
                Ok(other) => {
                    debug!(
                        connection = %self.conn.id(),
                        kind = other.kind(),
                        "Unexpected frame from subscriber"
                    );
                    return SessionState::Closed(CloseReason::Rejected("unexpected request"));
                }
                Err(e) => return SessionState::Closed(e.into()),
            }
        }
    }
}
