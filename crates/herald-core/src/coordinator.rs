//! Publish coordinator.
//!
//! Serializes appends to the [`MessageLog`] and wakes every task waiting for
//! the log to advance. The coordinator is a monitor: the mutex that guards the
//! append is the same mutex under which a waiter re-checks "is there more" and
//! registers for the wake-up, so a publish can never slip between a waiter's
//! check and its wait.

use crate::log::{Cursor, MessageLog};
use herald_protocol::{Payload, Sequence};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Why [`PublishCoordinator::wait_for_more`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The cursor has a successor.
    MoreAvailable,
    /// The coordinator was stopped.
    Stopped,
}

struct State {
    log: MessageLog,
    stopped: bool,
}

/// Owner of the shared message log.
pub struct PublishCoordinator {
    state: Mutex<State>,
    advanced: Notify,
}

impl PublishCoordinator {
    /// Create a coordinator over an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                log: MessageLog::new(),
                stopped: false,
            }),
            advanced: Notify::new(),
        }
    }

    // The log stays consistent even if a holder panicked: append links the
    // new entry as its last step.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a payload and wake all waiters.
    ///
    /// Returns the cursor of the new message. Never blocks on readers and
    /// never fails.
    pub fn publish(&self, payload: impl Into<Payload>) -> Cursor {
        let mut state = self.lock();
        let cursor = state.log.append(payload);
        self.advanced.notify_waiters();
        drop(state);

        trace!(sequence = cursor.sequence(), "Published message");
        cursor
    }

    /// Wait until `cursor` has a successor or the coordinator is stopped.
    ///
    /// Returns immediately if either already holds. Stop takes precedence
    /// over pending data.
    pub async fn wait_for_more(&self, cursor: &Cursor) -> WaitOutcome {
        loop {
            let notified = self.advanced.notified();
            tokio::pin!(notified);

            {
                let state = self.lock();
                if state.stopped {
                    return WaitOutcome::Stopped;
                }
                if cursor.has_next() {
                    return WaitOutcome::MoreAvailable;
                }
                // Register before releasing the lock so the next publish or
                // stop is guaranteed to wake us.
                notified.as_mut().enable();
            }

            notified.await;
        }
    }

    /// Stop the coordinator and wake every waiter.
    ///
    /// Idempotent. Later publishes still append but nobody waits for them.
    pub fn stop(&self) {
        let mut state = self.lock();
        if !state.stopped {
            state.stopped = true;
            debug!(published = state.log.len(), "Publish coordinator stopped");
        }
        self.advanced.notify_waiters();
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// The head of the log.
    #[must_use]
    pub fn head(&self) -> Cursor {
        self.lock().log.head()
    }

    /// The most recently published position.
    #[must_use]
    pub fn tail(&self) -> Cursor {
        self.lock().log.tail()
    }

    /// The position of `sequence`, clamped to the tail.
    ///
    /// Only the endpoints are read under the lock; the walk itself runs over
    /// already linked entries without blocking publishers.
    #[must_use]
    pub fn seek(&self, sequence: Sequence) -> Cursor {
        let (head, tail) = {
            let state = self.lock();
            (state.log.head(), state.log.tail())
        };

        if sequence >= tail.sequence() {
            tail
        } else {
            head.advance_to(sequence)
        }
    }

    /// Number of messages published so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.lock().log.len()
    }

    /// Whether nothing has been published yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().log.is_empty()
    }
}

impl Default for PublishCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
