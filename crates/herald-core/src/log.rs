//! Append-only message log.
//!
//! The log is a singly linked chain of entries starting at a head sentinel.
//! Each entry's successor is a write-once cell: once an entry has been linked
//! it never changes, so readers can walk already-published entries without
//! taking any lock. Appending requires `&mut MessageLog`, which the
//! [`PublishCoordinator`](crate::PublishCoordinator) only hands out under its
//! mutex.

use herald_protocol::{Message, Payload, Sequence};
use std::fmt;
use std::sync::{Arc, OnceLock};

struct Entry {
    /// `None` only for the head sentinel.
    message: Option<Arc<Message>>,
    next: OnceLock<Arc<Entry>>,
}

impl Entry {
    fn sentinel() -> Self {
        Self {
            message: None,
            next: OnceLock::new(),
        }
    }
}

impl Drop for Entry {
    // Unlink iteratively; the default drop would recurse once per entry.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(entry) = next {
            match Arc::try_unwrap(entry) {
                Ok(mut entry) => next = entry.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// A durable position in a [`MessageLog`].
///
/// Cursors stay valid for as long as they are held, independent of the log
/// itself and of later appends.
#[derive(Clone)]
pub struct Cursor {
    entry: Arc<Entry>,
}

impl Cursor {
    /// The position after this one, if it has been published.
    ///
    /// `None` means the holder is caught up as of this observation.
    #[must_use]
    pub fn next(&self) -> Option<Cursor> {
        self.entry.next.get().map(|entry| Cursor {
            entry: Arc::clone(entry),
        })
    }

    /// Whether a successor has been published.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.entry.next.get().is_some()
    }

    /// The message at this position, `None` for the head.
    #[must_use]
    pub fn message(&self) -> Option<&Arc<Message>> {
        self.entry.message.as_ref()
    }

    /// Sequence of the message at this position, 0 for the head.
    #[must_use]
    pub fn sequence(&self) -> Sequence {
        self.entry.message.as_ref().map_or(0, |m| m.sequence)
    }

    /// Walk forward to the entry with `sequence`, or as far as the log
    /// currently reaches. Never moves backwards.
    #[must_use]
    pub fn advance_to(&self, sequence: Sequence) -> Cursor {
        let mut cursor = self.clone();
        while cursor.sequence() < sequence {
            match cursor.next() {
                Some(next) => cursor = next,
                None => break,
            }
        }
        cursor
    }

    /// Whether this cursor points at the head sentinel.
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.entry.message.is_none()
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl Eq for Cursor {}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("sequence", &self.sequence())
            .field("has_next", &self.has_next())
            .finish()
    }
}

/// An append-only, ordered sequence of messages.
pub struct MessageLog {
    head: Cursor,
    tail: Cursor,
    len: u64,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        let head = Cursor {
            entry: Arc::new(Entry::sentinel()),
        };
        Self {
            tail: head.clone(),
            head,
            len: 0,
        }
    }

    /// The sentinel position before the first message.
    #[must_use]
    pub fn head(&self) -> Cursor {
        self.head.clone()
    }

    /// The position of the most recent message (the head if empty).
    #[must_use]
    pub fn tail(&self) -> Cursor {
        self.tail.clone()
    }

    /// Number of messages appended so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a payload, assigning it the next sequence number.
    ///
    /// Returns a cursor positioned at the new message.
    pub fn append(&mut self, payload: impl Into<Payload>) -> Cursor {
        let sequence = self.len + 1;
        let entry = Arc::new(Entry {
            message: Some(Arc::new(Message::new(sequence, payload))),
            next: OnceLock::new(),
        });

        let linked = self.tail.entry.next.set(Arc::clone(&entry));
        debug_assert!(linked.is_ok(), "log tail already had a successor");

        self.tail = Cursor { entry };
        self.len = sequence;
        self.tail.clone()
    }

    /// The cursor positioned at `sequence`.
    ///
    /// Sequence 0 is the head; a sequence past the end yields the tail, so a
    /// reader resuming from it replays nothing that is already present.
    #[must_use]
    pub fn seek(&self, sequence: Sequence) -> Cursor {
        if sequence >= self.len {
            return self.tail();
        }
        self.head.advance_to(sequence)
    }

    /// Iterate over the messages after `cursor` that are published right now.
    pub fn iter_after(cursor: &Cursor) -> impl Iterator<Item = Arc<Message>> {
        let mut current = cursor.clone();
        std::iter::from_fn(move || {
            let next = current.next()?;
            let message = next.message().cloned();
            current = next;
            message
        })
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLog").field("len", &self.len).finish()
    }
}
