//! Fixtures shared by the Herald benchmarks.

use herald::{MessageStream, Payload, Publisher, PublisherConfig, SubscriberConfig};
use std::net::SocketAddr;

/// Poll interval used by benchmark publishers and subscribers, in milliseconds.
pub const BENCH_POLL_MS: u64 = 20;

/// A payload of `size` bytes.
#[must_use]
pub fn payload(size: usize) -> Payload {
    Payload::Binary(vec![0xAB; size])
}

/// A publisher on an ephemeral local port, already listening.
///
/// # Panics
///
/// Panics if no local port can be bound.
pub async fn local_publisher() -> (Publisher, SocketAddr) {
    let publisher = Publisher::with_config(PublisherConfig {
        poll_interval_ms: BENCH_POLL_MS,
        ..PublisherConfig::with_port(0)
    });
    let addr = publisher.listen().await.expect("bind benchmark publisher");
    (publisher, addr)
}

/// Subscriber settings with a queue deep enough to not stall delivery.
#[must_use]
pub fn subscriber_config() -> SubscriberConfig {
    SubscriberConfig {
        queue_capacity: 1024,
        poll_interval_ms: BENCH_POLL_MS,
        ..SubscriberConfig::default()
    }
}

/// Receive `count` messages, returning the last sequence seen.
///
/// # Panics
///
/// Panics if the stream ends early.
pub async fn drain(stream: &mut MessageStream, count: usize) -> u64 {
    let mut last = 0;
    for _ in 0..count {
        last = stream.recv().await.expect("stream ended early").sequence;
    }
    last
}
