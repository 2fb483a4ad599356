//! Metrics instrumentation for Herald.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder (the `herald-publisher` binary
//! installs a Prometheus exporter).

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "herald_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "herald_sessions_active";
    pub const MESSAGES_PUBLISHED: &str = "herald_messages_published_total";
    pub const MESSAGES_DELIVERED: &str = "herald_messages_delivered_total";
    pub const MESSAGES_RECEIVED: &str = "herald_messages_received_total";
    pub const ERRORS_TOTAL: &str = "herald_errors_total";
}

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of subscriber sessions since start"
    );
    metrics::describe_gauge!(
        names::SESSIONS_ACTIVE,
        "Current number of subscriber sessions"
    );
    metrics::describe_counter!(names::MESSAGES_PUBLISHED, "Messages appended to the log");
    metrics::describe_counter!(
        names::MESSAGES_DELIVERED,
        "Messages written to subscriber connections"
    );
    metrics::describe_counter!(
        names::MESSAGES_RECEIVED,
        "Messages received by subscriber clients"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of transport errors");
}

/// Record a publish.
pub fn record_published() {
    counter!(names::MESSAGES_PUBLISHED).increment(1);
}

/// Record messages flushed to one subscriber.
pub fn record_delivered(count: usize) {
    counter!(names::MESSAGES_DELIVERED).increment(count as u64);
}

/// Record a message received by a subscriber client.
pub fn record_received() {
    counter!(names::MESSAGES_RECEIVED).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Tracks a session in the session gauges for as long as it lives.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Record a new session.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::SESSIONS_TOTAL).increment(1);
        gauge!(names::SESSIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
    }
}
