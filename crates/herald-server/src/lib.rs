//! Shared plumbing for the Herald demo binaries.

pub mod config;
pub mod metrics;
pub mod signal;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing from `RUST_LOG`, defaulting to `herald=debug`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The demo publisher's messages: `HELLO # 1`, `HELLO # 2`, ...
pub fn demo_messages() -> impl Iterator<Item = String> {
    (1u64..).map(|i| format!("HELLO # {i}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_messages_count_from_one() {
        let first: Vec<String> = demo_messages().take(3).collect();
        assert_eq!(first, vec!["HELLO # 1", "HELLO # 2", "HELLO # 3"]);
    }
}
