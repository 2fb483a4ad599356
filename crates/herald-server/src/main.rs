//! # Herald Publisher
//!
//! Demo publisher: publishes `HELLO # i` at a fixed interval until stopped.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! herald-publisher
//!
//! # Run with custom config
//! herald-publisher --config /path/to/herald.toml
//!
//! # Run with environment variables
//! HERALD_PORT=7000 HERALD_HOST=0.0.0.0 herald-publisher
//! ```

use anyhow::Result;
use herald::Publisher;
use herald_server::{
    config::Config, demo_messages, init_tracing, metrics, signal::shutdown_signal,
};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load()?;

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
    }

    let publisher = Publisher::with_config(config.publisher.clone());
    let addr = publisher.listen().await?;
    info!("Starting Herald publisher on {}", addr);

    let mut ticker = tokio::time::interval(Duration::from_millis(
        config.demo.publish_interval_ms.max(1),
    ));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut messages = demo_messages();
    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!(error = %e, "Signal handler failed");
                }
                break;
            }
            _ = ticker.tick() => {
                let Some(text) = messages.next() else { break };
                info!("Publishing {}", text);
                publisher.publish(text);
            }
        }
    }

    info!("Shutting down");
    publisher.close().await;
    Ok(())
}
