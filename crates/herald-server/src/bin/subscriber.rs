//! # Herald Subscriber
//!
//! Demo subscriber: logs every message from the configured publisher.
//!
//! ```bash
//! herald-subscriber --config /path/to/herald.toml
//! ```

use anyhow::Result;
use herald::Subscriber;
use herald_server::{config::Config, init_tracing, signal::shutdown_signal};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load()?;
    let addr = config.demo.publisher_addr.as_str();

    let mut subscriber = Subscriber::with_config(config.subscriber.clone());
    let mut stream = subscriber.subscribe(addr).await?;
    info!("Subscribed to {}", addr);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!(error = %e, "Signal handler failed");
                }
                break;
            }
            message = stream.recv() => match message {
                Some(message) => info!(sequence = message.sequence, "Received {}", message.payload),
                None => {
                    info!("Publisher went away");
                    break;
                }
            },
        }
    }

    subscriber.stop().await;
    Ok(())
}
