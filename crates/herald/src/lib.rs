//! # Herald
//!
//! A publish/subscribe distributor that replays its whole history. Every
//! subscriber receives every message the publisher has ever published, in
//! publish order, starting from the first one, no matter when it connects.
//!
//! ```no_run
//! use herald::{Publisher, Subscriber};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = Publisher::new(0);
//! let addr = publisher.listen().await?;
//! publisher.publish("hello");
//!
//! let mut subscriber = Subscriber::new();
//! let mut stream = subscriber.subscribe(addr).await?;
//! while let Some(message) = stream.recv().await {
//!     println!("#{} {}", message.sequence, message.payload);
//! }
//!
//! subscriber.stop().await;
//! publisher.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod publisher;
mod session;
pub mod subscriber;

pub use config::{PublisherConfig, SubscriberConfig, DEFAULT_PORT};
pub use error::{PublisherError, SubscriberError};
pub use herald_core::{Message, Payload, Sequence};
pub use publisher::Publisher;
pub use subscriber::{MessageStream, Subscriber};
