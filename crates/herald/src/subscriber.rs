//! The subscriber client.

use futures_util::Stream;
use herald_core::{Message, Sequence};
use herald_protocol::Frame;
use herald_transport::{Connection, TcpConnection, TransportError};
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::ToSocketAddrs;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::SubscriberConfig;
use crate::error::SubscriberError;
use crate::metrics;

/// Connects to a publisher and streams its messages.
pub struct Subscriber {
    config: SubscriberConfig,
    shutdown: CancellationToken,
    receiver: Option<JoinHandle<()>>,
}

/// Messages delivered to a subscriber, in publish order.
///
/// Ends once the publisher closes, the connection fails or the subscriber is
/// stopped.
pub struct MessageStream {
    rx: mpsc::Receiver<Message>,
}

impl Subscriber {
    /// Create a subscriber with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SubscriberConfig::default())
    }

    /// Create a subscriber with a custom configuration.
    #[must_use]
    pub fn with_config(config: SubscriberConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            receiver: None,
        }
    }

    /// Subscribe to the publisher at `addr`, starting from its first message.
    ///
    /// # Errors
    ///
    /// Fails if the publisher cannot be reached, the request cannot be sent,
    /// or this subscriber is already subscribed or stopped.
    pub async fn subscribe<A>(&mut self, addr: A) -> Result<MessageStream, SubscriberError>
    where
        A: ToSocketAddrs + Display,
    {
        self.start(addr, Frame::subscribe()).await
    }

    /// Subscribe, skipping every message up to and including `last_seen`.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub async fn subscribe_from<A>(
        &mut self,
        addr: A,
        last_seen: Sequence,
    ) -> Result<MessageStream, SubscriberError>
    where
        A: ToSocketAddrs + Display,
    {
        self.start(addr, Frame::subscribe_from(last_seen)).await
    }

    async fn start<A>(&mut self, addr: A, request: Frame) -> Result<MessageStream, SubscriberError>
    where
        A: ToSocketAddrs + Display,
    {
        if self.shutdown.is_cancelled() {
            return Err(SubscriberError::Stopped);
        }
        if self.receiver.is_some() {
            return Err(SubscriberError::AlreadySubscribed);
        }

        let target = addr.to_string();
        let connect_timeout = self.config.connect_timeout();
        let mut conn = match tokio::time::timeout(connect_timeout, TcpConnection::connect(addr)).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(source)) => {
                return Err(SubscriberError::Connect {
                    addr: target,
                    source,
                })
            }
            Err(_) => return Err(SubscriberError::ConnectTimeout(target)),
        };

        let sent = match conn.start_send(&request) {
            Ok(()) => conn.flush(connect_timeout).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            let _ = conn.close().await;
            return Err(SubscriberError::Handshake(e));
        }

        info!(publisher = %target, "Subscribed");

        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        self.receiver = Some(tokio::spawn(receive_loop(
            conn,
            tx,
            self.shutdown.clone(),
            self.config.poll_interval(),
        )));
        Ok(MessageStream { rx })
    }

    /// Stop receiving and wait for the receive task to exit.
    ///
    /// Idempotent. The stream ends after any already queued messages.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.receiver.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Receive task failed");
            }
        }
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for Subscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn receive_loop(
    mut conn: TcpConnection,
    tx: mpsc::Sender<Message>,
    shutdown: CancellationToken,
    poll_interval: Duration,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = conn.recv(poll_interval) => received,
        };

        let message = match received {
            Ok(Frame::Message(message)) => {
                Arc::try_unwrap(message).unwrap_or_else(|shared| (*shared).clone())
            }
            Ok(other) => {
                warn!(kind = other.kind(), "Unexpected frame from publisher");
                metrics::record_error("protocol");
                break;
            }
            Err(TransportError::Timeout) => continue,
            Err(TransportError::ConnectionClosed) => {
                debug!("Publisher closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Receive failed");
                metrics::record_error("receive");
                break;
            }
        };

        trace!(sequence = message.sequence, "Received");
        metrics::record_received();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            sent = tx.send(message) => {
                if sent.is_err() {
                    debug!("Message stream dropped");
                    break;
                }
            }
        }
    }

    let _ = conn.close().await;
}

impl MessageStream {
    /// Wait for the next message. `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] while the stream is open but idle,
    /// [`TryRecvError::Disconnected`] once it has ended.
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}
