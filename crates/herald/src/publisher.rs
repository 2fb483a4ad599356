//! The publisher: shared log, connection acceptor and session tasks.

use herald_core::{PublishCoordinator, Sequence};
use herald_protocol::{codec, Payload};
use herald_transport::{TcpTransport, Transport};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::error::PublisherError;
use crate::metrics;
use crate::session::{Session, SessionContext};

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Distributes every published message to every subscriber, in order.
///
/// Subscribers that connect late first receive everything published so far.
/// All methods take `&self`; share the publisher behind an `Arc` to publish
/// from several tasks.
pub struct Publisher {
    config: PublisherConfig,
    coordinator: Arc<PublishCoordinator>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    listening: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
}

impl Publisher {
    /// Create a publisher that will listen on `port` of the default host.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self::with_config(PublisherConfig::with_port(port))
    }

    /// Create a publisher with a custom configuration.
    #[must_use]
    pub fn with_config(config: PublisherConfig) -> Self {
        Self {
            config,
            coordinator: Arc::new(PublishCoordinator::new()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            listening: AtomicBool::new(false),
            local_addr: OnceLock::new(),
        }
    }

    /// Bind the configured address and start accepting subscribers.
    ///
    /// Returns the bound address (useful with port 0) once the accept loop
    /// is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound, the publisher is
    /// already listening, or it has been closed.
    pub async fn listen(&self) -> Result<SocketAddr, PublisherError> {
        self.claim_listener()?;

        let addr = self.config.bind_addr();
        let transport = match TcpTransport::bind(addr.as_str()).await {
            Ok(transport) => transport,
            Err(source) => {
                self.listening.store(false, Ordering::SeqCst);
                return Err(PublisherError::Bind { addr, source });
            }
        };

        let local_addr = transport.listen_addr();
        let _ = self.local_addr.set(local_addr);
        self.spawn_acceptor(transport);

        info!("Publisher listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Start accepting subscribers from an already bound transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the publisher is already listening or closed.
    pub fn serve(&self, transport: impl Transport + 'static) -> Result<(), PublisherError> {
        self.claim_listener()?;
        if let Some(addr) = transport.local_addr() {
            let _ = self.local_addr.set(addr);
        }
        info!(transport = transport.name(), "Publisher serving");
        self.spawn_acceptor(transport);
        Ok(())
    }

    fn claim_listener(&self) -> Result<(), PublisherError> {
        if self.shutdown.is_cancelled() {
            return Err(PublisherError::Closed);
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(PublisherError::AlreadyListening);
        }
        Ok(())
    }

    fn spawn_acceptor(&self, transport: impl Transport + 'static) {
        let ctx = SessionContext {
            coordinator: Arc::clone(&self.coordinator),
            shutdown: self.shutdown.clone(),
            poll_interval: self.config.poll_interval(),
            subscribe_timeout: self.config.subscribe_timeout(),
        };
        self.tasks
            .spawn(accept_loop(transport, ctx, self.tasks.clone()));
    }

    /// Append a message to the log and wake every session.
    ///
    /// Fire-and-forget: never blocks on subscribers and never fails. A
    /// payload too large for one frame is logged and dropped without being
    /// appended, so it takes no sequence number.
    pub fn publish(&self, payload: impl Into<Payload>) {
        let payload = payload.into();
        if let Err(e) = codec::check_payload(&payload) {
            warn!(error = %e, "Dropping undeliverable payload");
            metrics::record_error("oversized");
            return;
        }

        self.coordinator.publish(payload);
        metrics::record_published();
    }

    /// Number of messages published so far.
    #[must_use]
    pub fn published(&self) -> Sequence {
        self.coordinator.len()
    }

    /// The address the publisher is listening on, once listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Stop accepting, end every session and wait for all tasks to exit.
    ///
    /// Idempotent; later calls return once the first teardown has finished.
    pub async fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!(published = self.published(), "Closing publisher");
        }
        self.shutdown.cancel();
        self.coordinator.stop();
        self.tasks.close();
        self.tasks.wait().await;
        debug!("Publisher closed");
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.coordinator.stop();
    }
}

async fn accept_loop(transport: impl Transport, ctx: SessionContext, tasks: TaskTracker) {
    let shutdown = ctx.shutdown.clone();
    let poll_interval = ctx.poll_interval;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = transport.accept(poll_interval) => accepted,
        };

        match accepted {
            Ok(conn) => {
                tasks.spawn(Session::new(conn, ctx.clone()).run());
            }
            Err(e) if e.is_timeout() => {}
            Err(e) => {
                warn!(error = %e, "Accept failed");
                metrics::record_error("accept");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    debug!(transport = transport.name(), "Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubscriberConfig;
    use crate::subscriber::{MessageStream, Subscriber};
    use herald_protocol::{Frame, Message};
    use herald_transport::{Connection, TcpConnection};
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(10);

    fn fast_publisher() -> Publisher {
        Publisher::with_config(PublisherConfig {
            poll_interval_ms: 20,
            ..PublisherConfig::with_port(0)
        })
    }

    fn fast_subscriber() -> Subscriber {
        Subscriber::with_config(SubscriberConfig {
            poll_interval_ms: 20,
            ..SubscriberConfig::default()
        })
    }

    async fn take(stream: &mut MessageStream, n: usize) -> Vec<Message> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match timeout(WAIT, stream.recv()).await {
                Ok(Some(msg)) => out.push(msg),
                Ok(None) => panic!("Stream ended after {} messages", out.len()),
                Err(_) => panic!("Timed out after {} messages", out.len()),
            }
        }
        out
    }

    fn sequences(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.sequence).collect()
    }

    #[tokio::test]
    async fn test_listen_twice_is_rejected() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();
        assert_eq!(publisher.local_addr(), Some(addr));
        assert_ne!(addr.port(), 0);

        assert!(matches!(
            publisher.listen().await,
            Err(PublisherError::AlreadyListening)
        ));
        publisher.close().await;
        assert!(matches!(publisher.listen().await, Err(PublisherError::Closed)));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = fast_publisher();
        let addr = first.listen().await.unwrap();

        let second = Publisher::with_config(PublisherConfig {
            host: addr.ip().to_string(),
            ..PublisherConfig::with_port(addr.port())
        });
        assert!(matches!(
            second.listen().await,
            Err(PublisherError::Bind { .. })
        ));

        first.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_messages_arrive_in_publish_order() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();

        let mut subscriber = fast_subscriber();
        let mut stream = subscriber.subscribe(addr).await.unwrap();

        for i in 1..=100 {
            publisher.publish(format!("msg {i}"));
        }

        let received = take(&mut stream, 100).await;
        assert_eq!(sequences(&received), (1..=100).collect::<Vec<_>>());
        assert_eq!(received[41].payload, Payload::text("msg 42"));

        subscriber.stop().await;
        publisher.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_late_subscriber_gets_backlog_first() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();

        for i in 1..=5 {
            publisher.publish(format!("early {i}"));
        }

        let mut subscriber = fast_subscriber();
        let mut stream = subscriber.subscribe(addr).await.unwrap();
        let backlog = take(&mut stream, 5).await;

        for i in 6..=10 {
            publisher.publish(format!("late {i}"));
        }
        let live = take(&mut stream, 5).await;

        assert_eq!(sequences(&backlog), vec![1, 2, 3, 4, 5]);
        assert_eq!(sequences(&live), vec![6, 7, 8, 9, 10]);
        assert_eq!(live[0].payload, Payload::text("late 6"));

        subscriber.stop().await;
        publisher.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_log_yields_open_empty_stream() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();

        let mut subscriber = fast_subscriber();
        let mut stream = subscriber.subscribe(addr).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(stream.try_recv(), Err(TryRecvError::Empty)));

        publisher.publish("first");
        let first = take(&mut stream, 1).await;
        assert_eq!(first[0].sequence, 1);

        publisher.close().await;
        assert!(timeout(WAIT, stream.recv()).await.unwrap().is_none());
        subscriber.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribers_see_every_message() {
        const MESSAGES: usize = 1000;
        const SUBSCRIBERS: usize = 200;

        let publisher = Arc::new(fast_publisher());
        let addr = publisher.listen().await.unwrap();

        let consumers: Vec<_> = (0..SUBSCRIBERS)
            .map(|_| {
                tokio::spawn(async move {
                    let mut subscriber = fast_subscriber();
                    let mut stream = subscriber.subscribe(addr).await.unwrap();
                    let received = take(&mut stream, MESSAGES).await;
                    subscriber.stop().await;
                    sequences(&received)
                })
            })
            .collect();

        let producer = {
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move {
                for i in 0..MESSAGES {
                    publisher.publish(format!("{i}"));
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        producer.await.unwrap();
        let expected: Vec<u64> = (1..=MESSAGES as u64).collect();
        for consumer in consumers {
            let received = timeout(WAIT * 3, consumer).await.unwrap().unwrap();
            assert_eq!(received, expected);
        }

        timeout(WAIT, publisher.close()).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let unused = fast_publisher();
        timeout(WAIT, unused.close()).await.unwrap();
        timeout(WAIT, unused.close()).await.unwrap();

        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();
        let mut subscriber = fast_subscriber();
        let mut stream = subscriber.subscribe(addr).await.unwrap();
        publisher.publish("only");
        take(&mut stream, 1).await;

        timeout(WAIT, publisher.close()).await.unwrap();
        timeout(WAIT, publisher.close()).await.unwrap();
        assert!(publisher.is_closed());

        // Publishing after close still appends; nobody is left to deliver.
        publisher.publish("ignored");
        assert_eq!(publisher.published(), 2);

        assert!(timeout(WAIT, stream.recv()).await.unwrap().is_none());
        subscriber.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_severed_subscriber_does_not_affect_others() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();

        let mut healthy = fast_subscriber();
        let mut stream = healthy.subscribe(addr).await.unwrap();

        let mut doomed = TcpConnection::connect(addr).await.unwrap();
        doomed.start_send(&Frame::subscribe()).unwrap();
        doomed.flush(WAIT).await.unwrap();

        for i in 1..=50 {
            publisher.publish(format!("before {i}"));
        }
        drop(doomed);
        for i in 51..=100 {
            publisher.publish(format!("after {i}"));
        }

        let received = take(&mut stream, 100).await;
        assert_eq!(sequences(&received), (1..=100).collect::<Vec<_>>());
        assert_eq!(publisher.published(), 100);

        healthy.stop().await;
        publisher.close().await;
    }

    #[tokio::test]
    async fn test_serve_custom_transport() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.listen_addr();

        let publisher = fast_publisher();
        publisher.serve(transport).unwrap();
        assert_eq!(publisher.local_addr(), Some(addr));
        publisher.publish("hello");

        let mut subscriber = fast_subscriber();
        let mut stream = subscriber.subscribe(addr).await.unwrap();
        assert_eq!(take(&mut stream, 1).await[0].payload, Payload::text("hello"));

        subscriber.stop().await;
        publisher.close().await;
    }

    async fn wait_for_tasks(publisher: &Publisher, expected: usize) {
        let settled = timeout(WAIT, async {
            while publisher.tasks.len() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            settled.is_ok(),
            "Expected {expected} tasks, found {}",
            publisher.tasks.len()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_oversized_publish_is_dropped() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();

        publisher.publish("before");
        publisher.publish(vec![0u8; codec::MAX_FRAME_SIZE + 1]);
        publisher.publish("after");
        assert_eq!(publisher.published(), 2);

        for _ in 0..2 {
            let mut subscriber = fast_subscriber();
            let mut stream = subscriber.subscribe(addr).await.unwrap();
            let received = take(&mut stream, 2).await;
            assert_eq!(sequences(&received), vec![1, 2]);
            assert_eq!(received[0].payload, Payload::text("before"));
            assert_eq!(received[1].payload, Payload::text("after"));
            subscriber.stop().await;
        }

        publisher.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_skips_entry_that_cannot_be_encoded() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();

        // Appended straight to the log, bypassing the size check.
        publisher.publish("first");
        publisher
            .coordinator
            .publish(vec![0u8; codec::MAX_FRAME_SIZE + 1]);
        publisher.publish("third");

        let mut subscriber = fast_subscriber();
        let mut stream = subscriber.subscribe(addr).await.unwrap();
        assert_eq!(sequences(&take(&mut stream, 2).await), vec![1, 3]);

        publisher.publish("fourth");
        let live = take(&mut stream, 1).await;
        assert_eq!(live[0].sequence, 4);

        subscriber.stop().await;
        publisher.close().await;
    }

    #[tokio::test]
    async fn test_parked_session_exits_when_subscriber_hangs_up() {
        let publisher = fast_publisher();
        let addr = publisher.listen().await.unwrap();
        wait_for_tasks(&publisher, 1).await;

        let mut conn = TcpConnection::connect(addr).await.unwrap();
        conn.start_send(&Frame::subscribe()).unwrap();
        conn.flush(WAIT).await.unwrap();
        wait_for_tasks(&publisher, 2).await;

        // Nothing is published, so only the hang-up can end the session.
        conn.close().await.unwrap();
        wait_for_tasks(&publisher, 1).await;

        publisher.close().await;
    }
}
