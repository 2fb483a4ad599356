//! TCP transport implementation.
//!
//! Frames travel as length-prefixed MessagePack directly over the stream.
//! Both directions keep a persistent buffer so every operation is
//! cancel-safe and can be bounded by a deadline.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use herald_protocol::{codec, Frame};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace};

use crate::traits::{Connection, ConnectionId, Transport, TransportError};

/// Initial read buffer capacity.
const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// TCP listener transport.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind a listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be resolved or bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!("TCP transport listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address the listener is bound to.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn accept(&self, timeout: Duration) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, addr) = tokio::time::timeout(timeout, self.listener.accept())
            .await
            .map_err(|_| TransportError::Timeout)??;

        let conn = TcpConnection::new(stream, addr);
        debug!(connection = %conn.id, remote = %addr, "Accepted TCP connection");
        Ok(Box::new(conn))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// A framed TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    stream: TcpStream,
    remote_addr: SocketAddr,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    closed: bool,
}

impl TcpConnection {
    fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        // Frames are small and latency matters more than packet count.
        let _ = stream.set_nodelay(true);
        Self {
            id: ConnectionId::generate(),
            stream,
            remote_addr,
            read_buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buffer: BytesMut::new(),
            closed: false,
        }
    }

    /// Dial a publisher.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        let remote_addr = stream.peer_addr()?;
        let conn = Self::new(stream, remote_addr);
        debug!(connection = %conn.id, remote = %remote_addr, "Connected");
        Ok(conn)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Frame, TransportError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                trace!(connection = %self.id, kind = frame.kind(), "Received frame");
                return Ok(frame);
            }

            if self.closed {
                return Err(TransportError::ConnectionClosed);
            }

            self.read_buffer.reserve(READ_BUFFER_CAPACITY);
            match timeout_at(deadline, self.stream.read_buf(&mut self.read_buffer)).await {
                Err(_) => return Err(TransportError::Timeout),
                Ok(Ok(0)) => {
                    debug!(connection = %self.id, "Peer closed the stream");
                    self.closed = true;
                    return Err(TransportError::ConnectionClosed);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn start_send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        codec::encode_into(frame, &mut self.write_buffer)?;
        Ok(())
    }

    async fn flush(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;

        while !self.write_buffer.is_empty() {
            match timeout_at(deadline, self.stream.write(&self.write_buffer)).await {
                Err(_) => return Err(TransportError::Timeout),
                Ok(Ok(0)) => return Err(TransportError::ConnectionClosed),
                Ok(Ok(n)) => self.write_buffer.advance(n),
                Ok(Err(e)) => return Err(TransportError::Io(e)),
            }
        }
        Ok(())
    }

    fn has_pending(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed && self.write_buffer.is_empty() {
            return Ok(());
        }
        self.closed = true;
        self.write_buffer.clear();

        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }
}
