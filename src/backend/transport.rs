//! Byte-stream transports to database servers.
//!
//! The pool only ever talks to a backend through [`Transport`], and only
//! opens one through a [`Connector`]. Production uses TCP; tests inject
//! in-memory implementations.

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

use crate::protocol::codec::{read_frame, write_frame};
use crate::protocol::Frame;

/// One open backend byte stream.
#[async_trait]
pub trait Transport: Send + std::fmt::Debug {
    /// Send a frame and flush it.
    async fn send(&mut self, frame: &Frame) -> std::io::Result<()>;

    /// Receive the next frame; `None` means the server closed the stream.
    async fn recv(&mut self) -> std::io::Result<Option<Frame>>;

    /// Close the underlying stream. Must not block.
    fn close(&mut self);
}

/// Factory for new backend transports.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    async fn connect(&self, address: &str) -> std::io::Result<Box<dyn Transport>>;
}

/// TCP connector used in production.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    max_frame_bytes: usize,
}

impl TcpConnector {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> std::io::Result<Box<dyn Transport>> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpTransport {
            stream: Some(BufStream::new(stream)),
            max_frame_bytes: self.max_frame_bytes,
        }))
    }
}

/// Buffered TCP stream speaking the frame codec.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<BufStream<TcpStream>>,
    max_frame_bytes: usize,
}

impl TcpTransport {
    fn stream(&mut self) -> std::io::Result<&mut BufStream<TcpStream>> {
        self.stream.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "transport closed")
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: &Frame) -> std::io::Result<()> {
        let stream = self.stream()?;
        write_frame(stream, frame).await?;
        stream.flush().await
    }

    async fn recv(&mut self) -> std::io::Result<Option<Frame>> {
        let max = self.max_frame_bytes;
        let stream = self.stream()?;
        read_frame(stream, max).await
    }

    fn close(&mut self) {
        // Dropping the stream closes the socket.
        self.stream = None;
    }
}
