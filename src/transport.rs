//! Byte-stream transports the [`crate::client::Client`] can own: a TCP
//! socket or a serial port, plus an in-memory mock for tests.
//!
//! Each concrete transport is a narrow connect function returning a
//! boxed [`Transport`] trait object, the same shape the teacher uses to
//! keep its UDP/TCP receivers decoupled from the task that drives them.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::TransportError;

/// A full-duplex byte stream. Blanket-implemented for anything that is
/// already `AsyncRead + AsyncWrite + Send + Unpin`, so `TcpStream`,
/// `tokio_serial::SerialStream`, and the test-only mock duplex all
/// qualify with no wrapper boilerplate.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// TCP transport, for panels exposed through an IP/serial bridge.
pub struct TcpTransport;

impl TcpTransport {
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let addr = format!("{host}:{port}");
        debug!(addr = %addr, "connecting tcp transport");
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout)?
            .map_err(TransportError::WriteFailed)?;
        stream.set_nodelay(true).map_err(TransportError::WriteFailed)?;
        Ok(Box::new(stream))
    }
}

/// Serial transport, for panels wired directly to a local RS-232/USB
/// port. Fixed at 9600 8-N-1 per the protocol's one supported framing.
pub struct SerialTransport;

impl SerialTransport {
    pub async fn connect(
        device_path: &str,
        _connect_timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        debug!(device = device_path, "opening serial transport");
        // Opening a local serial device is a non-blocking syscall, not a
        // network round trip, so there is nothing here to time out on.
        let port = tokio_serial::new(device_path, 9600)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .open_native_async()
            .map_err(|e| {
                warn!(device = device_path, error = %e, "failed to open serial port");
                TransportError::WriteFailed(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;
        Ok(Box::new(port))
    }
}

/// In-memory duplex transport used by the test suite in place of a live
/// panel.
#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::Transport;
    use tokio::io::duplex;

    /// Create a connected pair: `(client_side, panel_side)`. The client
    /// side is handed to a [`crate::client::Client`]; the panel side is
    /// driven by the test to script panel behavior.
    pub fn pair(buffer_size: usize) -> (Box<dyn Transport>, Box<dyn Transport>) {
        let (a, b) = duplex(buffer_size);
        (Box::new(a), Box::new(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn mock_pair_is_full_duplex() {
        let (mut client, mut panel) = mock::pair(64);
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        panel.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        panel.write_all(b"world").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");
    }
}
