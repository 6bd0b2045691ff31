//! Serial link transports.
//!
//! The radio is reached either through a character device (a UART exposed by
//! the host) or through a TCP serial bridge such as `ser2net`.

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::info;

/// Where the serial link lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEndpoint {
    /// Character device path
    Device(PathBuf),
    /// TCP serial bridge address (`host:port`)
    Tcp(String),
}

impl fmt::Display for SerialEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialEndpoint::Device(path) => write!(f, "{}", path.display()),
            SerialEndpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// Unified stream type over the supported serial transports
pub enum IoStream {
    /// TCP serial bridge
    Tcp(TcpStream),
    /// Character device.
    ///
    /// Tokio runs one operation at a time per `File`, so reads and writes use
    /// separate handles to keep a pending read from blocking writes.
    Device {
        /// Handle used for reads
        reader: File,
        /// Handle used for writes
        writer: File,
    },
}

impl AsyncRead for IoStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            IoStream::Device { reader, .. } => Pin::new(reader).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IoStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            IoStream::Device { writer, .. } => Pin::new(writer).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            IoStream::Device { writer, .. } => Pin::new(writer).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            IoStream::Device { writer, .. } => Pin::new(writer).poll_shutdown(cx),
        }
    }
}

impl IoStream {
    /// Open the serial link at `endpoint`
    pub async fn open(endpoint: &SerialEndpoint) -> std::io::Result<Self> {
        let stream = match endpoint {
            SerialEndpoint::Device(path) => {
                let reader = open_device(path).await?;
                let writer = reader.try_clone().await?;
                IoStream::Device { reader, writer }
            }
            SerialEndpoint::Tcp(addr) => {
                let stream = connect_tcp(addr).await?;
                stream.set_nodelay(true)?;
                IoStream::Tcp(stream)
            }
        };
        info!("Opened serial link {}", endpoint);
        Ok(stream)
    }
}

/// Open a character device for reading and writing
pub async fn open_device(path: &std::path::Path) -> tokio::io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path).await
}

/// Connect to a TCP serial bridge
pub async fn connect_tcp(addr: &str) -> tokio::io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_tcp_bridge() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.unwrap();
        let bound_addr = listener.local_addr().unwrap();

        let endpoint = SerialEndpoint::Tcp(bound_addr.to_string());
        let mut stream = IoStream::open(&endpoint).await.unwrap();
        let (mut bridge, _) = listener.accept().await.unwrap();

        stream.write_all(&[1, 0x2A]).await.unwrap();
        let mut buf = [0u8; 2];
        bridge.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 0x2A]);
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let endpoint = SerialEndpoint::Device(PathBuf::from("/nonexistent/ttyVAINA0"));
        assert!(IoStream::open(&endpoint).await.is_err());
        assert_eq!(endpoint.to_string(), "/nonexistent/ttyVAINA0");
    }
}
