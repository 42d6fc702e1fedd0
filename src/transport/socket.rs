//! TCP socket transport, with optional TLS and a custom dial hook.
//!
//! Reads go through a 4 KiB buffer; writes accumulate until `flush`. The
//! connect timeout bounds dialing (including the dial hook) and its error
//! message contains the word "timeout" so callers can assert on it.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::TransportError;

use super::Transport;

const READ_BUFFER_SIZE: usize = 4096;

/// Custom dialer invoked instead of a direct TCP connect. The future is
/// raced against the connect timeout.
pub type DialFn =
    Arc<dyn Fn(String, u16) -> BoxFuture<'static, io::Result<TcpStream>> + Send + Sync>;

/// TLS knobs for the binary transport.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Skip certificate chain validation.
    pub accept_invalid_certs: bool,
    /// Skip hostname verification.
    pub accept_invalid_hostnames: bool,
    /// Server name to verify against; defaults to the connect host.
    pub domain: Option<String>,
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> AsyncStream for T {}

/// Buffered TCP (optionally TLS) transport.
pub struct SocketTransport {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    tls: Option<TlsOptions>,
    dial: Option<DialFn>,
    stream: Option<Box<dyn AsyncStream>>,
    rbuf: BytesMut,
    wbuf: BytesMut,
}

impl SocketTransport {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Option<Duration>,
        tls: Option<TlsOptions>,
        dial: Option<DialFn>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            tls,
            dial,
            stream: None,
            rbuf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            wbuf: BytesMut::new(),
        }
    }

    async fn dial(&self) -> Result<TcpStream, TransportError> {
        let connect: BoxFuture<'static, io::Result<TcpStream>> = match &self.dial {
            Some(dial) => dial(self.host.clone(), self.port),
            None => {
                let host = self.host.clone();
                let port = self.port;
                Box::pin(async move { TcpStream::connect((host.as_str(), port)).await })
            }
        };
        let tcp = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                TransportError::DialTimeout {
                    host: self.host.clone(),
                    port: self.port,
                    timeout_ms: timeout.as_millis() as u64,
                }
            })?,
            None => connect.await,
        };
        tcp.map_err(|e| TransportError::DialFailed {
            host: self.host.clone(),
            port: self.port,
            message: e.to_string(),
        })
    }

    async fn maybe_tls(&self, tcp: TcpStream) -> Result<Box<dyn AsyncStream>, TransportError> {
        let Some(tls) = &self.tls else {
            return Ok(Box::new(tcp));
        };
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(tls.accept_invalid_certs)
            .danger_accept_invalid_hostnames(tls.accept_invalid_hostnames)
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let domain = tls.domain.clone().unwrap_or_else(|| self.host.clone());
        let stream = connector
            .connect(&domain, tcp)
            .await
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(Box::new(stream))
    }

    fn stream(&mut self) -> Result<&mut Box<dyn AsyncStream>, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let tcp = self.dial().await?;
        let stream = self.maybe_tls(tcp).await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        self.rbuf.clear();
        self.wbuf.clear();
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.rbuf.is_empty() {
            let stream = self.stream()?;
            let mut chunk = [0u8; READ_BUFFER_SIZE];
            let got = stream.read(&mut chunk).await?;
            if got == 0 {
                return Ok(0);
            }
            self.rbuf.put_slice(&chunk[..got]);
        }
        let n = buf.len().min(self.rbuf.len());
        buf[..n].copy_from_slice(&self.rbuf[..n]);
        self.rbuf.advance(n);
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotOpen);
        }
        self.wbuf.put_slice(buf);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        let pending = self.wbuf.split();
        let stream = self.stream()?;
        stream.write_all(&pending).await?;
        stream.flush().await?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_hook_timeout_error_contains_timeout() {
        // A dial hook that never resolves must be bounded by the connect
        // timeout.
        let dial: DialFn = Arc::new(|_, _| Box::pin(std::future::pending()));
        let mut transport = SocketTransport::new(
            "hive.invalid",
            10000,
            Some(Duration::from_millis(50)),
            None,
            Some(dial),
        );
        let err = transport.open().await.unwrap_err();
        assert!(err.to_string().contains("timeout"), "got: {err}");
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_dial_hook_failure_is_dial_failed() {
        let dial: DialFn = Arc::new(|_, _| {
            Box::pin(async {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))
            })
        });
        let mut transport = SocketTransport::new("localhost", 1, None, None, Some(dial));
        let err = transport.open().await.unwrap_err();
        match err {
            TransportError::DialFailed { message, .. } => {
                assert!(message.contains("refused"));
            }
            other => panic!("expected DialFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_not_open() {
        let mut transport = SocketTransport::new("localhost", 1, None, None, None);
        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.read(&mut buf).await.unwrap_err(),
            TransportError::NotOpen
        ));
    }

    #[tokio::test]
    async fn test_loopback_roundtrip_buffers_until_flush() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 10];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(&buf).await.unwrap();
        });

        let mut transport =
            SocketTransport::new(addr.ip().to_string(), addr.port(), None, None, None);
        transport.open().await.unwrap();
        transport.write_all(b"hello").await.unwrap();
        transport.write_all(b"world").await.unwrap();
        transport.flush().await.unwrap();

        let echoed = crate::transport::read_exact(&mut transport, 10).await.unwrap();
        assert_eq!(&echoed, b"helloworld");

        transport.close().await.unwrap();
        server.await.unwrap();
    }
}
