//! Transport abstraction for Thrift RPC traffic.
//!
//! A transport moves opaque request/response bytes between the client and
//! the server. Writes buffer until `flush`; `flush` is the point where a
//! SASL frame is emitted or an HTTP round-trip happens. Reads hand back
//! raw application bytes with any framing already stripped.

pub mod http;
pub mod sasl;
pub mod socket;

use async_trait::async_trait;

use crate::error::TransportError;

pub use http::HttpTransport;
pub use sasl::SaslTransport;
pub use socket::SocketTransport;

/// Byte-oriented transport carrying Thrift RPC traffic.
#[async_trait]
pub trait Transport: Send {
    /// Open the transport. For SASL variants this runs the handshake.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Close the transport and release the underlying resources.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes, returning how many were filled.
    /// Returns `Ok(0)` only on end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Buffer `buf` for sending; nothing hits the wire until `flush`.
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Emit everything buffered since the last flush as one unit.
    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Whether the transport is open and usable.
    fn is_open(&self) -> bool;
}

/// Read exactly `n` bytes from a transport.
pub(crate) async fn read_exact(
    transport: &mut (dyn Transport + '_),
    n: usize,
) -> Result<Vec<u8>, TransportError> {
    let mut out = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        let got = transport.read(&mut out[filled..]).await?;
        if got == 0 {
            return Err(TransportError::Protocol(format!(
                "unexpected end of stream after {filled} of {n} bytes"
            )));
        }
        filled += got;
    }
    Ok(out)
}
