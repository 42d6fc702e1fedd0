//! SASL-framed transport.
//!
//! After the handshake, every application message travels in a frame of
//! `len_be32 | payload`, where the payload has been wrapped by the
//! negotiated mechanism when the quality of protection calls for it. The
//! maximum frame size bounds both directions; an oversize frame is a
//! protocol error, not a truncation.

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};

use crate::auth::SaslMechanism;
use crate::error::{AuthError, TransportError};

use super::{read_exact, Transport};

/// Handshake message status codes.
mod status {
    pub const START: u8 = 1;
    pub const OK: u8 = 2;
    pub const BAD: u8 = 3;
    pub const ERROR: u8 = 4;
    pub const COMPLETE: u8 = 5;
}

/// Framed transport running a SASL mechanism over an inner transport.
pub struct SaslTransport {
    inner: Box<dyn Transport>,
    mechanism: Box<dyn SaslMechanism>,
    max_frame_size: u32,
    handshaken: bool,
    rbuf: BytesMut,
    wbuf: BytesMut,
}

impl SaslTransport {
    pub fn new(
        inner: Box<dyn Transport>,
        mechanism: Box<dyn SaslMechanism>,
        max_frame_size: u32,
    ) -> Self {
        Self {
            inner,
            mechanism,
            max_frame_size,
            handshaken: false,
            rbuf: BytesMut::new(),
            wbuf: BytesMut::new(),
        }
    }

    async fn send_handshake(&mut self, code: u8, payload: &[u8]) -> Result<(), TransportError> {
        let mut frame = BytesMut::with_capacity(5 + payload.len());
        frame.put_u8(code);
        frame.put_u32(payload.len() as u32);
        frame.put_slice(payload);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }

    async fn recv_handshake(&mut self) -> Result<(u8, Vec<u8>), TransportError> {
        let header = read_exact(self.inner.as_mut(), 5).await?;
        let code = header[0];
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }
        let payload = read_exact(self.inner.as_mut(), len as usize).await?;
        Ok((code, payload))
    }

    /// Run the START → OK… → COMPLETE exchange.
    async fn handshake(&mut self) -> Result<(), TransportError> {
        let name = self.mechanism.name().as_bytes().to_vec();
        self.send_handshake(status::START, &name).await?;
        let initial = self.mechanism.start()?;
        self.send_handshake(status::OK, &initial).await?;

        loop {
            let (code, payload) = self.recv_handshake().await?;
            match code {
                status::OK => {
                    let token = self.mechanism.step(&payload)?;
                    self.send_handshake(status::OK, &token).await?;
                }
                status::COMPLETE => {
                    if !self.mechanism.is_complete() {
                        // Final challenge piggybacked on COMPLETE.
                        self.mechanism.step(&payload)?;
                        if !self.mechanism.is_complete() {
                            return Err(TransportError::SaslHandshake(
                                "server completed before the mechanism did".to_string(),
                            ));
                        }
                    }
                    return Ok(());
                }
                status::BAD | status::ERROR => {
                    let text = String::from_utf8_lossy(&payload).into_owned();
                    return Err(TransportError::Sasl(AuthError::Rejected(text)));
                }
                other => {
                    return Err(TransportError::SaslHandshake(format!(
                        "unexpected handshake status {other}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl Transport for SaslTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.handshaken {
            return Ok(());
        }
        self.inner.open().await?;
        self.handshake().await?;
        self.handshaken = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.mechanism.dispose();
        self.handshaken = false;
        self.rbuf.clear();
        self.wbuf.clear();
        self.inner.close().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.handshaken {
            return Err(TransportError::NotOpen);
        }
        if self.rbuf.is_empty() {
            let header = read_exact(self.inner.as_mut(), 4).await?;
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            if len > self.max_frame_size {
                return Err(TransportError::FrameTooLarge {
                    size: len,
                    max: self.max_frame_size,
                });
            }
            let wrapped = read_exact(self.inner.as_mut(), len as usize).await?;
            let payload = self.mechanism.unwrap(&wrapped)?;
            self.rbuf.put_slice(&payload);
        }
        let n = buf.len().min(self.rbuf.len());
        buf[..n].copy_from_slice(&self.rbuf[..n]);
        self.rbuf.advance(n);
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        if !self.handshaken {
            return Err(TransportError::NotOpen);
        }
        self.wbuf.put_slice(buf);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        let pending = self.wbuf.split();
        let wrapped = self.mechanism.wrap(&pending)?;
        if wrapped.len() as u32 > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: wrapped.len() as u32,
                max: self.max_frame_size,
            });
        }
        let mut frame = BytesMut::with_capacity(4 + wrapped.len());
        frame.put_u32(wrapped.len() as u32);
        frame.put_slice(&wrapped);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }

    fn is_open(&self) -> bool {
        self.handshaken && self.inner.is_open()
    }
}
