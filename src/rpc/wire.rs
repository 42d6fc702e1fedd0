//! Thrift binary-protocol encoding and decoding.
//!
//! This is the serialization layer for the TCLIService RPC stubs in
//! [`crate::rpc::messages`]: the strict binary protocol (version word,
//! field headers, length-prefixed strings) with unknown-field skipping so
//! newer servers can add fields without breaking the decoder.

use std::future::Future;
use std::pin::Pin;

use bytes::{BufMut, BytesMut};

use crate::error::TransportError;
use crate::transport::{read_exact, Transport};

/// Thrift wire type ids.
pub mod ttype {
    pub const STOP: u8 = 0;
    pub const BOOL: u8 = 2;
    pub const BYTE: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const I16: u8 = 6;
    pub const I32: u8 = 8;
    pub const I64: u8 = 10;
    pub const STRING: u8 = 11;
    pub const STRUCT: u8 = 12;
    pub const MAP: u8 = 13;
    pub const SET: u8 = 14;
    pub const LIST: u8 = 15;
}

/// Thrift message envelope types.
pub mod message {
    pub const CALL: u8 = 1;
    pub const REPLY: u8 = 2;
    pub const EXCEPTION: u8 = 3;
}

const VERSION_1: u32 = 0x8001_0000;

/// Upper bound on any single decoded length. Frames are already bounded by
/// the SASL maximum; this guards the unframed (NOSASL) read path against
/// garbage lengths.
const MAX_DECODE_LEN: i32 = 1 << 30;

/// Serializer for one outgoing Thrift message.
#[derive(Default)]
pub struct ThriftWriter {
    buf: BytesMut,
}

impl ThriftWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_begin(&mut self, name: &str, message_type: u8, seq: i32) {
        self.buf.put_u32(VERSION_1 | message_type as u32);
        self.write_string(name);
        self.buf.put_i32(seq);
    }

    pub fn field_begin(&mut self, field_type: u8, id: i16) {
        self.buf.put_u8(field_type);
        self.buf.put_i16(id);
    }

    pub fn field_stop(&mut self) {
        self.buf.put_u8(ttype::STOP);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.put_i32(v.len() as i32);
        self.buf.put_slice(v);
    }

    pub fn write_string(&mut self, v: &str) {
        self.write_bytes(v.as_bytes());
    }

    pub fn list_begin(&mut self, elem_type: u8, len: usize) {
        self.buf.put_u8(elem_type);
        self.buf.put_i32(len as i32);
    }

    pub fn map_begin(&mut self, key_type: u8, value_type: u8, len: usize) {
        self.buf.put_u8(key_type);
        self.buf.put_u8(value_type);
        self.buf.put_i32(len as i32);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Incremental decoder reading one Thrift message off a transport.
pub struct ThriftReader<'a> {
    transport: &'a mut (dyn Transport + 'a),
}

impl<'a> ThriftReader<'a> {
    pub fn new(transport: &'a mut (dyn Transport + 'a)) -> Self {
        Self { transport }
    }

    pub async fn read_u8(&mut self) -> Result<u8, TransportError> {
        let b = read_exact(self.transport, 1).await?;
        Ok(b[0])
    }

    pub async fn read_bool(&mut self) -> Result<bool, TransportError> {
        Ok(self.read_u8().await? != 0)
    }

    pub async fn read_i8(&mut self) -> Result<i8, TransportError> {
        Ok(self.read_u8().await? as i8)
    }

    pub async fn read_i16(&mut self) -> Result<i16, TransportError> {
        let b = read_exact(self.transport, 2).await?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    pub async fn read_i32(&mut self) -> Result<i32, TransportError> {
        let b = read_exact(self.transport, 4).await?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub async fn read_i64(&mut self) -> Result<i64, TransportError> {
        let b = read_exact(self.transport, 8).await?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub async fn read_f64(&mut self) -> Result<f64, TransportError> {
        Ok(f64::from_bits(self.read_i64().await? as u64))
    }

    async fn read_len(&mut self) -> Result<usize, TransportError> {
        let len = self.read_i32().await?;
        if !(0..=MAX_DECODE_LEN).contains(&len) {
            return Err(TransportError::Protocol(format!(
                "invalid length {len} on the wire"
            )));
        }
        Ok(len as usize)
    }

    pub async fn read_binary(&mut self) -> Result<Vec<u8>, TransportError> {
        let len = self.read_len().await?;
        read_exact(self.transport, len).await
    }

    pub async fn read_string(&mut self) -> Result<String, TransportError> {
        let bytes = self.read_binary().await?;
        String::from_utf8(bytes)
            .map_err(|e| TransportError::Protocol(format!("invalid UTF-8 string: {e}")))
    }

    /// Read a message header, returning `(name, message_type, sequence)`.
    pub async fn message_begin(&mut self) -> Result<(String, u8, i32), TransportError> {
        let word = self.read_i32().await? as u32;
        if word & 0xffff_0000 != VERSION_1 {
            return Err(TransportError::Protocol(format!(
                "bad message version word {word:#010x}"
            )));
        }
        let message_type = (word & 0xff) as u8;
        let name = self.read_string().await?;
        let seq = self.read_i32().await?;
        Ok((name, message_type, seq))
    }

    /// Read a field header; `None` marks the struct's stop byte.
    pub async fn field_begin(&mut self) -> Result<Option<(u8, i16)>, TransportError> {
        let field_type = self.read_u8().await?;
        if field_type == ttype::STOP {
            return Ok(None);
        }
        let id = self.read_i16().await?;
        Ok(Some((field_type, id)))
    }

    pub async fn list_begin(&mut self) -> Result<(u8, usize), TransportError> {
        let elem_type = self.read_u8().await?;
        let len = self.read_len().await?;
        Ok((elem_type, len))
    }

    pub async fn map_begin(&mut self) -> Result<(u8, u8, usize), TransportError> {
        let key_type = self.read_u8().await?;
        let value_type = self.read_u8().await?;
        let len = self.read_len().await?;
        Ok((key_type, value_type, len))
    }

    /// Skip one value of the given wire type, recursively for containers.
    pub fn skip<'s>(
        &'s mut self,
        field_type: u8,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 's>> {
        Box::pin(async move {
            match field_type {
                ttype::BOOL | ttype::BYTE => {
                    self.read_u8().await?;
                }
                ttype::I16 => {
                    self.read_i16().await?;
                }
                ttype::I32 => {
                    self.read_i32().await?;
                }
                ttype::I64 | ttype::DOUBLE => {
                    self.read_i64().await?;
                }
                ttype::STRING => {
                    self.read_binary().await?;
                }
                ttype::STRUCT => {
                    while let Some((ft, _)) = self.field_begin().await? {
                        self.skip(ft).await?;
                    }
                }
                ttype::MAP => {
                    let (kt, vt, len) = self.map_begin().await?;
                    for _ in 0..len {
                        self.skip(kt).await?;
                        self.skip(vt).await?;
                    }
                }
                ttype::SET | ttype::LIST => {
                    let (et, len) = self.list_begin().await?;
                    for _ in 0..len {
                        self.skip(et).await?;
                    }
                }
                other => {
                    return Err(TransportError::Protocol(format!(
                        "cannot skip unknown wire type {other}"
                    )));
                }
            }
            Ok(())
        })
    }
}
