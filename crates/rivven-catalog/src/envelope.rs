//! Schema id envelope
//!
//! Records carrying a schema identity are prefixed with a marker byte followed
//! by the id in big-endian order:
//!
//! ```text
//! legacy:  [0x00][id: 4 bytes][payload]
//! default: [0x00][id: 8 bytes][payload]
//! ```
//!
//! A record whose first byte is not the marker has no envelope; that is not an
//! error. The payload itself is handled by injected [`PayloadDecoder`] /
//! [`PayloadEncoder`] implementations.

use crate::config::IdEncoding;
use crate::types::SchemaId;
use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Marker byte opening an envelope
pub const MAGIC_BYTE: u8 = 0x00;

/// Worst-case envelope length: marker plus the widest id
pub const MAX_ENVELOPE_LEN: usize = 1 + 8;

/// Errors produced while decoding or encoding enveloped records
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Record has no schema id envelope")]
    MissingEnvelope,

    #[error("Payload encoder produced no bytes")]
    EmptyPayload,

    #[error("Payload codec error: {0}")]
    Payload(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Destination for produced bytes
pub trait ValueSink {
    fn accept(&mut self, bytes: &[u8]);
}

impl ValueSink for Vec<u8> {
    fn accept(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl ValueSink for BytesMut {
    fn accept(&mut self, bytes: &[u8]) {
        self.put_slice(bytes);
    }
}

/// Identity of the record handed to payload codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadContext {
    pub trace_id: u64,
    pub stream_id: u64,
    pub schema_id: SchemaId,
}

/// Decodes the payload following an envelope
///
/// Returns the number of bytes written to `sink`.
pub trait PayloadDecoder: Send + Sync {
    fn decode(
        &self,
        ctx: PayloadContext,
        payload: &[u8],
        sink: &mut dyn ValueSink,
    ) -> CodecResult<usize>;
}

impl<F> PayloadDecoder for F
where
    F: Fn(PayloadContext, &[u8], &mut dyn ValueSink) -> CodecResult<usize> + Send + Sync,
{
    fn decode(
        &self,
        ctx: PayloadContext,
        payload: &[u8],
        sink: &mut dyn ValueSink,
    ) -> CodecResult<usize> {
        self(ctx, payload, sink)
    }
}

/// Encodes a payload to follow an envelope
///
/// Returns the number of bytes written to `sink`; zero is treated as failure.
pub trait PayloadEncoder: Send + Sync {
    fn encode(
        &self,
        ctx: PayloadContext,
        value: &[u8],
        sink: &mut dyn ValueSink,
    ) -> CodecResult<usize>;
}

impl<F> PayloadEncoder for F
where
    F: Fn(PayloadContext, &[u8], &mut dyn ValueSink) -> CodecResult<usize> + Send + Sync,
{
    fn encode(
        &self,
        ctx: PayloadContext,
        value: &[u8],
        sink: &mut dyn ValueSink,
    ) -> CodecResult<usize> {
        self(ctx, value, sink)
    }
}

/// Passes the payload through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl PayloadDecoder for PassThrough {
    fn decode(
        &self,
        _ctx: PayloadContext,
        payload: &[u8],
        sink: &mut dyn ValueSink,
    ) -> CodecResult<usize> {
        sink.accept(payload);
        Ok(payload.len())
    }
}

impl PayloadEncoder for PassThrough {
    fn encode(
        &self,
        _ctx: PayloadContext,
        value: &[u8],
        sink: &mut dyn ValueSink,
    ) -> CodecResult<usize> {
        sink.accept(value);
        Ok(value.len())
    }
}

/// Id width strategy, fixed at construction
#[derive(Clone, Copy)]
pub struct IdCodec {
    width: usize,
    read: fn(&[u8]) -> u32,
    write: fn(SchemaId, &mut [u8]),
}

impl std::fmt::Debug for IdCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdCodec").field("width", &self.width).finish()
    }
}

impl IdCodec {
    pub fn new(encoding: IdEncoding) -> Self {
        match encoding {
            IdEncoding::Legacy => Self::legacy(),
            IdEncoding::Default => Self::wide(),
        }
    }

    /// 4-byte ids
    pub fn legacy() -> Self {
        Self {
            width: 4,
            read: read_legacy_id,
            write: write_legacy_id,
        }
    }

    /// 8-byte ids, truncated to 32 bits when read
    pub fn wide() -> Self {
        Self {
            width: 8,
            read: read_wide_id,
            write: write_wide_id,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Envelope length for this width
    pub fn envelope_len(&self) -> usize {
        1 + self.width
    }

    /// Read the envelope id, if `data` starts with a complete envelope
    pub fn resolve_id(&self, data: &[u8]) -> Option<SchemaId> {
        self.split(data).0
    }

    /// Split an enveloped record into its id and payload
    ///
    /// Without an envelope the id is `None` and the whole input is returned.
    pub fn split<'a>(&self, data: &'a [u8]) -> (Option<SchemaId>, &'a [u8]) {
        match data.split_first() {
            Some((&MAGIC_BYTE, rest)) if rest.len() >= self.width => {
                let (id, payload) = rest.split_at(self.width);
                (Some(SchemaId((self.read)(id))), payload)
            }
            _ => (None, data),
        }
    }

    /// Write the envelope for `id` into `buf`, returning the written prefix
    pub fn write<'a>(&self, id: SchemaId, buf: &'a mut [u8; MAX_ENVELOPE_LEN]) -> &'a [u8] {
        buf[0] = MAGIC_BYTE;
        (self.write)(id, &mut buf[1..1 + self.width]);
        &buf[..self.envelope_len()]
    }

    /// Decode an enveloped record through `decoder`
    pub fn decode(
        &self,
        trace_id: u64,
        stream_id: u64,
        data: &[u8],
        sink: &mut dyn ValueSink,
        decoder: &dyn PayloadDecoder,
    ) -> CodecResult<usize> {
        let (schema_id, payload) = self.split(data);
        let schema_id = schema_id.ok_or(CodecError::MissingEnvelope)?;
        let ctx = PayloadContext {
            trace_id,
            stream_id,
            schema_id,
        };
        decoder.decode(ctx, payload, sink)
    }

    /// Envelope `value` for `schema_id` and encode it through `encoder`
    ///
    /// The payload is staged in a scratch buffer, so `sink` is left untouched
    /// when the encoder fails or produces nothing.
    pub fn encode(
        &self,
        trace_id: u64,
        stream_id: u64,
        schema_id: SchemaId,
        value: &[u8],
        sink: &mut dyn ValueSink,
        encoder: &dyn PayloadEncoder,
    ) -> CodecResult<usize> {
        let ctx = PayloadContext {
            trace_id,
            stream_id,
            schema_id,
        };
        let mut payload = BytesMut::with_capacity(value.len());
        let len = match encoder.encode(ctx, value, &mut payload)? {
            0 => return Err(CodecError::EmptyPayload),
            len => len,
        };

        let mut buf = [0u8; MAX_ENVELOPE_LEN];
        let prefix = self.write(schema_id, &mut buf);
        sink.accept(prefix);
        sink.accept(&payload);
        Ok(prefix.len() + len)
    }
}

fn read_legacy_id(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn write_legacy_id(id: SchemaId, bytes: &mut [u8]) {
    bytes.copy_from_slice(&id.0.to_be_bytes());
}

fn read_wide_id(bytes: &[u8]) -> u32 {
    let mut wide = [0u8; 8];
    wide.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(wide) as u32
}

fn write_wide_id(id: SchemaId, bytes: &mut [u8]) {
    bytes.copy_from_slice(&u64::from(id.0).to_be_bytes());
}
