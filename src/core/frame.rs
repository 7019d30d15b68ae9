//! # Frames
//!
//! One discrete protocol message on the wire: a fixed 7-byte header followed
//! by a cipher-processed payload.
//!
//! ```text
//! [packet id: u16 BE] [payload length: u24 BE] [version: u16 BE] [payload]
//! ```
//!
//! [`FrameCodec`] plugs the layout into `tokio_util`'s framing so the read
//! loop only ever sees complete frames: a header declaring `L` bytes is held
//! back until all `L` payload bytes have arrived.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::{HEADER_LEN, MAX_FRAME_PAYLOAD};
use crate::error::{constants, ProtocolError, Result};

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u16,
    pub length: u32,
    pub version: u16,
}

impl FrameHeader {
    pub fn new(id: u16, length: usize, version: u16) -> Result<Self> {
        if length > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::Framing(format!(
                "payload of {length} bytes does not fit a 24-bit length"
            )));
        }
        Ok(Self {
            id,
            length: length as u32,
            version,
        })
    }

    /// Parse the first [`HEADER_LEN`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Framing(
                constants::ERR_TRUNCATED_HEADER.to_string(),
            ));
        }

        let id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let length = u32::from_be_bytes([0, bytes[2], bytes[3], bytes[4]]);
        let version = u16::from_be_bytes([bytes[5], bytes[6]]);

        Ok(Self {
            id,
            length,
            version,
        })
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u16(self.id);
        dst.put_uint(u64::from(self.length), 3);
        dst.put_u16(self.version);
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let len = self.length.to_be_bytes();
        let id = self.id.to_be_bytes();
        let version = self.version.to_be_bytes();
        [id[0], id[1], len[1], len[2], len[3], version[0], version[1]]
    }
}

/// A complete frame. The payload is whatever sits on the wire, so it is
/// ciphertext until the connection's inbound cipher has processed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u16,
    pub version: u16,
    pub payload: BytesMut,
}

impl Frame {
    pub fn new(id: u16, version: u16, payload: impl Into<BytesMut>) -> Self {
        Self {
            id,
            version,
            payload: payload.into(),
        }
    }

    pub fn header(&self) -> Result<FrameHeader> {
        FrameHeader::new(self.id, self.payload.len(), self.version)
    }

    /// Serialize header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let header = self.header()?;
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        header.write_to(&mut out);
        out.put_slice(&self.payload);
        Ok(out.freeze())
    }
}

/// `tokio_util` codec for the 7-byte-header frame format.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_payload: MAX_FRAME_PAYLOAD,
        }
    }
}

impl FrameCodec {
    /// Codec rejecting declared lengths above `max_payload`.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_FRAME_PAYLOAD),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = FrameHeader::parse(&src[..HEADER_LEN])?;
        let length = header.length as usize;

        if length > self.max_payload {
            return Err(ProtocolError::Framing(format!(
                "{} ({length} > {})",
                constants::ERR_OVERSIZED_FRAME,
                self.max_payload
            )));
        }

        if src.len() < HEADER_LEN + length {
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length);
        trace!(id = header.id, len = length, "frame decoded");

        Ok(Some(Frame {
            id: header.id,
            version: header.version,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let header = frame.header()?;
        dst.reserve(HEADER_LEN + frame.payload.len());
        header.write_to(dst);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
