//! # Byte Stream
//!
//! Forward-only reader and growable writer for message payloads.
//!
//! ## Cursor Rules
//! - Consecutive booleans are packed into one byte, least-significant bit first.
//!   The first boolean of a run claims a fresh byte; the ninth starts another.
//! - Any non-boolean read or write ends the current boolean run first, so the
//!   next value always starts on a byte boundary.
//! - Integers are big-endian; VarInts follow [`crate::core::varint`].
//!
//! ## Strings
//! ```text
//! [length: i32 BE] [utf-8 bytes]
//!   length == -1  absent (None)
//!   length ==  0  empty string
//!   length  > 900 000 rejected before touching the body
//! ```
//!
//! A fresh reader or writer is created per packet; neither is reused across
//! independent payloads.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{error, trace};

use crate::config::MAX_STRING_LENGTH;
use crate::core::types::{DataRef, LogicLong, WireValue};
use crate::core::varint;
use crate::error::{ProtocolError, Result};

/// Default capacity for writers created with [`ByteWriter::new`].
pub const DEFAULT_WRITER_CAPACITY: usize = 128;

/// Wire length marking an absent string.
const ABSENT_STRING: i32 = -1;

/// The absent string, for messages that spell their unused string fields out.
pub const EMPTY_STRING: Option<&str> = None;

/// Bounds-checked payload reader. Never reads past the end of its slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
    bit_offset: u8,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            bit_offset: 0,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, requested: usize) -> Result<()> {
        if requested > self.remaining() {
            return Err(ProtocolError::BufferUnderrun {
                requested,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        if self.bit_offset == 0 {
            self.ensure(1)?;
            self.offset += 1;
        }

        let current = self.data[self.offset - 1];
        let value = (current >> self.bit_offset) & 1;
        self.bit_offset = (self.bit_offset + 1) & 7;

        Ok(value != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.bit_offset = 0;
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.bit_offset = 0;
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a length-prefixed string; `None` is the absent sentinel.
    ///
    /// Bodies that are not valid UTF-8 fail with
    /// [`ProtocolError::InvalidUtf8`] rather than being rewritten.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let length = self.read_i32()?;

        match length {
            ABSENT_STRING => Ok(None),
            0 => Ok(Some(String::new())),
            l if l < ABSENT_STRING => Err(ProtocolError::NegativeLength(l)),
            l if l as usize > MAX_STRING_LENGTH => Err(ProtocolError::StringTooLong(l)),
            l => {
                let bytes = self.take(l as usize)?;
                Ok(Some(std::str::from_utf8(bytes)?.to_owned()))
            }
        }
    }

    /// Like [`read_string`](Self::read_string) but folds absent into empty.
    pub fn read_string_or_empty(&mut self) -> Result<String> {
        Ok(self.read_string()?.unwrap_or_default())
    }

    pub fn read_varint(&mut self) -> Result<i32> {
        self.bit_offset = 0;
        let (value, used) = varint::decode(&self.data[self.offset..])?;
        self.offset += used;
        Ok(value)
    }

    pub fn read_data_ref(&mut self) -> Result<DataRef> {
        let class = self.read_varint()?;
        if class == 0 {
            return Ok(DataRef::NULL);
        }
        let instance = self.read_varint()?;
        Ok(DataRef::new(class, instance))
    }

    pub fn read_logic_long(&mut self) -> Result<LogicLong> {
        let high = self.read_varint()?;
        let low = self.read_varint()?;
        Ok(LogicLong::new(high, low))
    }

    /// Reads a VarInt count followed by that many VarInts.
    pub fn read_varint_array(&mut self) -> Result<Vec<i32>> {
        let count = self.read_varint()?;
        if count < 0 {
            return Err(ProtocolError::NegativeLength(count));
        }

        // every element needs at least one byte
        let count = count as usize;
        self.ensure(count)?;

        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_varint()?);
        }
        Ok(values)
    }
}

/// Growable payload writer. Writes never fail on capacity.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    buffer: BytesMut,
    bit_offset: u8,
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WRITER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            bit_offset: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the encoded payload.
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Alias of [`into_bytes`](Self::into_bytes).
    pub fn freeze(self) -> Bytes {
        self.into_bytes()
    }

    pub fn write_bool(&mut self, value: bool) {
        if self.bit_offset == 0 {
            self.buffer.put_u8(0);
        }

        let last = self.buffer.len() - 1;
        if value {
            self.buffer[last] |= 1 << self.bit_offset;
        } else {
            self.buffer[last] &= !(1 << self.bit_offset);
        }

        self.bit_offset = (self.bit_offset + 1) & 7;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bit_offset = 0;
        self.buffer.put_u8(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bit_offset = 0;
        self.buffer.put_i32(value);
    }

    /// Writes a string; `None` writes the absent sentinel.
    ///
    /// Strings longer than the protocol maximum are logged and written as
    /// absent so the surrounding payload stays well-formed.
    pub fn write_string(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            self.write_i32(ABSENT_STRING);
            return;
        };

        if value.len() > MAX_STRING_LENGTH {
            error!(len = value.len(), "refusing to write oversized string");
            self.write_i32(ABSENT_STRING);
            return;
        }

        self.write_i32(value.len() as i32);
        self.buffer.put_slice(value.as_bytes());
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_string(Some(value));
    }

    pub fn write_varint(&mut self, value: i32) {
        self.bit_offset = 0;
        let (bytes, len) = varint::encode(value);
        self.buffer.put_slice(&bytes[..len]);
    }

    pub fn write_data_ref(&mut self, value: DataRef) {
        self.write_varint(value.class);
        if value.class != 0 {
            self.write_varint(value.instance);
        }
    }

    pub fn write_logic_long(&mut self, value: LogicLong) {
        self.write_varint(value.high);
        self.write_varint(value.low);
    }

    pub fn write_varint_array(&mut self, values: &[i32]) {
        self.write_varint(values.len() as i32);
        for &value in values {
            self.write_varint(value);
        }
    }

    /// Route a [`WireValue`] to its specific writer.
    pub fn write_value(&mut self, value: &WireValue) {
        trace!(?value, "write_value");
        match value {
            WireValue::Int(v) => self.write_i32(*v),
            WireValue::VarInt(v) => self.write_varint(*v),
            WireValue::Bool(v) => self.write_bool(*v),
            WireValue::Str(v) => self.write_string(v.as_deref()),
            WireValue::Ref(v) => self.write_data_ref(*v),
            WireValue::Long(v) => self.write_logic_long(*v),
            WireValue::VarIntArray(v) => self.write_varint_array(v),
            WireValue::Byte(v) => self.write_u8(*v),
        }
    }

    /// Write each value in order.
    pub fn write_values<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = WireValue>,
    {
        for value in values {
            self.write_value(&value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_packing_shares_a_byte() {
        let mut writer = ByteWriter::new();
        for bit in [true, false, true, true] {
            writer.write_bool(bit);
        }
        assert_eq!(writer.as_slice(), &[0b0000_1101]);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert!(reader.read_bool().unwrap());
        assert!(!reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn test_ninth_bool_rolls_over() {
        let mut writer = ByteWriter::new();
        for _ in 0..9 {
            writer.write_bool(true);
        }
        assert_eq!(writer.as_slice(), &[0xFF, 0x01]);
    }

    #[test]
    fn test_non_bool_write_resets_bit_cursor() {
        let mut writer = ByteWriter::new();
        writer.write_bool(true);
        writer.write_i32(7);
        writer.write_bool(true);
        assert_eq!(writer.as_slice(), &[0x01, 0, 0, 0, 7, 0x01]);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_i32().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_absent_and_empty_strings_differ_on_wire() {
        let mut absent = ByteWriter::new();
        absent.write_string(None);
        let mut empty = ByteWriter::new();
        empty.write_str("");

        assert_eq!(absent.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(empty.as_slice(), &[0, 0, 0, 0]);

        assert_eq!(ByteReader::new(absent.as_slice()).read_string().unwrap(), None);
        assert_eq!(
            ByteReader::new(empty.as_slice()).read_string().unwrap(),
            Some(String::new())
        );
    }

    #[test]
    fn test_string_too_long_consumes_only_length() {
        let mut bytes = (MAX_STRING_LENGTH as i32 + 1).to_be_bytes().to_vec();
        bytes.extend_from_slice(b"tail");
        let mut reader = ByteReader::new(&bytes);

        assert!(matches!(
            reader.read_string(),
            Err(ProtocolError::StringTooLong(900_001))
        ));
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_negative_string_length_rejected() {
        let bytes = (-2i32).to_be_bytes();
        assert!(matches!(
            ByteReader::new(&bytes).read_string(),
            Err(ProtocolError::NegativeLength(-2))
        ));
    }

    #[test]
    fn test_oversized_string_written_as_absent() {
        let huge = "x".repeat(MAX_STRING_LENGTH + 1);
        let mut writer = ByteWriter::new();
        writer.write_str(&huge);
        assert_eq!(writer.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_null_data_ref_short_form() {
        let mut writer = ByteWriter::new();
        writer.write_data_ref(DataRef::new(0, 99));
        writer.write_data_ref(DataRef::new(16, 3));
        assert_eq!(writer.as_slice(), &[0x00, 0x10, 0x03]);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_data_ref().unwrap(), DataRef::NULL);
        assert_eq!(reader.read_data_ref().unwrap(), DataRef::new(16, 3));
    }

    #[test]
    fn test_underrun_reports_sizes() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        match reader.read_i32() {
            Err(ProtocolError::BufferUnderrun {
                requested,
                available,
            }) => assert_eq!((requested, available), (4, 3)),
            other => panic!("unexpected: {other:?}"),
        }
        // a failed read does not move the cursor
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_varint_array_count_guard() {
        // claims 50 elements but carries one byte
        let mut reader = ByteReader::new(&[0xB2, 0x00, 0x01]);
        assert!(matches!(
            reader.read_varint_array(),
            Err(ProtocolError::BufferUnderrun { .. })
        ));
    }

    #[test]
    fn test_write_value_dispatch() {
        let mut writer = ByteWriter::with_capacity(4);
        writer.write_values([
            WireValue::Int(1),
            WireValue::VarInt(-1),
            WireValue::Bool(true),
            WireValue::Str(None),
            WireValue::Ref(DataRef::new(15, 7)),
            WireValue::Long(LogicLong::new(0, 2)),
            WireValue::VarIntArray(vec![1, 2]),
            WireValue::Byte(9),
        ]);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_i32().unwrap(), 1);
        assert_eq!(reader.read_varint().unwrap(), -1);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_string().unwrap(), None);
        assert_eq!(reader.read_data_ref().unwrap(), DataRef::new(15, 7));
        assert_eq!(reader.read_logic_long().unwrap(), LogicLong::new(0, 2));
        assert_eq!(reader.read_varint_array().unwrap(), vec![1, 2]);
        assert_eq!(reader.read_u8().unwrap(), 9);
        assert!(reader.is_empty());
    }
}
