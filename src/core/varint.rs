//! # VarInt
//!
//! The variable-length signed integer used throughout the game protocol.
//!
//! ## Wire Contract
//! ```text
//! byte:   [C | d6 d5 d4 d3 d2 d1 d0]
//!          C  = 1 when another byte follows
//!          d* = 7 payload bits, least-significant group first
//! ```
//! After the last group, if fewer than 32 bits were produced, the highest
//! produced bit (bit 6 of the final group) is copied into every remaining
//! high bit of the result. This is the only layout the crate speaks; there is
//! no negotiation and no fallback to other historical layouts.
//!
//! | groups | range                          |
//! |--------|--------------------------------|
//! | 1      | -64 ..= 63                     |
//! | 2      | -8 192 ..= 8 191               |
//! | 3      | -1 048 576 ..= 1 048 575       |
//! | 4      | -134 217 728 ..= 134 217 727   |
//! | 5      | everything else                |
//!
//! A fifth byte that still carries the continuation flag is rejected with
//! [`ProtocolError::VarIntNonTerminating`].

use crate::error::{ProtocolError, Result};

/// Maximum number of bytes a single VarInt may occupy.
pub const MAX_VARINT_LEN: usize = 5;

const PAYLOAD_MASK: u8 = 0x7F;
const CONTINUATION: u8 = 0x80;
const SIGN_BIT: u8 = 0x40;

/// Encode `value` into its minimal group sequence.
///
/// Returns the scratch array and the number of meaningful bytes in it.
pub fn encode(value: i32) -> ([u8; MAX_VARINT_LEN], usize) {
    let mut out = [0u8; MAX_VARINT_LEN];
    let mut remaining = value;
    let mut len = 0;

    loop {
        let group = (remaining & i32::from(PAYLOAD_MASK)) as u8;
        // arithmetic shift keeps the sign for the termination check below
        remaining >>= 7;

        let sign_set = group & SIGN_BIT != 0;
        let done = (remaining == 0 && !sign_set) || (remaining == -1 && sign_set);

        if done {
            out[len] = group;
            len += 1;
            return (out, len);
        }

        out[len] = group | CONTINUATION;
        len += 1;
    }
}

/// Number of bytes `value` occupies on the wire.
pub fn encoded_len(value: i32) -> usize {
    encode(value).1
}

/// Decode a VarInt from the front of `buf`.
///
/// Returns the value and the number of bytes consumed. Never reads past the
/// end of `buf`.
pub fn decode(buf: &[u8]) -> Result<(i32, usize)> {
    let mut result: u32 = 0;
    let mut shift: u32 = 0;

    for index in 0..MAX_VARINT_LEN {
        let byte = *buf.get(index).ok_or(ProtocolError::BufferUnderrun {
            requested: index + 1,
            available: buf.len(),
        })?;

        // bits past 32 in the fifth group fall off the top
        result |= u32::from(byte & PAYLOAD_MASK).wrapping_shl(shift);
        shift += 7;

        if byte & CONTINUATION == 0 {
            if shift < 32 && byte & SIGN_BIT != 0 {
                result |= u32::MAX << shift;
            }
            return Ok((result as i32, index + 1));
        }
    }

    Err(ProtocolError::VarIntNonTerminating)
}
