//! # Error Types
//!
//! Error handling for the arena wire protocol.
//!
//! This module defines every error variant that can surface while decoding
//! frames, running the stream cipher, or driving a client connection.
//!
//! ## Error Categories
//! - **Codec Errors**: buffer underruns, string bound violations, invalid UTF-8,
//!   malformed VarInts
//! - **Framing Errors**: malformed headers and declared lengths the transport refuses
//! - **Routing Errors**: packet ids with no registered handler
//! - **Session Errors**: duplicate logins, collaborator failures, closed connections
//! - **Programmer Errors**: cipher misuse, which network input alone never triggers
//!
//! Codec-level errors are returned to the immediate caller. The transport ends
//! only the offending connection; the listener and sibling connections never
//! observe them.
//!
//! ## Example Usage
//! ```rust
//! use arena_protocol::core::bytestream::ByteReader;
//! use arena_protocol::error::ProtocolError;
//!
//! let mut reader = ByteReader::new(&[0x00, 0x01]);
//! match reader.read_i32() {
//!     Err(ProtocolError::BufferUnderrun { requested, available }) => {
//!         assert_eq!((requested, available), (4, 2));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Directory-related error messages
    pub const ERR_ONLINE_REGISTRY_LOCK: &str = "Failed to acquire online registry lock";
    pub const ERR_DIRECTORY_WRITE_LOCK: &str = "Failed to acquire write lock on broadcast directory";
    pub const ERR_DIRECTORY_READ_LOCK: &str = "Failed to acquire read lock on broadcast directory";
    pub const ERR_EVENT_LOCK: &str = "Failed to acquire event rotation lock";

    /// Collaborator errors
    pub const ERR_PLAYER_STORE_LOCK: &str = "Failed to acquire player store lock";
    pub const ERR_ALLIANCE_STORE_LOCK: &str = "Failed to acquire alliance store lock";
    pub const ERR_TEAM_REGISTRY_LOCK: &str = "Failed to acquire team registry lock";

    /// Framing errors
    pub const ERR_OVERSIZED_FRAME: &str = "Declared payload length exceeds the configured maximum";
    pub const ERR_TRUNCATED_HEADER: &str = "Frame header is shorter than 7 bytes";

    /// Cipher errors
    pub const ERR_EMPTY_SEED: &str = "Cipher seed must not be empty";

    /// Session errors
    pub const ERR_SESSION_CLOSED: &str = "Session is already closed";
    pub const ERR_NOT_LOGGED_IN: &str = "Session has no established player";
}

/// ProtocolError is the primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Buffer underrun: requested {requested} bytes, {available} available")]
    BufferUnderrun { requested: usize, available: usize },

    #[error("String too long: {0} bytes")]
    StringTooLong(i32),

    #[error("String has negative length: {0}")]
    NegativeLength(i32),

    #[error("VarInt did not terminate within 5 bytes")]
    VarIntNonTerminating,

    #[error("String is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("No handler registered for packet id {0}")]
    UnknownPacketId(u16),

    #[error("Cipher misuse: {0}")]
    CipherMisuse(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Identity is already logged in")]
    AlreadyOnline,

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error came from decoding untrusted bytes rather than from I/O.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::BufferUnderrun { .. }
                | ProtocolError::StringTooLong(_)
                | ProtocolError::NegativeLength(_)
                | ProtocolError::VarIntNonTerminating
                | ProtocolError::InvalidUtf8(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
