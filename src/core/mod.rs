//! # Core Protocol Components
//!
//! Low-level payload encoding and frame handling.
//!
//! ## Components
//! - **VarInt**: the variable-length signed integer scheme
//! - **ByteStream**: payload reader/writer with bit-packed booleans
//! - **Types**: composite reference and identity pairs
//! - **Frame**: 7-byte header framing and its `tokio_util` codec
//!
//! ## Wire Format
//! ```text
//! [Id(2)] [Length(3)] [Version(2)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Declared lengths above the configured maximum are rejected before allocation
//! - String bodies above 900 000 bytes are rejected without being read
//! - Every read is bounds-checked; malformed payloads surface as errors, never panics

pub mod bytestream;
pub mod frame;
pub mod types;
pub mod varint;
