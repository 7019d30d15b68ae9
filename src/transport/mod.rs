//! # Transport Layer
//!
//! TCP serving, per-connection state and the shared online directories.
//!
//! ## Components
//! - **server**: listener, accept loop and per-connection read/dispatch loop
//! - **session**: connection lifecycle and the cloneable sending half
//! - **directory**: online registry and alliance broadcast directory

pub mod directory;
pub mod server;
pub mod session;

pub use directory::{BroadcastDirectory, OnlineIdentity, OnlineRegistry, SharedDirectories};
pub use server::FrameTransport;
pub use session::{ConnectionHandle, ConnectionId, ConnectionSession, SessionState};
