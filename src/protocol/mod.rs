//! # Protocol Layer
//!
//! Typed messages and the id-based routing that turns frames into them.
//!
//! ## Components
//! - **message**: `ClientMessage` / `ServerMessage` traits and the handler context
//! - **messages**: the stock message set
//! - **registry**: packet id to constructor table

pub mod message;
pub mod messages;
pub mod registry;

#[cfg(test)]
mod tests;

pub use message::{ClientMessage, HandlerContext, ServerMessage};
pub use registry::HandlerRegistry;
