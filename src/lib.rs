//! # Arena Protocol
//!
//! Wire-protocol core for a game backend that speaks to unmodified mobile
//! clients over TCP.
//!
//! ## Layers
//! - **core**: payload reader/writer, VarInt scheme, frame header and codec
//! - **utils**: stream cipher, logging setup, metrics
//! - **protocol**: message traits, stock messages, id routing
//! - **transport**: accept loop, connection sessions, shared directories
//! - **service**: collaborator traits, in-memory stores, event rotation
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use arena_protocol::config::ArenaConfig;
//! use arena_protocol::protocol::{HandlerContext, HandlerRegistry};
//! use arena_protocol::service::memory::StaticContent;
//! use arena_protocol::service::{Collaborators, EventRotation};
//! use arena_protocol::transport::{FrameTransport, SharedDirectories};
//! use arena_protocol::utils::Metrics;
//!
//! # async fn run() -> arena_protocol::Result<()> {
//! let config = ArenaConfig::default();
//! let content = Arc::new(StaticContent::with_defaults());
//! let events = Arc::new(EventRotation::new(config.events.slots.clone(), content.clone())?);
//! let ctx = HandlerContext::new(
//!     Collaborators::in_memory(content, events),
//!     SharedDirectories::new(),
//!     Arc::new(Metrics::new()),
//! );
//! let registry = Arc::new(HandlerRegistry::with_defaults()?);
//! let transport = FrameTransport::bind(&config.server, &config.cipher, registry, ctx).await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! transport.serve(shutdown_rx).await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
