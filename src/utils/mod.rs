//! # Utility Modules
//!
//! Supporting utilities for the cipher, logging and metrics.
//!
//! ## Components
//! - **Cipher**: the per-direction keystream cipher the game client expects
//! - **Logging**: `tracing-subscriber` setup driven by configuration
//! - **Metrics**: lock-free transport counters

pub mod cipher;
pub mod logging;
pub mod metrics;

pub use cipher::{CipherPair, StreamCipher};
pub use metrics::{Metrics, MetricsSnapshot};
