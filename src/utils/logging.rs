//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` formatter driven by [`LoggingConfig`].
//! `RUST_LOG` takes precedence over the configured level when it is set.

use std::sync::OnceLock;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let level = config.log_level.to_string().to_lowercase();
    let default_directive = format!("{level},{}={level}", env!("CARGO_CRATE_NAME"));
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_directive))
        .map_err(|e| ProtocolError::ConfigError(format!("Invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_target);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // another subscriber (e.g. a test harness) may already own the global slot
    if let Err(e) = installed {
        return Err(ProtocolError::ConfigError(format!(
            "Failed to install subscriber: {e}"
        )));
    }

    let _ = INIT.set(());
    info!(app = %config.app_name, level = %config.log_level, json = config.json_format, "logging initialized");
    Ok(())
}
