//! Arena server entry point.
//!
//! Usage: `arena-server [config.toml]`. Without a path the defaults are used,
//! overridden by `ARENA_*` environment variables.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use arena_protocol::config::ArenaConfig;
use arena_protocol::protocol::{HandlerContext, HandlerRegistry};
use arena_protocol::service::memory::StaticContent;
use arena_protocol::service::{Collaborators, EventRotation};
use arena_protocol::transport::{FrameTransport, SharedDirectories};
use arena_protocol::utils::logging::init_logging;
use arena_protocol::utils::Metrics;

fn load_config() -> arena_protocol::Result<ArenaConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let mut config = ArenaConfig::from_file(&path)?;
            config.apply_env();
            Ok(config)
        }
        None => ArenaConfig::from_env(),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "server exited with error");
        eprintln!("arena-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> arena_protocol::Result<()> {
    let config = load_config()?;
    config.validate_strict()?;
    init_logging(&config.logging)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let content = Arc::new(StaticContent::with_defaults());
    let events = Arc::new(EventRotation::new(config.events.slots.clone(), content.clone())?);
    let rotation_tasks = events.spawn(shutdown_rx.clone());

    let ctx = HandlerContext::new(
        Collaborators::in_memory(content, events),
        SharedDirectories::new(),
        Arc::new(Metrics::new()),
    );
    let registry = Arc::new(HandlerRegistry::with_defaults()?);
    let transport = FrameTransport::bind(&config.server, &config.cipher, registry, ctx).await?;

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    transport.serve(shutdown_rx).await?;

    for task in rotation_tasks {
        let _ = task.await;
    }
    info!("Server stopped");
    Ok(())
}
