//! Message traits shared by every inbound and outbound packet type.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::core::bytestream::ByteWriter;
use crate::error::Result;
use crate::service::Collaborators;
use crate::transport::directory::SharedDirectories;
use crate::transport::session::ConnectionSession;
use crate::utils::metrics::Metrics;

/// Everything a handler may touch besides its own session.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub services: Collaborators,
    pub directories: SharedDirectories,
    pub metrics: Arc<Metrics>,
}

impl HandlerContext {
    pub fn new(services: Collaborators, directories: SharedDirectories, metrics: Arc<Metrics>) -> Self {
        Self {
            services,
            directories,
            metrics,
        }
    }
}

/// A packet the client sends. Instances are created fresh for every frame.
pub trait ClientMessage: Send + 'static {
    fn name(&self) -> &'static str;

    /// Fill fields from a decrypted payload.
    fn decode(&mut self, payload: &[u8]) -> Result<()>;

    /// Whether receiving this message moves a fresh connection into authentication.
    fn starts_login(&self) -> bool {
        false
    }

    fn process<'a>(
        self: Box<Self>,
        session: &'a mut ConnectionSession,
        ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<()>>;
}

/// A packet the server sends.
pub trait ServerMessage: Send + Sync {
    fn id(&self) -> u16;

    fn version(&self) -> u16 {
        1
    }

    fn encode(&self, writer: &mut ByteWriter);

    /// Encode into a fresh payload buffer.
    fn to_payload(&self) -> Bytes {
        let mut writer = ByteWriter::new();
        self.encode(&mut writer);
        writer.into_bytes()
    }
}
