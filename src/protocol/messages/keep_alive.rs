use futures::future::BoxFuture;
use tracing::trace;

use crate::core::bytestream::ByteWriter;
use crate::error::Result;
use crate::protocol::message::{ClientMessage, HandlerContext, ServerMessage};
use crate::protocol::messages::ids;
use crate::transport::session::ConnectionSession;

/// Client heartbeat. Carries no fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAliveMessage;

impl ClientMessage for KeepAliveMessage {
    fn name(&self) -> &'static str {
        "KeepAlive"
    }

    fn decode(&mut self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    fn process<'a>(
        self: Box<Self>,
        session: &'a mut ConnectionSession,
        _ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            trace!(conn_id = session.id(), "keep alive");
            session.send(&KeepAliveOkMessage).await;
            Ok(())
        })
    }
}

/// Heartbeat acknowledgement with an empty payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAliveOkMessage;

impl ServerMessage for KeepAliveOkMessage {
    fn id(&self) -> u16 {
        ids::KEEP_ALIVE_OK
    }

    fn encode(&self, _writer: &mut ByteWriter) {}
}
