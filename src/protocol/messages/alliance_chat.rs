//! Alliance chat: one client line in (14315), broadcast to the alliance (24312).

use std::time::SystemTime;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::core::bytestream::{ByteReader, ByteWriter};
use crate::core::types::LogicLong;
use crate::error::Result;
use crate::protocol::message::{ClientMessage, HandlerContext, ServerMessage};
use crate::protocol::messages::ids;
use crate::service::{AllianceStore, ChatMessage};
use crate::transport::session::ConnectionSession;

/// Stream entry type for a plain chat line.
const ENTRY_CHAT: i32 = 2;

#[derive(Debug, Clone, Default)]
pub struct AllianceChatMessage {
    pub content: String,
}

impl AllianceChatMessage {
    async fn handle(self, session: &mut ConnectionSession, ctx: &HandlerContext) -> Result<()> {
        let Ok(player) = session.require_player() else {
            debug!(conn_id = session.id(), "chat before login ignored");
            return Ok(());
        };
        let Some(membership) = player.alliance.as_ref() else {
            debug!(conn_id = session.id(), "chat without an alliance ignored");
            return Ok(());
        };
        if self.content.trim().is_empty() {
            return Ok(());
        }

        let alliance = membership.alliance;
        let entry = ctx
            .services
            .alliances
            .add_chat_message(alliance, player, &self.content)?;

        let delivered = ctx
            .directories
            .broadcast
            .broadcast(alliance, &AllianceChatServerMessage::new(entry))
            .await?;
        info!(
            conn_id = session.id(),
            alliance_low = alliance.low,
            delivered,
            "alliance chat relayed"
        );
        Ok(())
    }
}

impl ClientMessage for AllianceChatMessage {
    fn name(&self) -> &'static str {
        "AllianceChat"
    }

    fn decode(&mut self, payload: &[u8]) -> Result<()> {
        let mut reader = ByteReader::new(payload);
        self.content = reader.read_string_or_empty()?;
        Ok(())
    }

    fn process<'a>(
        self: Box<Self>,
        session: &'a mut ConnectionSession,
        ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { (*self).handle(session, ctx).await })
    }
}

/// One stored chat line as the alliance stream shows it.
#[derive(Debug, Clone)]
pub struct AllianceChatServerMessage {
    pub entry: ChatMessage,
}

impl AllianceChatServerMessage {
    pub fn new(entry: ChatMessage) -> Self {
        Self { entry }
    }
}

impl ServerMessage for AllianceChatServerMessage {
    fn id(&self) -> u16 {
        ids::ALLIANCE_CHAT_SERVER
    }

    fn encode(&self, writer: &mut ByteWriter) {
        let age = SystemTime::now()
            .duration_since(self.entry.sent_at)
            .map(|age| age.as_secs().min(i32::MAX as u64) as i32)
            .unwrap_or(0);

        writer.write_varint(ENTRY_CHAT);
        writer.write_logic_long(LogicLong::new(0, self.entry.id));
        writer.write_logic_long(self.entry.sender);
        writer.write_str(&self.entry.sender_name);
        writer.write_varint(self.entry.sender_role);
        writer.write_varint(age);
        writer.write_bool(false);
        writer.write_str(&self.entry.content);
    }
}
