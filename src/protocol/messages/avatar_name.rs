//! Avatar rename (10212) and the server command that confirms it (24111).

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::core::bytestream::{ByteReader, ByteWriter};
use crate::error::Result;
use crate::protocol::message::{ClientMessage, HandlerContext, ServerMessage};
use crate::protocol::messages::ids;
use crate::service::PlayerStore;
use crate::transport::session::ConnectionSession;

/// Longest name accepted, in characters.
pub const MAX_NAME_CHARS: usize = 20;

/// Commands the server can push through AvailableServerCommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    ChangeAvatarName { name: String },
}

impl ServerCommand {
    pub fn id(&self) -> i32 {
        match self {
            ServerCommand::ChangeAvatarName { .. } => 201,
        }
    }

    pub fn encode(&self, writer: &mut ByteWriter) {
        match self {
            ServerCommand::ChangeAvatarName { name } => {
                writer.write_varint(self.id());
                writer.write_str(name);
                writer.write_u8(0);

                // command tick header
                writer.write_varint(1);
                writer.write_varint(0);
                writer.write_varint(0);
                writer.write_varint(0);
                writer.write_varint(1);
            }
        }
    }
}

/// 24111: wraps one [`ServerCommand`].
#[derive(Debug, Clone)]
pub struct AvailableServerCommandMessage {
    pub command: ServerCommand,
}

impl AvailableServerCommandMessage {
    pub fn new(command: ServerCommand) -> Self {
        Self { command }
    }
}

impl ServerMessage for AvailableServerCommandMessage {
    fn id(&self) -> u16 {
        ids::AVAILABLE_SERVER_COMMAND
    }

    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_varint(self.command.id());
        self.command.encode(writer);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeAvatarNameMessage {
    pub name: String,
}

impl ChangeAvatarNameMessage {
    async fn handle(self, session: &mut ConnectionSession, ctx: &HandlerContext) -> Result<()> {
        let Ok(player) = session.require_player() else {
            debug!(conn_id = session.id(), "rename before login ignored");
            return Ok(());
        };
        let id = player.id;
        let old_name = player.name.clone();

        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
            warn!(conn_id = session.id(), len = name.len(), "rejected avatar name");
            return Ok(());
        }

        ctx.services.players.rename(id, name)?;
        if let Some(player) = session.player_mut() {
            player.name = name.to_string();
            player.name_set = true;
        }
        info!(conn_id = session.id(), from = %old_name, to = %name, "avatar renamed");

        let reply = AvailableServerCommandMessage::new(ServerCommand::ChangeAvatarName {
            name: name.to_string(),
        });
        session.send(&reply).await;
        Ok(())
    }
}

impl ClientMessage for ChangeAvatarNameMessage {
    fn name(&self) -> &'static str {
        "ChangeAvatarName"
    }

    fn decode(&mut self, payload: &[u8]) -> Result<()> {
        let mut reader = ByteReader::new(payload);
        self.name = reader.read_string_or_empty()?;
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
