use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{ProtocolError, Result};
use crate::protocol::message::ClientMessage;
use crate::protocol::messages::{
    ids, AllianceChatMessage, ChangeAvatarNameMessage, GoHomeFromOfflineMessage,
    KeepAliveMessage, LoginMessage,
};

/// Builds an empty message ready for `decode`.
pub type MessageFactory = fn() -> Box<dyn ClientMessage>;

/// Factory for any message with an empty default state.
pub fn factory<M: ClientMessage + Default>() -> Box<dyn ClientMessage> {
    Box::new(M::default())
}

/// Packet id to message constructor routing.
/// Populated once at startup, then only read by connection tasks.
pub struct HandlerRegistry {
    factories: RwLock<HashMap<u16, MessageFactory>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every stock client message wired in.
    pub fn with_defaults() -> Result<Self> {
        let registry = Self::new();
        registry.register(ids::LOGIN, factory::<LoginMessage>)?;
        registry.register(ids::KEEP_ALIVE, factory::<KeepAliveMessage>)?;
        registry.register(ids::CHANGE_AVATAR_NAME, factory::<ChangeAvatarNameMessage>)?;
        registry.register(ids::GO_HOME_FROM_OFFLINE, factory::<GoHomeFromOfflineMessage>)?;
        registry.register(ids::ALLIANCE_CHAT, factory::<AllianceChatMessage>)?;
        Ok(registry)
    }

    /// Register or replace the constructor for `packet_id`.
    pub fn register(&self, packet_id: u16, factory: MessageFactory) -> Result<()> {
        let mut factories = self.factories.write().map_err(|_| {
            ProtocolError::Custom("Failed to acquire write lock on handler registry".to_string())
        })?;

        factories.insert(packet_id, factory);
        Ok(())
    }

    /// A fresh message for `packet_id`, or `UnknownPacketId`.
    pub fn create(&self, packet_id: u16) -> Result<Box<dyn ClientMessage>> {
        let factories = self.factories.read().map_err(|_| {
            ProtocolError::Custom("Failed to acquire read lock on handler registry".to_string())
        })?;

        factories
            .get(&packet_id)
            .map(|factory| factory())
            .ok_or(ProtocolError::UnknownPacketId(packet_id))
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.factories
            .read()
            .map(|factories| factories.contains_key(&packet_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.factories.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
