//! # Service Layer
//!
//! Narrow collaborator interfaces the message handlers call into.
//!
//! ## Collaborators
//! - **PlayerStore**: player records keyed by login token
//! - **AllianceStore**: alliance chat history
//! - **EventService**: the currently running event per slot
//! - **TeamRegistry**: team lobby membership and presence
//! - **ContentLookup**: read-only game content tables
//!
//! Persistence, content loading and game rules live behind these traits.
//! Errors a collaborator returns are local to the packet that triggered the
//! call; the connection stays open.

pub mod memory;
pub mod rotation;

use std::sync::Arc;
use std::time::SystemTime;

use crate::core::types::LogicLong;
use crate::error::Result;
use crate::transport::session::ConnectionId;

pub use rotation::{ActiveEvent, EventConfig, EventRotation, EventSlotSchedule};

/// A player's membership in an alliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllianceMembership {
    pub alliance: LogicLong,
    pub role: i32,
}

/// Player record as the handlers see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: LogicLong,
    pub token: String,
    pub name: String,
    pub name_set: bool,
    pub region: String,
    pub trophies: i32,
    pub alliance: Option<AllianceMembership>,
    pub team_id: Option<i32>,
}

impl Player {
    /// Fresh record for a token the store has never seen.
    pub fn new(id: LogicLong, token: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            id,
            token: token.into(),
            name: String::from("Undefined"),
            name_set: false,
            region: region.into(),
            trophies: 0,
            alliance: None,
            team_id: None,
        }
    }
}

/// A stored alliance chat line.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: i32,
    pub sender: LogicLong,
    pub sender_name: String,
    pub sender_role: i32,
    pub content: String,
    pub sent_at: SystemTime,
}

/// Snapshot of one team lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamStatus {
    pub team_id: i32,
    pub members: usize,
    pub online: usize,
}

pub trait PlayerStore: Send + Sync {
    fn load_by_token(&self, token: &str) -> Result<Option<Player>>;

    /// Create a player; `requested` is the id the client claims, honoured when free.
    fn create_player(&self, requested: LogicLong, token: &str, region: &str) -> Result<Player>;

    fn touch_login(&self, id: LogicLong) -> Result<()>;

    fn rename(&self, id: LogicLong, name: &str) -> Result<()>;
}

pub trait AllianceStore: Send + Sync {
    /// Persist a chat line and return it with its assigned id.
    fn add_chat_message(&self, alliance: LogicLong, sender: &Player, text: &str)
        -> Result<ChatMessage>;
}

pub trait EventService: Send + Sync {
    fn slot_count(&self) -> usize;

    fn current_event(&self, slot: usize) -> Option<ActiveEvent>;
}

pub trait TeamRegistry: Send + Sync {
    /// Seat `player` on `team`, or open a new team when `None`. A player who
    /// already holds a seat there takes it over with the new connection.
    fn join(&self, conn: ConnectionId, player: LogicLong, team: Option<i32>) -> Result<TeamStatus>;

    /// Leave whatever team the connection is in; returns what remains of it.
    fn leave(&self, conn: ConnectionId) -> Option<TeamStatus>;

    fn status(&self, conn: ConnectionId) -> Option<TeamStatus>;

    /// The connection is gone; keep the player's seat but stop counting it as
    /// online, and forget the connection.
    fn mark_offline(&self, conn: ConnectionId);
}

pub trait ContentLookup: Send + Sync {
    fn locations_for_mode(&self, game_mode: &str) -> Vec<i32>;

    fn location_ids(&self) -> Vec<i32>;
}

/// Every collaborator a handler may reach, cheaply cloneable.
#[derive(Clone)]
pub struct Collaborators {
    pub players: Arc<dyn PlayerStore>,
    pub alliances: Arc<dyn AllianceStore>,
    pub events: Arc<dyn EventService>,
    pub teams: Arc<dyn TeamRegistry>,
    pub content: Arc<dyn ContentLookup>,
}

impl Collaborators {
    /// In-memory stores around an already running event service.
    pub fn in_memory(content: Arc<dyn ContentLookup>, events: Arc<dyn EventService>) -> Self {
        Self {
            players: Arc::new(memory::MemoryPlayerStore::new()),
            alliances: Arc::new(memory::MemoryAllianceStore::new()),
            events,
            teams: Arc::new(memory::MemoryTeamRegistry::new()),
            content,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("event_slots", &self.events.slot_count())
            .finish_non_exhaustive()
    }
}
