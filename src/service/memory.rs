//! In-memory collaborators.
//!
//! Process-local stand-ins for the persistent stores so the server runs and
//! can be tested without a database. Contents are lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::core::types::LogicLong;
use crate::error::{constants, ProtocolError, Result};
use crate::service::{
    AllianceStore, ChatMessage, ContentLookup, Player, PlayerStore, TeamRegistry, TeamStatus,
};
use crate::transport::session::ConnectionId;

/// Seats in one team lobby.
pub const TEAM_CAPACITY: usize = 3;

#[derive(Debug, Default)]
struct PlayerTable {
    by_token: HashMap<String, Player>,
    next_low: i32,
}

/// Player records keyed by login token.
#[derive(Debug, Default)]
pub struct MemoryPlayerStore {
    inner: RwLock<PlayerTable>,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|t| t.by_token.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, id: LogicLong, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Player),
    {
        let mut table = self.inner.write().map_err(|_| {
            ProtocolError::Collaborator(constants::ERR_PLAYER_STORE_LOCK.to_string())
        })?;

        let player = table
            .by_token
            .values_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| {
                ProtocolError::Collaborator(format!("No player with id {}-{}", id.high, id.low))
            })?;
        apply(player);
        Ok(())
    }
}

impl PlayerStore for MemoryPlayerStore {
    fn load_by_token(&self, token: &str) -> Result<Option<Player>> {
        let table = self.inner.read().map_err(|_| {
            ProtocolError::Collaborator(constants::ERR_PLAYER_STORE_LOCK.to_string())
        })?;
        Ok(table.by_token.get(token).cloned())
    }

    fn create_player(&self, requested: LogicLong, token: &str, region: &str) -> Result<Player> {
        let mut table = self.inner.write().map_err(|_| {
            ProtocolError::Collaborator(constants::ERR_PLAYER_STORE_LOCK.to_string())
        })?;

        if table.by_token.contains_key(token) {
            return Err(ProtocolError::Collaborator(
                "Token is already registered".to_string(),
            ));
        }

        let taken = |id: LogicLong, t: &PlayerTable| t.by_token.values().any(|p| p.id == id);
        let id = if requested != LogicLong::default() && !taken(requested, &*table) {
            requested
        } else {
            loop {
                table.next_low += 1;
                let candidate = LogicLong::new(0, table.next_low);
                if !taken(candidate, &*table) {
                    break candidate;
                }
            }
        };

        let player = Player::new(id, token, region);
        table.by_token.insert(token.to_string(), player.clone());
        debug!(high = id.high, low = id.low, "created player");
        Ok(player)
    }

    fn touch_login(&self, id: LogicLong) -> Result<()> {
        // no last-login column to update in memory, only existence is checked
        self.update(id, |_| {})
    }

    fn rename(&self, id: LogicLong, name: &str) -> Result<()> {
        self.update(id, |player| {
            player.name = name.to_string();
            player.name_set = true;
        })
    }
}

/// Chat history per alliance.
#[derive(Debug, Default)]
pub struct MemoryAllianceStore {
    chats: Mutex<HashMap<LogicLong, Vec<ChatMessage>>>,
}

impl MemoryAllianceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored lines for an alliance, oldest first.
    pub fn history(&self, alliance: LogicLong) -> Vec<ChatMessage> {
        self.chats
            .lock()
            .map(|chats| chats.get(&alliance).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl AllianceStore for MemoryAllianceStore {
    fn add_chat_message(
        &self,
        alliance: LogicLong,
        sender: &Player,
        text: &str,
    ) -> Result<ChatMessage> {
        let mut chats = self.chats.lock().map_err(|_| {
            ProtocolError::Collaborator(constants::ERR_ALLIANCE_STORE_LOCK.to_string())
        })?;

        let lines = chats.entry(alliance).or_default();
        let message = ChatMessage {
            id: lines.len() as i32 + 1,
            sender: sender.id,
            sender_name: sender.name.clone(),
            sender_role: sender.alliance.as_ref().map_or(0, |m| m.role),
            content: text.to_string(),
            sent_at: SystemTime::now(),
        };
        lines.push(message.clone());
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy)]
struct Seat {
    conn: Option<ConnectionId>,
    online: bool,
}

#[derive(Debug, Default)]
struct TeamTable {
    teams: HashMap<i32, HashMap<LogicLong, Seat>>,
    /// live connection -> (team, seated player)
    by_conn: HashMap<ConnectionId, (i32, LogicLong)>,
    next_team: i32,
}

impl TeamTable {
    fn status(&self, team_id: i32) -> Option<TeamStatus> {
        self.teams.get(&team_id).map(|members| TeamStatus {
            team_id,
            members: members.len(),
            online: members.values().filter(|seat| seat.online).count(),
        })
    }

    fn remove(&mut self, conn: ConnectionId) -> Option<i32> {
        let (team_id, player) = self.by_conn.remove(&conn)?;
        if let Some(members) = self.teams.get_mut(&team_id) {
            members.remove(&player);
            if members.is_empty() {
                self.teams.remove(&team_id);
            }
        }
        Some(team_id)
    }
}

/// Team lobbies. Seats belong to players; connections only occupy them.
#[derive(Debug, Default)]
pub struct MemoryTeamRegistry {
    inner: Mutex<TeamTable>,
}

impl MemoryTeamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seated players on `team_id`, online or not.
    pub fn team_size(&self, team_id: i32) -> Option<usize> {
        let table = self.inner.lock().ok()?;
        table.teams.get(&team_id).map(HashMap::len)
    }
}

impl TeamRegistry for MemoryTeamRegistry {
    fn join(&self, conn: ConnectionId, player: LogicLong, team: Option<i32>) -> Result<TeamStatus> {
        let mut table = self.inner.lock().map_err(|_| {
            ProtocolError::Collaborator(constants::ERR_TEAM_REGISTRY_LOCK.to_string())
        })?;

        let team_id = match team {
            Some(id) => {
                let members = table
                    .teams
                    .get(&id)
                    .ok_or_else(|| ProtocolError::Collaborator(format!("No team with id {id}")))?;
                if !members.contains_key(&player) && members.len() >= TEAM_CAPACITY {
                    return Err(ProtocolError::Collaborator(format!("Team {id} is full")));
                }
                id
            }
            None => {
                table.next_team += 1;
                let id = table.next_team;
                table.teams.insert(id, HashMap::new());
                id
            }
        };

        if table.by_conn.get(&conn) != Some(&(team_id, player)) {
            table.remove(conn);
        }

        let previous = table.teams.entry(team_id).or_default().insert(
            player,
            Seat {
                conn: Some(conn),
                online: true,
            },
        );
        if let Some(old) = previous.and_then(|seat| seat.conn).filter(|old| *old != conn) {
            table.by_conn.remove(&old);
        }
        table.by_conn.insert(conn, (team_id, player));

        table
            .status(team_id)
            .ok_or_else(|| ProtocolError::Collaborator(format!("Team {team_id} vanished")))
    }

    fn leave(&self, conn: ConnectionId) -> Option<TeamStatus> {
        let mut table = self.inner.lock().ok()?;
        let team_id = table.remove(conn)?;
        table.status(team_id)
    }

    fn status(&self, conn: ConnectionId) -> Option<TeamStatus> {
        let table = self.inner.lock().ok()?;
        let (team_id, _) = *table.by_conn.get(&conn)?;
        table.status(team_id)
    }

    fn mark_offline(&self, conn: ConnectionId) {
        let Ok(mut table) = self.inner.lock() else {
            warn!(conn_id = conn, "{}", constants::ERR_TEAM_REGISTRY_LOCK);
            return;
        };

        let Some((team_id, player)) = table.by_conn.remove(&conn) else {
            return;
        };
        if let Some(seat) = table.teams.get_mut(&team_id).and_then(|m| m.get_mut(&player)) {
            seat.conn = None;
            seat.online = false;
        }
    }
}

/// Location ids grouped by game mode.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    locations: HashMap<String, Vec<i32>>,
}

impl StaticContent {
    pub fn new(locations: HashMap<String, Vec<i32>>) -> Self {
        Self { locations }
    }

    /// A small built-in table covering the stock game modes.
    pub fn with_defaults() -> Self {
        let table = [
            ("CoinRush", vec![0, 1, 2, 3]),
            ("AttackDefend", vec![4, 5, 6]),
            ("BountyHunter", vec![7, 8, 9]),
            ("BattleRoyale", vec![10, 11, 12, 13]),
            ("LaserBall", vec![14, 15, 16]),
        ];
        Self::new(
            table
                .into_iter()
                .map(|(mode, ids)| (mode.to_string(), ids))
                .collect(),
        )
    }
}

impl ContentLookup for StaticContent {
    fn locations_for_mode(&self, game_mode: &str) -> Vec<i32> {
        self.locations.get(game_mode).cloned().unwrap_or_default()
    }

    fn location_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.locations.values().flatten().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_honours_requested_id_when_free() {
        let store = MemoryPlayerStore::new();
        let first = store
            .create_player(LogicLong::new(0, 42), "tok-a", "FR")
            .unwrap();
        assert_eq!(first.id, LogicLong::new(0, 42));

        let second = store
            .create_player(LogicLong::new(0, 42), "tok-b", "FR")
            .unwrap();
        assert_ne!(second.id, first.id);

        let fresh = store.create_player(LogicLong::default(), "tok-c", "FR").unwrap();
        assert_ne!(fresh.id, LogicLong::default());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let store = MemoryPlayerStore::new();
        store.create_player(LogicLong::default(), "tok", "US").unwrap();
        assert!(store.create_player(LogicLong::default(), "tok", "US").is_err());
    }

    #[test]
    fn test_rename_and_reload() {
        let store = MemoryPlayerStore::new();
        let player = store.create_player(LogicLong::default(), "tok", "US").unwrap();
        store.rename(player.id, "Shelly").unwrap();

        let loaded = store.load_by_token("tok").unwrap().unwrap();
        assert_eq!(loaded.name, "Shelly");
        assert!(loaded.name_set);
        assert!(store.rename(LogicLong::new(9, 9), "x").is_err());
    }

    #[test]
    fn test_chat_ids_increase_per_alliance() {
        let store = MemoryAllianceStore::new();
        let sender = Player::new(LogicLong::new(0, 1), "t", "US");
        let alliance = LogicLong::new(0, 7);

        let a = store.add_chat_message(alliance, &sender, "hi").unwrap();
        let b = store.add_chat_message(alliance, &sender, "again").unwrap();
        let other = store
            .add_chat_message(LogicLong::new(0, 8), &sender, "elsewhere")
            .unwrap();

        assert_eq!((a.id, b.id, other.id), (1, 2, 1));
        assert_eq!(store.history(alliance).len(), 2);
    }

    fn player(low: i32) -> LogicLong {
        LogicLong::new(0, low)
    }

    #[test]
    fn test_team_join_leave_and_presence() {
        let teams = MemoryTeamRegistry::new();
        let created = teams.join(1, player(1), None).unwrap();
        assert_eq!(created.members, 1);

        let joined = teams.join(2, player(2), Some(created.team_id)).unwrap();
        assert_eq!(joined.members, 2);
        assert_eq!(joined.online, 2);

        teams.mark_offline(2);
        let status = teams.status(1).unwrap();
        assert_eq!((status.members, status.online), (2, 1));
        assert!(teams.status(2).is_none());

        let remaining = teams.leave(1).unwrap();
        assert_eq!(remaining.members, 1);
        assert!(teams.status(1).is_none());
        assert!(teams.leave(2).is_none());
    }

    #[test]
    fn test_team_capacity_and_unknown_team() {
        let teams = MemoryTeamRegistry::new();
        let team = teams.join(1, player(1), None).unwrap().team_id;
        teams.join(2, player(2), Some(team)).unwrap();
        teams.join(3, player(3), Some(team)).unwrap();

        assert!(teams.join(4, player(4), Some(team)).is_err());
        assert!(teams.join(4, player(4), Some(team + 100)).is_err());
    }

    #[test]
    fn test_reconnects_reuse_the_players_seat() {
        let teams = MemoryTeamRegistry::new();
        let team = teams.join(1, player(1), None).unwrap().team_id;
        teams.join(2, player(2), Some(team)).unwrap();

        let mut conn = 2;
        for _ in 0..TEAM_CAPACITY * 3 {
            teams.mark_offline(conn);
            assert_eq!(teams.status(1).unwrap().online, 1);

            conn += 10;
            let status = teams.join(conn, player(2), Some(team)).unwrap();
            assert_eq!((status.members, status.online), (2, 2));
        }
        assert_eq!(teams.team_size(team), Some(2));

        // a third player still fits
        assert_eq!(teams.join(99, player(3), Some(team)).unwrap().members, 3);
    }

    #[test]
    fn test_join_from_a_second_live_connection_moves_the_seat() {
        let teams = MemoryTeamRegistry::new();
        let team = teams.join(1, player(1), None).unwrap().team_id;
        teams.join(2, player(1), Some(team)).unwrap();

        assert!(teams.status(1).is_none());
        assert_eq!(teams.status(2).unwrap().members, 1);
        // the stale connection no longer holds anything to mark offline
        teams.mark_offline(1);
        assert_eq!(teams.status(2).unwrap().online, 1);
    }

    #[test]
    fn test_content_fallbacks() {
        let content = StaticContent::with_defaults();
        assert_eq!(content.locations_for_mode("LaserBall"), vec![14, 15, 16]);
        assert!(content.locations_for_mode("Unknown").is_empty());
        assert_eq!(content.location_ids().len(), 17);
    }
}
