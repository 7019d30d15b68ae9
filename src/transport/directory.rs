//! # Shared Directories
//!
//! Process-wide views of who is online, shared by every connection task.
//!
//! ## Components
//! - **OnlineRegistry**: logged-in identities; check-and-insert is one critical section
//! - **BroadcastDirectory**: connection handles grouped by alliance
//!
//! Broadcasts snapshot their recipients under the read lock and release it
//! before any network write, so a slow peer never blocks joins or removals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::core::types::LogicLong;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::ServerMessage;
use crate::transport::session::{ConnectionHandle, ConnectionId};

/// Identity a client claims when it logs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineIdentity {
    pub id: LogicLong,
    pub token: String,
}

impl OnlineIdentity {
    pub fn new(id: LogicLong, token: impl Into<String>) -> Self {
        Self {
            id,
            token: token.into(),
        }
    }

    /// Same token, or same non-zero id pair. Blank fields never match.
    pub fn collides_with(&self, other: &OnlineIdentity) -> bool {
        let same_token = !self.token.is_empty() && self.token == other.token;
        let same_id = self.id != LogicLong::default() && self.id == other.id;
        same_token || same_id
    }
}

/// Identities currently logged in, one per connection.
#[derive(Debug, Default)]
pub struct OnlineRegistry {
    entries: Mutex<HashMap<ConnectionId, OnlineIdentity>>,
}

impl OnlineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity` for `conn` unless it collides with one already online.
    pub fn try_register(&self, conn: ConnectionId, identity: OnlineIdentity) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_ONLINE_REGISTRY_LOCK.to_string()))?;

        if entries
            .iter()
            .any(|(other, existing)| *other != conn && existing.collides_with(&identity))
        {
            return Err(ProtocolError::AlreadyOnline);
        }

        entries.insert(conn, identity);
        Ok(())
    }

    pub fn remove(&self, conn: ConnectionId) -> Option<OnlineIdentity> {
        match self.entries.lock() {
            Ok(mut entries) => entries.remove(&conn),
            Err(_) => {
                warn!(conn_id = conn, "{}", constants::ERR_ONLINE_REGISTRY_LOCK);
                None
            }
        }
    }

    pub fn is_online(&self, id: LogicLong) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.values().any(|identity| identity.id == id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct DirectoryTable {
    clients: HashMap<ConnectionId, ConnectionHandle>,
    group_of: HashMap<ConnectionId, LogicLong>,
    groups: HashMap<LogicLong, HashMap<ConnectionId, ConnectionHandle>>,
}

impl DirectoryTable {
    fn leave_group(&mut self, conn: ConnectionId) {
        if let Some(group) = self.group_of.remove(&conn) {
            if let Some(members) = self.groups.get_mut(&group) {
                members.remove(&conn);
                if members.is_empty() {
                    self.groups.remove(&group);
                }
            }
        }
    }

    fn join_group(&mut self, handle: ConnectionHandle, group: LogicLong) {
        self.group_of.insert(handle.id(), group);
        self.groups
            .entry(group)
            .or_default()
            .insert(handle.id(), handle);
    }
}

/// Online connections and the alliance group each belongs to.
#[derive(Debug, Default)]
pub struct BroadcastDirectory {
    inner: RwLock<DirectoryTable>,
}

impl BroadcastDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handle: ConnectionHandle, group: Option<LogicLong>) -> Result<()> {
        let mut table = self
            .inner
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DIRECTORY_WRITE_LOCK.to_string()))?;

        let conn = handle.id();
        table.leave_group(conn);
        if let Some(group) = group {
            table.join_group(handle.clone(), group);
        }
        table.clients.insert(conn, handle);
        debug!(conn_id = conn, ?group, "added to broadcast directory");
        Ok(())
    }

    /// Move a connection between groups; `None` leaves every group.
    pub fn update_group(&self, conn: ConnectionId, group: Option<LogicLong>) -> Result<()> {
        let mut table = self
            .inner
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DIRECTORY_WRITE_LOCK.to_string()))?;

        let Some(handle) = table.clients.get(&conn).cloned() else {
            return Ok(());
        };
        table.leave_group(conn);
        if let Some(group) = group {
            table.join_group(handle, group);
        }
        Ok(())
    }

    /// Remove a connection from every view. Returns whether it was present.
    pub fn remove(&self, conn: ConnectionId) -> bool {
        let Ok(mut table) = self.inner.write() else {
            warn!(conn_id = conn, "{}", constants::ERR_DIRECTORY_WRITE_LOCK);
            return false;
        };
        table.leave_group(conn);
        table.clients.remove(&conn).is_some()
    }

    /// Snapshot of a group's handles.
    pub fn recipients(&self, group: LogicLong) -> Result<Vec<ConnectionHandle>> {
        let table = self
            .inner
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DIRECTORY_READ_LOCK.to_string()))?;

        Ok(table
            .groups
            .get(&group)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.inner
            .read()
            .map(|table| table.clients.contains_key(&conn))
            .unwrap_or(false)
    }

    pub fn online_count(&self) -> usize {
        self.inner.read().map(|table| table.clients.len()).unwrap_or(0)
    }

    /// Send `message` to every member of `group`. Returns how many sends succeeded.
    pub async fn broadcast(&self, group: LogicLong, message: &dyn ServerMessage) -> Result<usize> {
        let recipients = self.recipients(group)?;
        let payload = message.to_payload();

        let mut delivered = 0;
        for handle in recipients {
            match handle
                .send_frame(message.id(), message.version(), &payload)
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(conn_id = handle.id(), error = %e, "broadcast recipient unreachable");
                }
            }
        }

        debug!(packet_id = message.id(), delivered, "broadcast complete");
        Ok(delivered)
    }
}

/// Both directories, shared by reference count.
#[derive(Debug, Clone, Default)]
pub struct SharedDirectories {
    pub online: Arc<OnlineRegistry>,
    pub broadcast: Arc<BroadcastDirectory>,
}

impl SharedDirectories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every trace of `conn`, registry first.
    pub fn remove_connection(&self, conn: ConnectionId) {
        self.online.remove(conn);
        self.broadcast.remove(conn);
    }
}
