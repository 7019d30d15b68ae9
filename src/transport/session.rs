//! # Connection Session
//!
//! Per-connection state owned by the connection task.
//!
//! ## Lifecycle
//! ```text
//! Connected --login frame--> Authenticating --player established--> Active
//!     \___________________________\____________________________________\--> Closed
//! ```
//!
//! The outbound half ([`ConnectionHandle`]) is cloneable and is what other
//! connections hold when they broadcast. It keeps the outbound cipher and the
//! write half behind one async mutex so cipher order always equals wire order.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::HEADER_LEN;
use crate::core::frame::FrameHeader;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::ServerMessage;
use crate::service::Player;
use crate::utils::cipher::{CipherPair, StreamCipher};
use crate::utils::metrics::Metrics;

/// Process-unique connection identifier.
pub type ConnectionId = u64;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticating,
    Active,
    Closed,
}

struct Outbound {
    cipher: StreamCipher,
    writer: BoxedWriter,
}

/// Cloneable sending half of a connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: Arc<Mutex<Outbound>>,
    closed: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
}

impl ConnectionHandle {
    pub fn new<W>(
        id: ConnectionId,
        peer: SocketAddr,
        cipher: StreamCipher,
        writer: W,
        metrics: Arc<Metrics>,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer,
            outbound: Arc::new(Mutex::new(Outbound {
                cipher,
                writer: Box::new(writer),
            })),
            closed: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Encrypt `payload`, prepend its header and write the frame in one call.
    #[instrument(skip(self, payload), fields(conn_id = self.id, len = payload.len()))]
    pub async fn send_frame(&self, packet_id: u16, version: u16, payload: &[u8]) -> Result<()> {
        let header = FrameHeader::new(packet_id, payload.len(), version)?;

        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
        header.write_to(&mut frame);
        frame.extend_from_slice(payload);

        let mut outbound = self.outbound.lock().await;
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        outbound.cipher.process(&mut frame[HEADER_LEN..]);
        outbound.writer.write_all(&frame).await?;
        outbound.writer.flush().await?;
        drop(outbound);

        self.metrics.frame_sent(frame.len() as u64);
        debug!(packet_id, version, "sent frame");
        Ok(())
    }

    /// Send a typed message. Failures are logged and counted, never returned.
    pub async fn send(&self, message: &dyn ServerMessage) -> bool {
        let payload = message.to_payload();
        match self
            .send_frame(message.id(), message.version(), &payload)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.metrics.send_error();
                warn!(conn_id = self.id, peer = %self.peer, packet_id = message.id(), error = %e, "send failed");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse further sends on every clone without waiting for the writer.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Shut the write half down; later sends fail with `ConnectionClosed`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut outbound = self.outbound.lock().await;
        if let Err(e) = outbound.writer.shutdown().await {
            debug!(conn_id = self.id, error = %e, "shutdown of write half failed");
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// State the connection task owns: inbound cipher, lifecycle and player.
#[derive(Debug)]
pub struct ConnectionSession {
    handle: ConnectionHandle,
    inbound: StreamCipher,
    state: SessionState,
    player: Option<Player>,
}

impl ConnectionSession {
    pub fn new(handle: ConnectionHandle, inbound: StreamCipher) -> Self {
        Self {
            handle,
            inbound,
            state: SessionState::Connected,
            player: None,
        }
    }

    /// Build a session and its handle from a fresh cipher pair and a write half.
    pub fn open<W>(
        id: ConnectionId,
        peer: SocketAddr,
        ciphers: CipherPair,
        writer: W,
        metrics: Arc<Metrics>,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let handle = ConnectionHandle::new(id, peer, ciphers.outbound, writer, metrics);
        Self::new(handle, ciphers.inbound)
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.handle.peer
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> Option<&mut Player> {
        self.player.as_mut()
    }

    /// The established player, or an error when login has not completed.
    pub fn require_player(&self) -> Result<&Player> {
        match (&self.state, &self.player) {
            (SessionState::Active, Some(player)) => Ok(player),
            _ => Err(ProtocolError::Custom(constants::ERR_NOT_LOGGED_IN.to_string())),
        }
    }

    /// Decrypt an inbound payload in place.
    pub fn decrypt(&mut self, payload: &mut [u8]) {
        self.inbound.process(payload);
    }

    /// Connected -> Authenticating. Returns whether the state changed.
    pub fn begin_login(&mut self) -> bool {
        if self.state == SessionState::Connected {
            self.state = SessionState::Authenticating;
            true
        } else {
            false
        }
    }

    /// Attach the logged-in player and move to Active.
    pub fn establish(&mut self, player: Player) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(ProtocolError::Custom(constants::ERR_SESSION_CLOSED.to_string()));
        }
        self.player = Some(player);
        self.state = SessionState::Active;
        Ok(())
    }

    pub fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
        self.handle.mark_closed();
    }

    pub async fn send(&self, message: &dyn ServerMessage) -> bool {
        self.handle.send(message).await
    }
}
