//! # Frame Transport
//!
//! TCP listener and per-connection read/dispatch loop.
//!
//! ## Connection Loop
//! 1. Read a complete frame (7-byte header, then exactly the declared payload)
//! 2. Decrypt the payload with the connection's inbound cipher
//! 3. Look the id up in the [`HandlerRegistry`]; unknown ids are logged and skipped
//! 4. Decode, then run the handler's process step; a payload that fails to
//!    decode ends the connection
//!
//! ## Cleanup
//! Every exit path runs the same cleanup, in order: the outbound handle is
//! marked closed, then online registry, broadcast directory, team presence,
//! then the socket and ciphers drop.
//!
//! ## Shutdown
//! `serve` stops accepting when the shared watch flips to `true`, then waits
//! up to the configured timeout for open connections to finish on their own.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{CipherConfig, ServerConfig};
use crate::core::frame::{Frame, FrameCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::HandlerContext;
use crate::protocol::registry::HandlerRegistry;
use crate::service::TeamRegistry;
use crate::transport::session::{ConnectionHandle, ConnectionId, ConnectionSession};
use crate::utils::cipher::CipherPair;
use crate::utils::metrics::Timer;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Listening socket plus everything a connection task needs.
pub struct FrameTransport {
    listener: TcpListener,
    registry: Arc<HandlerRegistry>,
    ctx: HandlerContext,
    cipher_key: Arc<[u8]>,
    cipher_nonce: Arc<[u8]>,
    max_payload: usize,
    shutdown_timeout: Duration,
    metrics_interval: Duration,
    next_id: AtomicU64,
}

impl FrameTransport {
    /// Bind the listener. Cipher settings are checked here so a bad key fails at startup.
    pub async fn bind(
        server: &ServerConfig,
        cipher: &CipherConfig,
        registry: Arc<HandlerRegistry>,
        ctx: HandlerContext,
    ) -> Result<Self> {
        CipherPair::new(cipher.key.as_bytes(), cipher.nonce.as_bytes())?;

        let listener = TcpListener::bind(&server.address).await?;
        info!(address = %server.address, "Listening");

        Ok(Self {
            listener,
            registry,
            ctx,
            cipher_key: Arc::from(cipher.key.as_bytes()),
            cipher_nonce: Arc::from(cipher.nonce.as_bytes()),
            max_payload: server.max_payload_size,
            shutdown_timeout: server.shutdown_timeout,
            metrics_interval: server.metrics_interval,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Accept connections until `shutdown` becomes `true`.
    #[instrument(skip(self, shutdown), fields(addr = ?self.listener.local_addr().ok()))]
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut metrics_ticker = (!self.metrics_interval.is_zero()).then(|| {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + self.metrics_interval, self.metrics_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = next_tick(&mut metrics_ticker) => {
                    self.ctx.metrics.log_metrics();
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => error!(error = %e, "Error accepting connection"),
                    }
                }
            }
        }

        info!("Shutting down server. Waiting for connections to close...");
        self.drain().await;
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let ciphers = match CipherPair::new(&self.cipher_key, &self.cipher_nonce) {
            Ok(ciphers) => ciphers,
            Err(e) => {
                error!(peer = %peer, error = %e, "could not key connection ciphers");
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.registry);
        let ctx = self.ctx.clone();
        let max_payload = self.max_payload;

        ctx.metrics.connection_opened();
        info!(conn_id = id, peer = %peer, "received connection");

        tokio::spawn(run_connection(stream, peer, id, ciphers, registry, ctx, max_payload));
    }

    async fn drain(&self) {
        let deadline = Instant::now() + self.shutdown_timeout;

        loop {
            let active = self.ctx.metrics.snapshot().connections_active;
            if active == 0 {
                info!("All connections closed, shutting down");
                return;
            }
            if Instant::now() >= deadline {
                warn!(connections = active, "Shutdown timeout reached, forcing exit");
                return;
            }
            debug!(connections = active, "Waiting for connections to close");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Removes a connection from every shared view when dropped.
struct CleanupGuard {
    conn: ConnectionId,
    handle: ConnectionHandle,
    ctx: HandlerContext,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        // broadcasters still holding a snapshot see ConnectionClosed from here on
        self.handle.mark_closed();
        self.ctx.directories.remove_connection(self.conn);
        self.ctx.services.teams.mark_offline(self.conn);
        self.ctx.metrics.connection_closed();
        debug!(conn_id = self.conn, "connection cleaned up");
    }
}

#[instrument(skip_all, fields(conn_id = id, peer = %peer))]
async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    ciphers: CipherPair,
    registry: Arc<HandlerRegistry>,
    ctx: HandlerContext,
    max_payload: usize,
) {
    let (read_half, write_half) = stream.into_split();
    let mut session =
        ConnectionSession::open(id, peer, ciphers, write_half, Arc::clone(&ctx.metrics));
    let mut frames = FramedRead::new(read_half, FrameCodec::with_max_payload(max_payload));
    // declared last so it drops first, before the socket halves
    let _cleanup = CleanupGuard {
        conn: id,
        handle: session.handle().clone(),
        ctx: ctx.clone(),
    };

    while let Some(next) = frames.next().await {
        let frame = match next {
            Ok(frame) => frame,
            Err(ProtocolError::Io(e)) => {
                debug!(error = %e, "read failed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "dropping connection on malformed frame");
                break;
            }
        };

        if !dispatch_frame(&registry, &mut session, &ctx, frame).await {
            break;
        }
    }

    session.mark_closed();
    info!("client disconnected");
}

/// Decrypt, route and process one frame. Returns whether the connection stays open.
async fn dispatch_frame(
    registry: &HandlerRegistry,
    session: &mut ConnectionSession,
    ctx: &HandlerContext,
    mut frame: Frame,
) -> bool {
    let len = frame.payload.len();
    ctx.metrics.frame_received(len as u64);
    session.decrypt(&mut frame.payload);

    let mut message = match registry.create(frame.id) {
        Ok(message) => message,
        Err(ProtocolError::UnknownPacketId(packet_id)) => {
            ctx.metrics.unknown_packet();
            warn!(packet_id, len, "no handler registered, skipping frame");
            return true;
        }
        Err(e) => {
            error!(packet_id = frame.id, error = %e, "handler lookup failed");
            return true;
        }
    };

    let name = message.name();
    debug!(packet_id = frame.id, len, message = name, "received packet");

    if let Err(e) = message.decode(&frame.payload) {
        ctx.metrics.decode_error();
        warn!(packet_id = frame.id, message = name, error = %e, "dropping connection on undecodable payload");
        return false;
    }

    if message.starts_login() && session.begin_login() {
        debug!("authenticating");
    }

    let _timer = Timer::start(name);
    match message.process(session, ctx).await {
        Ok(()) => true,
        Err(ProtocolError::ConnectionClosed) => false,
        Err(ProtocolError::Io(e)) => {
            warn!(message = name, error = %e, "I/O failure while handling packet");
            false
        }
        Err(e) => {
            warn!(message = name, error = %e, "handler failed");
            true
        }
    }
}
