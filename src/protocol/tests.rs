// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, DuplexStream};

use crate::config::{DEFAULT_CIPHER_KEY, DEFAULT_CIPHER_NONCE, HEADER_LEN};
use crate::core::bytestream::{ByteReader, ByteWriter};
use crate::core::frame::FrameHeader;
use crate::core::types::LogicLong;
use crate::protocol::message::{ClientMessage, HandlerContext};
use crate::protocol::messages::ids;
use crate::protocol::registry::HandlerRegistry;
use crate::service::memory::StaticContent;
use crate::service::rotation::default_schedules;
use crate::service::{AllianceMembership, Collaborators, EventRotation, Player, PlayerStore};
use crate::transport::directory::SharedDirectories;
use crate::transport::session::{ConnectionSession, SessionState};
use crate::utils::cipher::{CipherPair, StreamCipher};
use crate::utils::metrics::Metrics;

/// Client side of an in-memory connection.
struct Peer {
    reader: DuplexStream,
    cipher: StreamCipher,
}

impl Peer {
    async fn next_frame(&mut self) -> (u16, Vec<u8>) {
        let mut header = [0u8; HEADER_LEN];
        tokio::time::timeout(Duration::from_secs(2), self.reader.read_exact(&mut header))
            .await
            .expect("frame within 2s")
            .unwrap();
        let header = FrameHeader::parse(&header).unwrap();

        let mut payload = vec![0u8; header.length as usize];
        self.reader.read_exact(&mut payload).await.unwrap();
        self.cipher.process(&mut payload);
        (header.id, payload)
    }
}

fn context() -> HandlerContext {
    let content = Arc::new(StaticContent::with_defaults());
    let events = Arc::new(EventRotation::new(default_schedules(), content.clone()).unwrap());
    HandlerContext::new(
        Collaborators::in_memory(content, events),
        SharedDirectories::new(),
        Arc::new(Metrics::new()),
    )
}

fn connect(id: u64, ctx: &HandlerContext) -> (ConnectionSession, Peer) {
    let (server_side, client_side) = tokio::io::duplex(64 * 1024);
    let ciphers = CipherPair::new(
        DEFAULT_CIPHER_KEY.as_bytes(),
        DEFAULT_CIPHER_NONCE.as_bytes(),
    )
    .unwrap();
    let session = ConnectionSession::open(
        id,
        "127.0.0.1:40000".parse().unwrap(),
        ciphers,
        server_side,
        Arc::clone(&ctx.metrics),
    );
    let peer = Peer {
        reader: client_side,
        cipher: StreamCipher::new(
            DEFAULT_CIPHER_KEY.as_bytes(),
            DEFAULT_CIPHER_NONCE.as_bytes(),
        )
        .unwrap(),
    };
    (session, peer)
}

fn login_payload(high: i32, low: i32, token: &str) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.write_i32(high);
    writer.write_i32(low);
    writer.write_str(token);
    writer.write_i32(27);
    writer.write_i32(269);
    writer.write_i32(1);
    writer.write_str("fingerprint");
    writer.write_string(None);
    writer.write_str("uuid");
    writer.write_string(None);
    writer.write_str("model");
    writer.write_varint(1);
    writer.write_str("US");
    writer.into_bytes().to_vec()
}

fn string_payload(value: &str) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.write_str(value);
    writer.into_bytes().to_vec()
}

async fn deliver(
    registry: &HandlerRegistry,
    session: &mut ConnectionSession,
    ctx: &HandlerContext,
    packet_id: u16,
    payload: &[u8],
) -> crate::Result<()> {
    let mut message: Box<dyn ClientMessage> = registry.create(packet_id)?;
    message.decode(payload)?;
    if message.starts_login() {
        session.begin_login();
    }
    message.process(session, ctx).await
}

#[tokio::test]
async fn test_login_creates_player_and_goes_active() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut session, mut peer) = connect(1, &ctx);

    deliver(&registry, &mut session, &ctx, ids::LOGIN, &login_payload(0, 5, "tok-a"))
        .await
        .unwrap();

    let (id, payload) = peer.next_frame().await;
    assert_eq!(id, ids::LOGIN_OK);
    let mut reader = ByteReader::new(&payload);
    assert_eq!(reader.read_i32().unwrap(), 0);
    assert_eq!(reader.read_i32().unwrap(), 5);

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.player().unwrap().token, "tok-a");
    assert_eq!(ctx.directories.online.len(), 1);
    assert!(ctx.directories.broadcast.contains(1));
}

#[tokio::test]
async fn test_blank_token_gets_generated_one() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut session, mut peer) = connect(1, &ctx);

    deliver(&registry, &mut session, &ctx, ids::LOGIN, &login_payload(0, 0, ""))
        .await
        .unwrap();

    let (id, payload) = peer.next_frame().await;
    assert_eq!(id, ids::LOGIN_OK);
    let mut reader = ByteReader::new(&payload);
    for _ in 0..4 {
        reader.read_i32().unwrap();
    }
    let token = reader.read_string().unwrap().unwrap();
    assert!(!token.is_empty());
    assert_eq!(session.player().unwrap().token, token);
}

#[tokio::test]
async fn test_duplicate_login_rejected_until_first_leaves() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut first, mut first_peer) = connect(1, &ctx);
    let (mut second, mut second_peer) = connect(2, &ctx);

    deliver(&registry, &mut first, &ctx, ids::LOGIN, &login_payload(0, 5, "tok"))
        .await
        .unwrap();
    assert_eq!(first_peer.next_frame().await.0, ids::LOGIN_OK);

    deliver(&registry, &mut second, &ctx, ids::LOGIN, &login_payload(0, 5, "tok"))
        .await
        .unwrap();
    let (id, payload) = second_peer.next_frame().await;
    assert_eq!(id, ids::LOGIN_FAILED);
    assert_eq!(ByteReader::new(&payload).read_i32().unwrap(), 6);
    assert_eq!(second.state(), SessionState::Authenticating);
    assert_eq!(ctx.metrics.snapshot().duplicate_logins, 1);

    ctx.directories.remove_connection(1);
    deliver(&registry, &mut second, &ctx, ids::LOGIN, &login_payload(0, 5, "tok"))
        .await
        .unwrap();
    assert_eq!(second_peer.next_frame().await.0, ids::LOGIN_OK);
    assert!(second.is_active());
}

#[tokio::test]
async fn test_generated_token_cannot_log_in_twice() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut first, mut first_peer) = connect(1, &ctx);
    let (mut second, mut second_peer) = connect(2, &ctx);

    deliver(&registry, &mut first, &ctx, ids::LOGIN, &login_payload(0, 0, ""))
        .await
        .unwrap();
    assert_eq!(first_peer.next_frame().await.0, ids::LOGIN_OK);
    let owner = first.player().unwrap().clone();

    deliver(
        &registry,
        &mut second,
        &ctx,
        ids::LOGIN,
        &login_payload(owner.id.high, owner.id.low, &owner.token),
    )
    .await
    .unwrap();
    assert_eq!(second_peer.next_frame().await.0, ids::LOGIN_FAILED);
    assert!(!second.is_active());
    assert_eq!(ctx.directories.online.len(), 1);
    assert!(!ctx.directories.broadcast.contains(2));
}

#[tokio::test]
async fn test_keep_alive_acknowledged_in_any_state() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut session, mut peer) = connect(1, &ctx);

    deliver(&registry, &mut session, &ctx, ids::KEEP_ALIVE, &[])
        .await
        .unwrap();
    let (id, payload) = peer.next_frame().await;
    assert_eq!(id, ids::KEEP_ALIVE_OK);
    assert!(payload.is_empty());
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_rename_requires_login() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut session, mut peer) = connect(1, &ctx);

    deliver(
        &registry,
        &mut session,
        &ctx,
        ids::CHANGE_AVATAR_NAME,
        &string_payload("Early"),
    )
    .await
    .unwrap();

    // nothing was sent for the rename, so the next frame is the heartbeat reply
    deliver(&registry, &mut session, &ctx, ids::KEEP_ALIVE, &[])
        .await
        .unwrap();
    assert_eq!(peer.next_frame().await.0, ids::KEEP_ALIVE_OK);
}

#[tokio::test]
async fn test_rename_persists_and_confirms() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut session, mut peer) = connect(1, &ctx);

    deliver(&registry, &mut session, &ctx, ids::LOGIN, &login_payload(0, 9, "tok"))
        .await
        .unwrap();
    peer.next_frame().await;

    deliver(
        &registry,
        &mut session,
        &ctx,
        ids::CHANGE_AVATAR_NAME,
        &string_payload("  Poco "),
    )
    .await
    .unwrap();

    let (id, payload) = peer.next_frame().await;
    assert_eq!(id, ids::AVAILABLE_SERVER_COMMAND);
    let mut reader = ByteReader::new(&payload);
    assert_eq!(reader.read_varint().unwrap(), 201);
    assert_eq!(reader.read_varint().unwrap(), 201);
    assert_eq!(reader.read_string().unwrap().as_deref(), Some("Poco"));

    assert_eq!(session.player().unwrap().name, "Poco");
    let stored = ctx.services.players.load_by_token("tok").unwrap().unwrap();
    assert_eq!(stored.name, "Poco");
}

#[tokio::test]
async fn test_alliance_chat_reaches_every_member() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let alliance = LogicLong::new(0, 77);

    let mut members = Vec::new();
    for conn in 1..=2u64 {
        let (mut session, peer) = connect(conn, &ctx);
        let mut player = Player::new(LogicLong::new(0, conn as i32), format!("t{conn}"), "US");
        player.name = format!("member{conn}");
        player.alliance = Some(AllianceMembership { alliance, role: 1 });
        ctx.directories
            .broadcast
            .add(session.handle().clone(), Some(alliance))
            .unwrap();
        session.establish(player).unwrap();
        members.push((session, peer));
    }

    let (outsider, mut outsider_peer) = connect(3, &ctx);
    ctx.directories
        .broadcast
        .add(outsider.handle().clone(), None)
        .unwrap();

    let (sender, _) = &mut members[0];
    deliver(&registry, sender, &ctx, ids::ALLIANCE_CHAT, &string_payload("hello"))
        .await
        .unwrap();

    for (_, peer) in members.iter_mut() {
        let (id, payload) = peer.next_frame().await;
        assert_eq!(id, ids::ALLIANCE_CHAT_SERVER);
        let mut reader = ByteReader::new(&payload);
        assert_eq!(reader.read_varint().unwrap(), 2);
        assert_eq!(reader.read_logic_long().unwrap(), LogicLong::new(0, 1));
        assert_eq!(reader.read_logic_long().unwrap(), LogicLong::new(0, 1));
        assert_eq!(reader.read_string().unwrap().as_deref(), Some("member1"));
    }

    let mut byte = [0u8; 1];
    let nothing = tokio::time::timeout(
        Duration::from_millis(100),
        outsider_peer.reader.read(&mut byte),
    )
    .await;
    assert!(nothing.is_err(), "outsider must not receive alliance chat");
}

#[tokio::test]
async fn test_go_home_is_silent() {
    let ctx = context();
    let registry = HandlerRegistry::with_defaults().unwrap();
    let (mut session, _peer) = connect(1, &ctx);

    deliver(&registry, &mut session, &ctx, ids::GO_HOME_FROM_OFFLINE, &[])
        .await
        .unwrap();
    session
        .establish(Player::new(LogicLong::new(0, 1), "t", "US"))
        .unwrap();
    deliver(&registry, &mut session, &ctx, ids::GO_HOME_FROM_OFFLINE, &[])
        .await
        .unwrap();
    assert!(session.is_active());
}
