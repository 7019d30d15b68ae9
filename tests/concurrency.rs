//! Concurrency tests for the shared online views

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use arena_protocol::core::bytestream::ByteWriter;
use arena_protocol::core::types::LogicLong;
use arena_protocol::protocol::ServerMessage;
use arena_protocol::transport::{
    ConnectionHandle, OnlineIdentity, OnlineRegistry, SharedDirectories,
};
use arena_protocol::utils::cipher::StreamCipher;
use arena_protocol::utils::Metrics;
use arena_protocol::ProtocolError;
use tokio::io::DuplexStream;
use tokio::task::JoinSet;

struct Ping;

impl ServerMessage for Ping {
    fn id(&self) -> u16 {
        24312
    }

    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_varint(1);
    }
}

/// A handle plus the reading end, which must outlive every send.
fn handle(id: u64, metrics: &Arc<Metrics>) -> (ConnectionHandle, DuplexStream) {
    let (server_side, client_side) = tokio::io::duplex(1 << 20);
    let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
    let handle = ConnectionHandle::new(
        id,
        peer,
        StreamCipher::new(b"secret", b"nonce").unwrap(),
        server_side,
        Arc::clone(metrics),
    );
    (handle, client_side)
}

#[test]
fn concurrent_duplicate_login_admits_exactly_one() {
    let registry = Arc::new(OnlineRegistry::new());
    let threads: Vec<_> = (0..16u64)
        .map(|conn| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                registry.try_register(conn, OnlineIdentity::new(LogicLong::new(0, 99), "shared"))
            })
        })
        .collect();

    let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(ProtocolError::AlreadyOnline)))
        .count();

    assert_eq!(admitted, 1);
    assert_eq!(rejected, 15);
    assert_eq!(registry.len(), 1);
}

#[test]
fn concurrent_distinct_logins_all_admitted() {
    let registry = Arc::new(OnlineRegistry::new());
    let threads: Vec<_> = (0..32u64)
        .map(|conn| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let identity = OnlineIdentity::new(LogicLong::new(0, conn as i32 + 1), format!("t{conn}"));
                registry.try_register(conn, identity)
            })
        })
        .collect();

    for thread in threads {
        thread.join().unwrap().unwrap();
    }
    assert_eq!(registry.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn broadcast_while_members_leave() {
    let metrics = Arc::new(Metrics::new());
    let directories = SharedDirectories::new();
    let alliance = LogicLong::new(0, 5);

    let mut readers = Vec::new();
    for conn in 0..64u64 {
        let (handle, reader) = handle(conn, &metrics);
        directories.broadcast.add(handle, Some(alliance)).unwrap();
        readers.push(reader);
    }

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let broadcast = Arc::clone(&directories.broadcast);
        tasks.spawn(async move {
            for _ in 0..50 {
                let delivered = broadcast.broadcast(alliance, &Ping).await.unwrap();
                assert!(delivered <= 64);
            }
        });
    }
    for conn in 0..64u64 {
        let directories = directories.clone();
        tasks.spawn(async move {
            directories.remove_connection(conn);
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert_eq!(directories.broadcast.online_count(), 0);
    assert!(directories.broadcast.recipients(alliance).unwrap().is_empty());
    drop(readers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_group_moves_keep_directory_consistent() {
    let metrics = Arc::new(Metrics::new());
    let directories = SharedDirectories::new();
    let a = LogicLong::new(0, 1);
    let b = LogicLong::new(0, 2);

    let mut readers = Vec::new();
    for conn in 0..32u64 {
        let (handle, reader) = handle(conn, &metrics);
        directories.broadcast.add(handle, Some(a)).unwrap();
        readers.push(reader);
    }

    let mut tasks = JoinSet::new();
    for conn in 0..32u64 {
        let broadcast = Arc::clone(&directories.broadcast);
        tasks.spawn(async move {
            let target = if conn % 2 == 0 { Some(b) } else { None };
            broadcast.update_group(conn, target).unwrap();
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert_eq!(directories.broadcast.recipients(a).unwrap().len(), 0);
    assert_eq!(directories.broadcast.recipients(b).unwrap().len(), 16);
    assert_eq!(directories.broadcast.online_count(), 32);
    drop(readers);
}
