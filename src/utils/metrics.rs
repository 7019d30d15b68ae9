//! Observability and Metrics
//!
//! Counters for monitoring the frame transport.
//!
//! Uses atomic counters so every connection task can record without locking.
//! One [`Metrics`] instance is owned by the transport and shared by `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for transport operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Frames read off the wire
    pub frames_received: AtomicU64,
    /// Frames written to the wire
    pub frames_sent: AtomicU64,
    /// Payload bytes read
    pub bytes_received: AtomicU64,
    /// Frame bytes written (header included)
    pub bytes_sent: AtomicU64,
    /// Frames whose id had no registered handler
    pub unknown_packets: AtomicU64,
    /// Payloads that failed to decode
    pub decode_errors: AtomicU64,
    /// Writes that failed
    pub send_errors: AtomicU64,
    /// Logins refused because the identity was already online
    pub duplicate_logins: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            unknown_packets: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            duplicate_logins: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn unknown_packet(&self) {
        self.unknown_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_login(&self) {
        self.duplicate_logins.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            unknown_packets: self.unknown_packets.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            duplicate_logins: self.duplicate_logins.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            frames_received = snapshot.frames_received,
            frames_sent = snapshot.frames_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            unknown_packets = snapshot.unknown_packets,
            decode_errors = snapshot.decode_errors,
            send_errors = snapshot.send_errors,
            duplicate_logins = snapshot.duplicate_logins,
            uptime_seconds = snapshot.uptime_seconds,
            "Transport metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub unknown_packets: u64,
    pub decode_errors: u64,
    pub send_errors: u64,
    pub duplicate_logins: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring how long a handler's process step takes
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
