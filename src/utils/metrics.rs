//! Observability and Metrics
//!
//! Atomic counters for the receive loop, the pumps and the outbound
//! dispatcher. One instance is owned by each [`UdpServer`] and shared with
//! its workers through an `Arc`.
//!
//! [`UdpServer`]: crate::transport::server::UdpServer

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Transport counters
#[derive(Debug)]
pub struct Metrics {
    /// Total connections created
    pub connections_total: AtomicU64,
    /// Currently live connections
    pub connections_active: AtomicU64,
    /// Connections refused because `max_connections` was reached
    pub connections_rejected: AtomicU64,
    /// Datagrams read from the socket
    pub datagrams_received: AtomicU64,
    /// Datagrams dropped because their ring buffer was full or closed
    pub datagrams_dropped: AtomicU64,
    /// Bytes read from the socket
    pub bytes_received: AtomicU64,
    /// Datagrams written to the socket
    pub datagrams_sent: AtomicU64,
    /// Bytes written to the socket
    pub bytes_sent: AtomicU64,
    /// Failed socket writes
    pub send_errors: AtomicU64,
    /// Decoded messages delivered to the manager or a session
    pub messages_routed: AtomicU64,
    /// Decoded messages with no destination
    pub messages_dropped: AtomicU64,
    /// Multipart fragments emitted by the dispatcher
    pub fragments_sent: AtomicU64,
    /// Multipart groups completed
    pub reassemblies_completed: AtomicU64,
    /// Multipart groups dropped (mismatch, expiry)
    pub reassemblies_discarded: AtomicU64,
    /// Unknown types, malformed payloads, invalid fragments
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            datagrams_dropped: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            datagrams_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            messages_routed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            fragments_sent: AtomicU64::new(0),
            reassemblies_completed: AtomicU64::new(0),
            reassemblies_discarded: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn datagram_dropped(&self) {
        self.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn datagram_sent(&self, byte_count: u64) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fragments_sent(&self, count: u64) {
        self.fragments_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn reassembly_completed(&self) {
        self.reassemblies_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reassemblies_discarded(&self, count: u64) {
        self.reassemblies_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            fragments_sent: self.fragments_sent.load(Ordering::Relaxed),
            reassemblies_completed: self.reassemblies_completed.load(Ordering::Relaxed),
            reassemblies_discarded: self.reassemblies_discarded.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let s = self.snapshot();
        info!(
            connections_total = s.connections_total,
            connections_active = s.connections_active,
            connections_rejected = s.connections_rejected,
            datagrams_received = s.datagrams_received,
            datagrams_dropped = s.datagrams_dropped,
            bytes_received = s.bytes_received,
            datagrams_sent = s.datagrams_sent,
            bytes_sent = s.bytes_sent,
            send_errors = s.send_errors,
            messages_routed = s.messages_routed,
            messages_dropped = s.messages_dropped,
            fragments_sent = s.fragments_sent,
            reassemblies_completed = s.reassemblies_completed,
            reassemblies_discarded = s.reassemblies_discarded,
            protocol_errors = s.protocol_errors,
            uptime_seconds = s.uptime_seconds,
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
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub datagrams_received: u64,
    pub datagrams_dropped: u64,
    pub bytes_received: u64,
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub messages_routed: u64,
    pub messages_dropped: u64,
    pub fragments_sent: u64,
    pub reassemblies_completed: u64,
    pub reassemblies_discarded: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}
