//! Observability and Metrics
//!
//! Per-node counters for publishing, receiving, decoding and dispatch.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector owned by a node
#[derive(Debug)]
pub struct NodeMetrics {
    /// Packets successfully published
    pub packets_sent: AtomicU64,
    /// Sends that failed during encode or publish
    pub send_failures: AtomicU64,
    /// Raw messages delivered by the transport
    pub messages_received: AtomicU64,
    /// Messages dropped because the channel did not match
    pub messages_ignored: AtomicU64,
    /// Messages decoded into a packet
    pub packets_decoded: AtomicU64,
    /// Messages whose id is not registered on this node
    pub unknown_packets: AtomicU64,
    /// Messages that failed to decode
    pub decode_failures: AtomicU64,
    /// Listener invocations
    pub handler_invocations: AtomicU64,
    /// Listener invocations that returned an error or panicked
    pub handler_failures: AtomicU64,
    start_time: Instant,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self {
            packets_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
            packets_decoded: AtomicU64::new(0),
            unknown_packets: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            handler_invocations: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_decoded(&self) {
        self.packets_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_packet(&self) {
        self.unknown_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one dispatch
    pub fn dispatched(&self, invoked: usize, failed: usize) {
        self.handler_invocations
            .fetch_add(invoked as u64, Ordering::Relaxed);
        self.handler_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            unknown_packets: self.unknown_packets.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self, channel: &str) {
        let snapshot = self.snapshot();
        info!(
            channel,
            packets_sent = snapshot.packets_sent,
            send_failures = snapshot.send_failures,
            messages_received = snapshot.messages_received,
            messages_ignored = snapshot.messages_ignored,
            packets_decoded = snapshot.packets_decoded,
            unknown_packets = snapshot.unknown_packets,
            decode_failures = snapshot.decode_failures,
            handler_invocations = snapshot.handler_invocations,
            handler_failures = snapshot.handler_failures,
            uptime_seconds = snapshot.uptime_seconds,
            "Node metrics snapshot"
        );
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub send_failures: u64,
    pub messages_received: u64,
    pub messages_ignored: u64,
    pub packets_decoded: u64,
    pub unknown_packets: u64,
    pub decode_failures: u64,
    pub handler_invocations: u64,
    pub handler_failures: u64,
    pub uptime_seconds: u64,
}
