//! # Node
//!
//! Owns a bus connection pool, publishes outgoing packets and runs the
//! background receive loop that decodes and dispatches incoming ones.
//!
//! ## Lifecycle
//! `start` → receiving → `shutdown` (or drop). The receive task is spawned
//! once and stops on shutdown, on drop, or when the bus ends the subscription.
//! A failed subscribe leaves the node able to publish but not receive.
//!
//! ## Delivery
//! Best effort, at most once. Sends are fire-and-forget with no retry;
//! failures go to the caller's callback or the log.
//!
//! ## Usage
//! ```rust,no_run
//! use packet_node::prelude::*;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Ping { ts: u64 }
//! impl JsonPacket for Ping { const ID: i32 = 1; }
//!
//! # async fn demo() -> packet_node::error::Result<()> {
//! let packets = Arc::new(PacketRegistry::new());
//! packets.register::<Ping>()?;
//!
//! let listeners = Arc::new(ListenerRegistry::new());
//! listeners.on(|ping: &Ping| {
//!     println!("ping at {}", ping.ts);
//!     Ok(())
//! })?;
//!
//! let config = NodeConfig::new("game", "127.0.0.1", 6379);
//! let node = Node::start(&config, MemoryBus::new(), packets, listeners).await?;
//! node.send_packet(&Ping { ts: 123 }).await;
//! node.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::config::NodeConfig;
use crate::core::codec::MessageCodec;
use crate::core::packet::Packet;
use crate::core::registry::PacketRegistry;
use crate::error::{NodeError, Result};
use crate::protocol::dispatcher::{panic_message, DispatchReport, ListenerRegistry};
use crate::transport::pool::ConnectionPool;
use crate::transport::{Connection, Subscription, Transport};
use crate::utils::metrics::NodeMetrics;
use futures::StreamExt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// What the receive callback did with one inbound message
#[derive(Debug)]
pub enum MessageOutcome {
    /// Channel did not match this node's channel
    Ignored,
    /// Id not registered on this node
    Unknown,
    /// Decoded and handed to matching listeners
    Dispatched(DispatchReport),
    /// Decode or dispatch failed; the message was skipped
    Failed(NodeError),
}

struct Shared<T: Transport> {
    channel: String,
    codec: MessageCodec,
    listeners: Arc<ListenerRegistry>,
    pool: ConnectionPool<T>,
    metrics: NodeMetrics,
    running: AtomicBool,
}

impl<T: Transport> Shared<T> {
    fn handle_message(&self, channel: &str, message: &str) -> MessageOutcome {
        self.metrics.message_received();

        if !channel_matches(channel, &self.channel) {
            self.metrics.message_ignored();
            return MessageOutcome::Ignored;
        }

        // Factories and `deserialize` are user code; a panic there skips the message.
        let decoded = catch_unwind(AssertUnwindSafe(|| self.codec.decode(message)))
            .unwrap_or_else(|panic| {
                Err(NodeError::Deserialization(format!(
                    "decode panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let packet = match decoded {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                self.metrics.unknown_packet();
                debug!(channel, "Ignoring packet with unregistered id");
                return MessageOutcome::Unknown;
            }
            Err(e) => {
                self.metrics.decode_failed();
                warn!(channel, error = %e, "Failed to handle message");
                return MessageOutcome::Failed(e);
            }
        };
        self.metrics.packet_decoded();

        match self.listeners.dispatch(packet.as_ref()) {
            Ok(report) => {
                self.metrics.dispatched(report.invoked, report.failed());
                debug!(
                    id = packet.id(),
                    invoked = report.invoked,
                    failed = report.failed(),
                    "Dispatched packet"
                );
                MessageOutcome::Dispatched(report)
            }
            Err(e) => {
                error!(id = packet.id(), error = %e, "Failed to dispatch packet");
                MessageOutcome::Failed(e)
            }
        }
    }

    async fn publish(&self, packet: &dyn Packet) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(NodeError::NotRunning);
        }

        let message = self.codec.encode(packet)?;
        let mut conn = self.pool.acquire().await?;
        debug!(id = packet.id(), channel = %self.channel, "Attempting to publish packet");

        if let Err(e) = conn.publish(&self.channel, &message).await {
            conn.mark_broken();
            return Err(e);
        }
        Ok(())
    }
}

/// A typed-messaging node bound to one channel
pub struct Node<T: Transport> {
    shared: Arc<Shared<T>>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Node<T> {
    /// Connect, authenticate when a credential is configured, subscribe to
    /// the channel and start the background receive task.
    ///
    /// Must be called from within a tokio runtime. Fails on an invalid
    /// configuration or a failed authentication. A failed subscribe is
    /// logged and leaves the node publish-only.
    #[instrument(skip_all, fields(channel = %config.node.channel))]
    pub async fn start(
        config: &NodeConfig,
        transport: T,
        packets: Arc<PacketRegistry>,
        listeners: Arc<ListenerRegistry>,
    ) -> Result<Self> {
        config.validate_strict()?;

        let pool = ConnectionPool::new(Arc::new(transport), &config.transport);
        if config.transport.credential().is_some() {
            info!("Authenticating");
            drop(pool.acquire().await?);
        }

        let codec = MessageCodec::new(packets).with_max_message_size(config.node.max_message_size);
        let shared = Arc::new(Shared {
            channel: config.node.channel.clone(),
            codec,
            listeners,
            pool,
            metrics: NodeMetrics::new(),
            running: AtomicBool::new(true),
        });

        let node = Self {
            shared: shared.clone(),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
        };

        match subscribe(&shared).await {
            Ok(subscription) => {
                info!("Successfully subscribed to channel");
                let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
                let task = tokio::spawn(receive_loop(shared, subscription, shutdown_rx));
                if let Ok(mut slot) = node.shutdown_tx.lock() {
                    *slot = Some(shutdown_tx);
                }
                if let Ok(mut slot) = node.task.lock() {
                    *slot = Some(task);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to subscribe to channel");
            }
        }

        Ok(node)
    }

    /// Publish a packet, logging any failure.
    pub async fn send_packet(&self, packet: &dyn Packet) {
        self.send_packet_with(packet, |e| {
            error!(error = %e, "Failed to publish packet");
        })
        .await
    }

    /// Publish a packet, reporting any failure to `on_failure`.
    pub async fn send_packet_with<F>(&self, packet: &dyn Packet, on_failure: F)
    where
        F: FnOnce(NodeError),
    {
        if let Err(e) = self.try_send_packet(packet).await {
            on_failure(e);
        }
    }

    /// Publish a packet and return the outcome.
    pub async fn try_send_packet(&self, packet: &dyn Packet) -> Result<()> {
        match self.shared.publish(packet).await {
            Ok(()) => {
                self.shared.metrics.packet_sent();
                debug!(id = packet.id(), "Successfully published packet");
                Ok(())
            }
            Err(e) => {
                self.shared.metrics.send_failed();
                Err(e)
            }
        }
    }

    /// Run the receive callback for one raw message, as the receive loop does.
    pub fn handle_message(&self, channel: &str, message: &str) -> MessageOutcome {
        self.shared.handle_message(channel, message)
    }

    /// Stop the receive task and refuse further sends. Idempotent.
    #[instrument(skip(self), fields(channel = %self.shared.channel))]
    pub async fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);

        let shutdown_tx = self.shutdown_tx.lock().ok().and_then(|mut s| s.take());
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }

        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Receive task ended abnormally");
            }
        }

        self.shared.pool.close();
        self.shared.metrics.log_metrics(&self.shared.channel);
        info!("Node shut down");
    }

    /// Whether sends are accepted
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Whether the receive task is alive
    pub fn is_receiving(&self) -> bool {
        self.task
            .lock()
            .map(|t| t.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    pub fn channel(&self) -> &str {
        &self.shared.channel
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.shared.metrics
    }

    pub fn packets(&self) -> &Arc<PacketRegistry> {
        self.shared.codec.registry()
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.shared.listeners
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.shared.codec
    }
}

impl<T: Transport> Drop for Node<T> {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

async fn subscribe<T: Transport>(shared: &Shared<T>) -> Result<Subscription> {
    let conn = shared.pool.open().await?;
    shared
        .pool
        .transport()
        .subscribe(conn, &shared.channel)
        .await
}

async fn receive_loop<T: Transport>(
    shared: Arc<Shared<T>>,
    mut subscription: Subscription,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(channel = %shared.channel, "Receive loop shutting down");
                break;
            }

            next = subscription.next() => match next {
                Some(Ok(message)) => {
                    shared.handle_message(&message.channel, &message.payload);
                }
                Some(Err(e)) => {
                    warn!(channel = %shared.channel, error = %e, "Subscription delivery error");
                }
                None => {
                    warn!(channel = %shared.channel, "Subscription ended, receive loop stopping");
                    break;
                }
            }
        }
    }
}

/// Case-insensitive channel comparison
pub fn channel_matches(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
