//! # In-Memory Bus
//!
//! Process-local publish/subscribe bus built on `tokio::sync::broadcast`.
//!
//! Every subscription sees every message published after it was created,
//! filtered to its channel name (exact match). Publishing with no
//! subscribers succeeds and the message is dropped, matching pub/sub buses
//! that do not retain messages.
//!
//! The bus can require a password and can be told to fail connects or
//! publishes, which makes it the test double for node behavior under
//! transport faults.
//!
//! ## Usage
//! ```rust,no_run
//! use packet_node::transport::memory::MemoryBus;
//! use packet_node::transport::{Connection, Transport};
//!
//! # async fn demo() -> packet_node::error::Result<()> {
//! let bus = MemoryBus::with_password("hunter2");
//! let mut conn = bus.connect("127.0.0.1", 6379).await?;
//! conn.authenticate("hunter2").await?;
//! conn.publish("game", "1;{}").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{constants, NodeError, Result};
use crate::transport::{Connection, InboundMessage, Subscription, Transport};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Default number of in-flight messages a slow subscriber may lag behind
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

struct BusInner {
    sender: broadcast::Sender<InboundMessage>,
    password: Option<String>,
    fail_connects: AtomicBool,
    fail_publishes: AtomicBool,
    connections_opened: AtomicU64,
    published: AtomicU64,
}

/// Shared in-process bus. Clones refer to the same bus.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Open bus, no password
    pub fn new() -> Self {
        Self::build(DEFAULT_BUS_CAPACITY, None)
    }

    /// Bus that only accepts connections authenticated with `password`
    pub fn with_password(password: impl Into<String>) -> Self {
        Self::build(DEFAULT_BUS_CAPACITY, Some(password.into()))
    }

    /// Open bus with a custom lag capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    fn build(capacity: usize, password: Option<String>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                sender,
                password,
                fail_connects: AtomicBool::new(false),
                fail_publishes: AtomicBool::new(false),
                connections_opened: AtomicU64::new(0),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Make every subsequent connect fail
    pub fn set_fail_connects(&self, fail: bool) {
        self.inner.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent publish fail
    pub fn set_fail_publishes(&self, fail: bool) {
        self.inner.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Number of connections opened so far
    pub fn connections_opened(&self) -> u64 {
        self.inner.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of messages accepted for publishing
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Inject a raw message, bypassing connections and authentication
    pub fn inject(&self, channel: impl Into<String>, payload: impl Into<String>) {
        self.inner.published.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.sender.send(InboundMessage::new(channel, payload));
    }
}

/// Connection handle to a [`MemoryBus`]
pub struct MemoryConnection {
    bus: Arc<BusInner>,
    authenticated: bool,
}

impl MemoryConnection {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(NodeError::Transport(constants::ERR_NOT_AUTHENTICATED.to_string()))
        }
    }
}

impl Connection for MemoryConnection {
    async fn authenticate(&mut self, credential: &str) -> Result<()> {
        match &self.bus.password {
            Some(expected) if expected != credential => {
                Err(NodeError::Transport(constants::ERR_AUTH_FAILED.to_string()))
            }
            _ => {
                self.authenticated = true;
                Ok(())
            }
        }
    }

    async fn publish(&mut self, channel: &str, message: &str) -> Result<()> {
        self.ensure_authenticated()?;
        if self.bus.fail_publishes.load(Ordering::SeqCst) {
            return Err(NodeError::Transport(constants::ERR_BUS_UNAVAILABLE.to_string()));
        }

        self.bus.published.fetch_add(1, Ordering::SeqCst);
        // No subscribers is not an error on a pub/sub bus.
        let receivers = self
            .bus
            .sender
            .send(InboundMessage::new(channel, message))
            .unwrap_or(0);
        debug!(channel, receivers, "Published message on memory bus");
        Ok(())
    }
}

impl Transport for MemoryBus {
    type Connection = MemoryConnection;

    async fn connect(&self, host: &str, port: u16) -> Result<MemoryConnection> {
        if self.inner.fail_connects.load(Ordering::SeqCst) {
            return Err(NodeError::Transport(format!(
                "{}: cannot reach {host}:{port}",
                constants::ERR_BUS_UNAVAILABLE
            )));
        }

        self.inner.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            bus: self.inner.clone(),
            authenticated: self.inner.password.is_none(),
        })
    }

    async fn subscribe(&self, connection: MemoryConnection, channel: &str) -> Result<Subscription> {
        connection.ensure_authenticated()?;

        let channel = channel.to_string();
        let stream = BroadcastStream::new(self.inner.sender.subscribe()).filter_map(move |item| {
            let delivered = match item {
                Ok(message) if message.channel == channel => Some(Ok(message)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                    None
                }
            };
            futures::future::ready(delivered)
        });

        Ok(stream.boxed())
    }
}
