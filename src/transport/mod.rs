//! # Transport Layer
//!
//! The publish/subscribe bus a node sits on.
//!
//! A [`Transport`] opens [`Connection`]s to a bus at `host:port`; a connection
//! can authenticate and publish, or be turned into a [`Subscription`] stream of
//! inbound messages for one channel. Publishing connections are pooled by
//! [`pool::ConnectionPool`] and released after every use.
//!
//! ## Implementations
//! - **memory**: in-process bus over a tokio broadcast channel
//!
//! Any other bus (Redis, NATS, ...) plugs in by implementing the two traits.

use crate::error::Result;
use futures::stream::BoxStream;
use std::future::Future;

pub mod memory;
pub mod pool;

/// One message delivered by a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    pub payload: String,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of inbound messages. Ends when the bus closes the subscription.
pub type Subscription = BoxStream<'static, Result<InboundMessage>>;

/// A single connection handle to the bus
pub trait Connection: Send + 'static {
    /// Authenticate this connection with a shared credential
    fn authenticate(&mut self, credential: &str) -> impl Future<Output = Result<()>> + Send;

    /// Publish `message` on `channel`
    fn publish(&mut self, channel: &str, message: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Factory for bus connections and subscriptions
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    /// Open a new connection to the bus
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;

    /// Turn a (possibly authenticated) connection into a subscription on `channel`
    fn subscribe(
        &self,
        connection: Self::Connection,
        channel: &str,
    ) -> impl Future<Output = Result<Subscription>> + Send;
}
