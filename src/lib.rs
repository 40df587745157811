//! # Packet Node
//!
//! Typed messaging over a shared publish/subscribe channel.
//!
//! Components exchange strongly typed packets without hand-rolling
//! encoding, routing or dispatch:
//!
//! - [`PacketRegistry`] maps numeric ids to packet factories, bijectively
//! - [`MessageCodec`] turns a packet into one `"<id>;<payload>"` text message and back
//! - [`ListenerRegistry`] fans decoded packets out to every handler bound to their type
//! - [`Node`] publishes through a pooled bus connection and runs the receive loop
//!
//! The bus itself is abstracted by the [`transport::Transport`] trait; an
//! in-process [`MemoryBus`] is included.
//!
//! ## Non-goals
//! No request/response correlation, no acknowledgements, no guaranteed
//! delivery and no schema versioning.

pub mod config;
pub mod core;
pub mod error;
pub mod node;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::NodeConfig;
pub use crate::core::codec::MessageCodec;
pub use crate::core::packet::{JsonPacket, Packet, PacketId};
pub use crate::core::registry::PacketRegistry;
pub use crate::error::{NodeError, Result};
pub use crate::node::{MessageOutcome, Node};
pub use crate::protocol::dispatcher::{
    Bindings, HandlerError, HandlerResult, ListenerRegistry, PacketListener,
};
pub use crate::transport::memory::MemoryBus;

/// Common imports for building a node
pub mod prelude {
    pub use crate::config::NodeConfig;
    pub use crate::core::packet::{JsonPacket, Packet, PacketId};
    pub use crate::core::registry::PacketRegistry;
    pub use crate::error::{NodeError, Result};
    pub use crate::node::Node;
    pub use crate::protocol::dispatcher::{
        Bindings, HandlerResult, ListenerRegistry, PacketListener,
    };
    pub use crate::transport::memory::MemoryBus;
    pub use crate::transport::{Connection, Transport};
}
