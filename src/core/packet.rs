//! # Packet
//!
//! The capability every message type exchanged over a channel must implement.
//!
//! A packet has a stable numeric id, renders itself to a structured JSON value
//! and can populate a fresh instance from such a value. Concrete packet types
//! are defined by callers, not by this crate.
//!
//! Most packets are plain serde structs; implementing [`JsonPacket`] is enough
//! to get [`Packet`] for free:
//!
//! ```rust
//! use packet_node::core::packet::{JsonPacket, Packet};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Ping {
//!     ts: u64,
//! }
//!
//! impl JsonPacket for Ping {
//!     const ID: i32 = 1;
//! }
//!
//! assert_eq!(Ping::default().id(), 1);
//! ```

use crate::error::{NodeError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;

/// Numeric packet type identifier carried on the wire
pub type PacketId = i32;

/// A typed message with a stable numeric identity and a serialize/deserialize contract.
pub trait Packet: Any + Send + Sync + 'static {
    /// Stable id, unique across all packet types sharing a channel
    fn id(&self) -> PacketId;

    /// Render this packet as a structured value. Must not be `Null` on success.
    fn serialize(&self) -> Result<Value>;

    /// Populate this (freshly built) instance from a structured value.
    fn deserialize(&mut self, data: Value) -> Result<()>;

    /// Runtime type access used for listener matching.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Packet {
    /// Downcast to a concrete packet type
    pub fn downcast_ref<P: Packet>(&self) -> Option<&P> {
        self.as_any().downcast_ref::<P>()
    }

    /// Whether this packet is an instance of `P`
    pub fn is<P: Packet>(&self) -> bool {
        self.as_any().is::<P>()
    }
}

impl std::fmt::Debug for dyn Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet").field("id", &self.id()).finish()
    }
}

/// Serde-backed packet. Any `Serialize + DeserializeOwned + Default` struct
/// becomes a [`Packet`] by naming its id.
///
/// With `serde::Serialize` in scope, call the packet methods as
/// `Packet::serialize(&p)` to avoid the name clash.
pub trait JsonPacket: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    const ID: PacketId;
}

impl<T: JsonPacket> Packet for T {
    fn id(&self) -> PacketId {
        T::ID
    }

    fn serialize(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| NodeError::Serialization(e.to_string()))
    }

    fn deserialize(&mut self, data: Value) -> Result<()> {
        *self = serde_json::from_value(data)
            .map_err(|e| NodeError::Deserialization(e.to_string()))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
