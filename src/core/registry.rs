//! # Packet Registry
//!
//! Bijective mapping between numeric packet ids and packet factories.
//!
//! Each registered packet type owns exactly one id and each id belongs to
//! exactly one type; registration checks both directions. Instances are built
//! through an explicit factory per id, never through reflection.
//!
//! The maps sit behind a `RwLock`, so registering after the receive loop has
//! started is safe: writers take the lock for every insert and decoding takes
//! it for every lookup.

use crate::core::packet::{Packet, PacketId};
use crate::error::{constants, NodeError, Result};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

type FactoryFn = dyn Fn() -> Result<Box<dyn Packet>> + Send + Sync + 'static;

struct Entry {
    type_id: TypeId,
    type_name: &'static str,
    factory: Arc<FactoryFn>,
}

#[derive(Default)]
struct Maps {
    by_id: HashMap<PacketId, Entry>,
    by_type: HashMap<TypeId, PacketId>,
}

/// Registry of packet types known to a node
#[derive(Default)]
pub struct PacketRegistry {
    maps: RwLock<Maps>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `P`, deriving its id from a default instance.
    pub fn register<P: Packet + Default>(&self) -> Result<PacketId> {
        self.register_with(|| Ok(P::default()))
    }

    /// Register `P` with an explicit factory. The id is read from one
    /// instance produced by the factory.
    pub fn register_with<P, F>(&self, factory: F) -> Result<PacketId>
    where
        P: Packet,
        F: Fn() -> Result<P> + Send + Sync + 'static,
    {
        let id = factory()?.id();
        let type_id = TypeId::of::<P>();

        let mut maps = self
            .maps
            .write()
            .map_err(|_| NodeError::LockPoisoned(constants::ERR_PACKET_REGISTRY_LOCK))?;

        if let Some(existing) = maps.by_id.get(&id) {
            return Err(NodeError::Registration(format!(
                "packet id {id} is already registered to {}",
                existing.type_name
            )));
        }
        if let Some(existing_id) = maps.by_type.get(&type_id) {
            return Err(NodeError::Registration(format!(
                "packet type {} is already registered under id {existing_id}",
                type_name::<P>()
            )));
        }

        maps.by_id.insert(
            id,
            Entry {
                type_id,
                type_name: type_name::<P>(),
                factory: Arc::new(move || factory().map(|p| Box::new(p) as Box<dyn Packet>)),
            },
        );
        maps.by_type.insert(type_id, id);

        debug!(id, packet = type_name::<P>(), "Registered packet type");
        Ok(id)
    }

    /// Build a fresh instance of the type registered under `id`.
    ///
    /// Returns `Ok(None)` for an unknown id. A failing factory surfaces as an error.
    pub fn build(&self, id: PacketId) -> Result<Option<Box<dyn Packet>>> {
        let factory = {
            let maps = self
                .maps
                .read()
                .map_err(|_| NodeError::LockPoisoned(constants::ERR_PACKET_REGISTRY_LOCK))?;
            match maps.by_id.get(&id) {
                Some(entry) => entry.factory.clone(),
                None => return Ok(None),
            }
        };

        let packet = factory()?;
        if packet.id() != id {
            return Err(NodeError::Deserialization(format!(
                "factory for id {id} built a packet with id {}",
                packet.id()
            )));
        }
        Ok(Some(packet))
    }

    /// Whether an id is registered
    pub fn contains(&self, id: PacketId) -> bool {
        self.maps
            .read()
            .map(|m| m.by_id.contains_key(&id))
            .unwrap_or(false)
    }

    /// Id assigned to `P`, if registered
    pub fn id_of<P: Packet>(&self) -> Option<PacketId> {
        self.maps
            .read()
            .ok()
            .and_then(|m| m.by_type.get(&TypeId::of::<P>()).copied())
    }

    /// Whether `id` is registered to exactly `P`
    pub fn is_registered_as<P: Packet>(&self, id: PacketId) -> bool {
        self.maps
            .read()
            .map(|m| {
                m.by_id
                    .get(&id)
                    .is_some_and(|e| e.type_id == TypeId::of::<P>())
            })
            .unwrap_or(false)
    }

    /// Number of registered packet types
    pub fn len(&self) -> usize {
        self.maps.read().map(|m| m.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<PacketId> {
        let mut ids: Vec<PacketId> = self
            .maps
            .read()
            .map(|m| m.by_id.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}
