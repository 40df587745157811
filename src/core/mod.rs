//! # Core Packet Components
//!
//! Packet capability, packet registry, payload parsing and the wire codec.
//!
//! ## Components
//! - **Packet**: typed message trait with a stable numeric id
//! - **Registry**: bijective id to packet-factory mapping
//! - **Serialization**: structured payload parser injected into the codec
//! - **Codec**: packet to wire-text conversion
//!
//! ## Wire Format
//! ```text
//! <decimal id>;<payload>
//! ```
//! UTF-8 text with no version field, length prefix or checksum.

pub mod codec;
pub mod packet;
pub mod registry;
pub mod serialization;
