//! # Message Codec
//!
//! Converts packets to and from single wire-format text messages.
//!
//! ## Wire Format
//! ```text
//! <decimal id>;<payload>
//! ```
//! The payload is the packet's structured value rendered by the injected
//! [`PayloadParser`]. Decoding splits at the **first** `;` only: the id is a
//! plain integer and never contains the separator, so everything after it
//! belongs to the payload, separators included.
//!
//! An id with no registered packet type decodes to `None` rather than an
//! error, so nodes that support different packet subsets can share a channel.

use crate::core::packet::{Packet, PacketId};
use crate::core::registry::PacketRegistry;
use crate::core::serialization::{JsonParser, PayloadParser};
use crate::error::{constants, NodeError, Result};
use serde_json::Value;
use std::sync::Arc;

/// Separator between the id and the payload
pub const SEPARATOR: char = ';';

/// Default upper bound on an inbound message (1 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Encoder/decoder bound to a packet registry and payload parser
#[derive(Clone)]
pub struct MessageCodec {
    registry: Arc<PacketRegistry>,
    parser: Arc<dyn PayloadParser>,
    max_message_size: usize,
}

impl MessageCodec {
    /// Codec using compact JSON payloads
    pub fn new(registry: Arc<PacketRegistry>) -> Self {
        Self::with_parser(registry, Arc::new(JsonParser))
    }

    pub fn with_parser(registry: Arc<PacketRegistry>, parser: Arc<dyn PayloadParser>) -> Self {
        Self {
            registry,
            parser,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Reject inbound messages larger than `limit` bytes
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }

    /// Encode a packet as `"<id>;<payload>"`.
    pub fn encode(&self, packet: &dyn Packet) -> Result<String> {
        let value = packet.serialize()?;
        match value {
            Value::Null => {
                return Err(NodeError::Serialization(
                    constants::ERR_EMPTY_SERIALIZATION.to_string(),
                ))
            }
            Value::Object(_) => {}
            _ => {
                return Err(NodeError::Serialization(
                    constants::ERR_NON_OBJECT_SERIALIZATION.to_string(),
                ))
            }
        }

        let payload = self.parser.render(&value)?;
        Ok(format!("{}{SEPARATOR}{payload}", packet.id()))
    }

    /// Decode a raw message into a packet.
    ///
    /// `Ok(None)` means the id is not registered on this node.
    pub fn decode(&self, raw: &str) -> Result<Option<Box<dyn Packet>>> {
        if raw.len() > self.max_message_size {
            return Err(NodeError::Deserialization(format!(
                "message of {} bytes exceeds limit of {} bytes",
                raw.len(),
                self.max_message_size
            )));
        }

        let (id, payload) = split_message(raw)?;

        let Some(mut packet) = self.registry.build(id)? else {
            return Ok(None);
        };

        let value = self.parser.parse(payload)?;
        if !value.is_object() {
            return Err(NodeError::Deserialization(
                constants::ERR_PAYLOAD_NOT_OBJECT.to_string(),
            ));
        }

        packet
            .deserialize(value)
            .map_err(|e| match e {
                NodeError::Deserialization(_) => e,
                other => NodeError::Deserialization(other.to_string()),
            })?;
        Ok(Some(packet))
    }
}

/// Split a raw message into its id and payload at the first separator.
pub fn split_message(raw: &str) -> Result<(PacketId, &str)> {
    let (id, payload) = raw.split_once(SEPARATOR).ok_or_else(|| {
        NodeError::Deserialization(constants::ERR_MISSING_SEPARATOR.to_string())
    })?;

    let id = id
        .parse::<PacketId>()
        .map_err(|e| NodeError::Deserialization(format!("invalid packet id {id:?}: {e}")))?;

    Ok((id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::JsonPacket;
    use serde::{Deserialize, Serialize};
    use std::any::Any;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Ping {
        ts: u64,
    }

    impl JsonPacket for Ping {
        const ID: PacketId = 1;
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl JsonPacket for Note {
        const ID: PacketId = 2;
    }

    struct Silent;

    impl Packet for Silent {
        fn id(&self) -> PacketId {
            3
        }
        fn serialize(&self) -> Result<Value> {
            Ok(Value::Null)
        }
        fn deserialize(&mut self, _data: Value) -> Result<()> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Scalar;

    impl Packet for Scalar {
        fn id(&self) -> PacketId {
            4
        }
        fn serialize(&self) -> Result<Value> {
            Ok(Value::from(7))
        }
        fn deserialize(&mut self, _data: Value) -> Result<()> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn codec() -> MessageCodec {
        let registry = Arc::new(PacketRegistry::new());
        registry.register::<Ping>().unwrap();
        registry.register::<Note>().unwrap();
        MessageCodec::new(registry)
    }

    #[test]
    fn test_encode_ping() {
        let encoded = codec().encode(&Ping { ts: 123 }).unwrap();
        assert_eq!(encoded, r#"1;{"ts":123}"#);
    }

    #[test]
    fn test_decode_ping() {
        let packet = codec().decode(r#"1;{"ts":123}"#).unwrap().unwrap();
        let ping = packet.downcast_ref::<Ping>().unwrap();
        assert_eq!(ping, &Ping { ts: 123 });
        assert_eq!(packet.id(), 1);
    }

    #[test]
    fn test_unknown_id_is_none() {
        assert!(codec().decode("99;{}").unwrap().is_none());
    }

    #[test]
    fn test_payload_keeps_separators() {
        let codec = codec();
        let note = Note {
            text: "a;b;;c;".into(),
        };
        let encoded = codec.encode(&note).unwrap();
        let decoded = codec.decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded.downcast_ref::<Note>(), Some(&note));
    }

    #[test]
    fn test_empty_serialization_rejected() {
        let err = codec().encode(&Silent).unwrap_err();
        assert!(matches!(err, NodeError::Serialization(_)));
    }

    #[test]
    fn test_non_object_serialization_rejected() {
        let err = codec().encode(&Scalar).unwrap_err();
        assert!(matches!(err, NodeError::Serialization(_)));
    }

    #[test]
    fn test_malformed_messages() {
        let codec = codec();
        for raw in [
            "",
            "1",
            "abc;{}",
            ";{}",
            " 1 ;{}",
            "1 ;{}",
            "1;{",
            "1;[1,2]",
            r#"1;{"ts":"x"}"#,
        ] {
            let result = codec.decode(raw);
            assert!(
                matches!(result, Err(NodeError::Deserialization(_))),
                "expected deserialization error for {raw:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_unknown_id_skips_payload_parsing() {
        assert!(codec().decode("77;not json at all").unwrap().is_none());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let codec = codec().with_max_message_size(16);
        let raw = format!(r#"2;{{"text":"{}"}}"#, "x".repeat(32));
        assert!(matches!(
            codec.decode(&raw),
            Err(NodeError::Deserialization(_))
        ));
    }

    #[test]
    fn test_split_message() {
        assert_eq!(split_message("-5;x;y").unwrap(), (-5, "x;y"));
        assert_eq!(split_message("8;").unwrap(), (8, ""));
        assert!(split_message(" 8 ;").is_err());
        assert!(split_message("9").is_err());
    }
}
