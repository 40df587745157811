//! # Payload Serialization
//!
//! Converts a packet's structured value to and from the text carried after the
//! id separator on the wire.
//!
//! The parser is an injected dependency of [`MessageCodec`](crate::core::codec::MessageCodec)
//! rather than process-wide state, so a node can be built with a different
//! rendering (or a counting/failing parser in tests) without touching globals.
//!
//! ## Usage
//! ```rust
//! use packet_node::core::serialization::{JsonParser, PayloadParser};
//! use serde_json::json;
//!
//! let parser = JsonParser;
//! let text = parser.render(&json!({"ts": 123})).unwrap();
//! assert_eq!(text, r#"{"ts":123}"#);
//! assert_eq!(parser.parse(&text).unwrap(), json!({"ts": 123}));
//! ```

use crate::error::{NodeError, Result};
use serde_json::Value;

/// Structured-data parser used inside the codec
pub trait PayloadParser: Send + Sync + 'static {
    /// Parse payload text into a structured value
    fn parse(&self, text: &str) -> Result<Value>;

    /// Render a structured value as payload text
    fn render(&self, value: &Value) -> Result<String>;

    /// Human-readable name, used in logs
    fn name(&self) -> &'static str;
}

/// Compact JSON, the default wire payload format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl PayloadParser for JsonParser {
    fn parse(&self, text: &str) -> Result<Value> {
        serde_json::from_str(text).map_err(|e| NodeError::Deserialization(e.to_string()))
    }

    fn render(&self, value: &Value) -> Result<String> {
        serde_json::to_string(value).map_err(|e| NodeError::Serialization(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "JSON"
    }
}
