//! # Error Types
//!
//! Error handling for packet registration, encoding, transport and dispatch.
//!
//! ## Error Categories
//! - **Registration**: duplicate packet ids or packet types
//! - **Serialization / Deserialization**: packet payloads that cannot be encoded or decoded
//! - **Transport**: connect, authenticate, publish and subscribe failures
//! - **Dispatch**: a listener failed while handling a packet
//!
//! Nothing in this crate is process-fatal; every error is either returned to
//! the caller or logged and skipped by the receive loop.
//!
//! ## Example Usage
//! ```rust
//! use packet_node::error::{NodeError, Result};
//! use tracing::error;
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|e| NodeError::ConfigError(format!("bad port: {e}")))
//! }
//!
//! if let Err(e) = parse_port("http") {
//!     error!(error = %e, "Invalid configuration");
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Lock errors
    pub const ERR_PACKET_REGISTRY_LOCK: &str = "Packet registry lock poisoned";
    pub const ERR_LISTENER_REGISTRY_LOCK: &str = "Listener registry lock poisoned";

    /// Codec errors
    pub const ERR_EMPTY_SERIALIZATION: &str = "Packet cannot generate empty serialized data";
    pub const ERR_NON_OBJECT_SERIALIZATION: &str = "Packet must serialize to a JSON object";
    pub const ERR_MISSING_SEPARATOR: &str = "Message has no id separator";
    pub const ERR_PAYLOAD_NOT_OBJECT: &str = "Payload is not a JSON object";

    /// Transport errors
    pub const ERR_POOL_EXHAUSTED: &str = "Connection pool exhausted";
    pub const ERR_POOL_CLOSED: &str = "Connection pool closed";
    pub const ERR_AUTH_FAILED: &str = "Authentication failed";
    pub const ERR_NOT_AUTHENTICATED: &str = "Connection is not authenticated";
    pub const ERR_BUS_UNAVAILABLE: &str = "Bus unavailable";
}

/// NodeError is the primary error type for all node operations
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Node is not running")]
    NotRunning,
}

/// Type alias for Results using NodeError
pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = NodeError::Registration("id 7 already registered".into());
        assert_eq!(err.to_string(), "Registration error: id 7 already registered");

        let err = NodeError::Transport(constants::ERR_POOL_EXHAUSTED.into());
        assert_eq!(err.to_string(), "Transport error: Connection pool exhausted");
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: NodeError = json_err.into();
        assert!(matches!(err, NodeError::Json(_)));
    }
}
