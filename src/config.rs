//! # Configuration Management
//!
//! Centralized configuration for a packet node.
//!
//! This module provides structured configuration for the node's channel, the
//! bus connection (host, port, credential, pool sizing) and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Example
//! ```toml
//! [node]
//! channel = "game-events"
//!
//! [transport]
//! host = "10.0.0.5"
//! port = 6379
//! password = "hunter2"
//! pool_size = 8
//! acquire_timeout = 2000
//! ```

use crate::core::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default channel a node publishes to and listens on
pub const DEFAULT_CHANNEL: &str = "packet-node";

/// Default bus port (the conventional Redis port)
pub const DEFAULT_PORT: u16 = 6379;

/// Default number of pooled publishing connections
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Default wait for a free pooled connection
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NodeConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeSection,

    /// Bus connection configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Configuration for `channel` on `host:port`, everything else default
    pub fn new(channel: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::default_with_overrides(|c| {
            c.node.channel = channel.into();
            c.transport.host = host.into();
            c.transport.port = port;
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| NodeError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| NodeError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| NodeError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PACKET_NODE_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(channel) = lookup("PACKET_NODE_CHANNEL") {
            self.node.channel = channel;
        }

        if let Some(host) = lookup("PACKET_NODE_HOST") {
            self.transport.host = host;
        }

        if let Some(port) = lookup("PACKET_NODE_PORT") {
            self.transport.port = port.parse::<u16>().map_err(|e| {
                NodeError::ConfigError(format!("Invalid PACKET_NODE_PORT '{port}': {e}"))
            })?;
        }

        if let Some(password) = lookup("PACKET_NODE_PASSWORD") {
            self.transport.password = Some(password);
        }

        if let Some(size) = lookup("PACKET_NODE_POOL_SIZE") {
            self.transport.pool_size = size.parse::<usize>().map_err(|e| {
                NodeError::ConfigError(format!("Invalid PACKET_NODE_POOL_SIZE '{size}': {e}"))
            })?;
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NodeError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| NodeError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.node.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NodeError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Node-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSection {
    /// Channel this node publishes to and listens on (matched case-insensitively)
    pub channel: String,

    /// Largest inbound message accepted by the decoder, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            channel: String::from(DEFAULT_CHANNEL),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl NodeSection {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.channel.trim().is_empty() {
            errors.push("Channel name cannot be empty".to_string());
        }

        if self.max_message_size < 16 {
            errors.push("Max message size too small (minimum: 16 bytes)".to_string());
        } else if self.max_message_size > 512 * 1024 * 1024 {
            errors.push(format!(
                "Max message size too large: {} bytes (maximum: 512 MB)",
                self.max_message_size
            ));
        }

        errors
    }
}

/// Bus connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Bus host name or address
    pub host: String,

    /// Bus port
    pub port: u16,

    /// Optional credential; an empty string means none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Maximum pooled publishing connections
    pub pool_size: usize,

    /// How long a send waits for a free pooled connection
    #[serde(with = "duration_serde")]
    pub acquire_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_PORT,
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Credential to authenticate with, if any
    pub fn credential(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Transport host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Transport port cannot be 0".to_string());
        }

        if self.pool_size == 0 {
            errors.push("Pool size must be greater than 0".to_string());
        } else if self.pool_size > 1024 {
            errors.push(format!(
                "Pool size too large: {} (maximum: 1024)",
                self.pool_size
            ));
        }

        if self.acquire_timeout.as_millis() < 10 {
            errors.push("Acquire timeout too short (minimum: 10ms)".to_string());
        } else if self.acquire_timeout.as_secs() > 300 {
            errors.push("Acquire timeout too long (maximum: 300s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name, recorded when logging is initialized
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to stdout; with both outputs off, logging stays uninstalled
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("packet-node"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
