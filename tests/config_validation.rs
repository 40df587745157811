//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use packet_node::config::{
    LoggingConfig, NodeConfig, TransportConfig, DEFAULT_CHANNEL, DEFAULT_POOL_SIZE,
};
use packet_node::error::NodeError;
use std::collections::HashMap;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = NodeConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_empty_channel() {
    let mut config = NodeConfig::default();
    config.node.channel = "   ".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Channel name cannot be empty")));
}

#[test]
fn test_message_size_bounds() {
    let mut config = NodeConfig::default();
    config.node.max_message_size = 4;
    assert!(config.validate().iter().any(|e| e.contains("too small")));

    config.node.max_message_size = 1024 * 1024 * 1024;
    assert!(config.validate().iter().any(|e| e.contains("too large")));
}

#[test]
fn test_empty_host_and_zero_port() {
    let mut config = NodeConfig::default();
    config.transport.host = String::new();
    config.transport.port = 0;

    let errors = config.validate();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|e| e.contains("host cannot be empty")));
    assert!(errors.iter().any(|e| e.contains("port cannot be 0")));
}

#[test]
fn test_pool_size_bounds() {
    let mut config = TransportConfig {
        pool_size: 0,
        ..TransportConfig::default()
    };
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Pool size must be greater than 0")));

    config.pool_size = 5000;
    assert!(config.validate().iter().any(|e| e.contains("Pool size too large")));
}

#[test]
fn test_acquire_timeout_bounds() {
    let mut config = TransportConfig {
        acquire_timeout: Duration::from_millis(1),
        ..TransportConfig::default()
    };
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Acquire timeout too short")));

    config.acquire_timeout = Duration::from_secs(600);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Acquire timeout too long")));
}

#[test]
fn test_empty_password_is_no_credential() {
    let mut config = TransportConfig::default();
    assert_eq!(config.credential(), None);

    config.password = Some(String::new());
    assert_eq!(config.credential(), None);

    config.password = Some("hunter2".into());
    assert_eq!(config.credential(), Some("hunter2"));
}

#[test]
fn test_logging_validation() {
    let config = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..LoggingConfig::default()
    };
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));

    // Both outputs off means logging is simply not installed.
    let config = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..LoggingConfig::default()
    };
    assert!(config.validate().is_empty());

    let config = LoggingConfig {
        log_to_file: true,
        log_file_path: Some("/nonexistent/dir/node.log".into()),
        ..LoggingConfig::default()
    };
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Log file directory does not exist")));
}

#[test]
fn test_validate_strict_collects_all_errors() {
    let mut config = NodeConfig::default();
    config.node.channel = String::new();
    config.transport.pool_size = 0;

    match config.validate_strict() {
        Err(NodeError::ConfigError(msg)) => {
            assert!(msg.contains("Channel name cannot be empty"));
            assert!(msg.contains("Pool size must be greater than 0"));
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_from_toml_partial() {
    let config = NodeConfig::from_toml(
        r#"
        [node]
        channel = "game-events"

        [transport]
        host = "10.0.0.5"
        port = 6380
        password = "hunter2"
        pool_size = 4
        acquire_timeout = 250

        [logging]
        app_name = "game"
        log_level = "debug"
        log_to_console = true
        log_to_file = false
        json_format = true
        "#,
    )
    .unwrap();

    assert_eq!(config.node.channel, "game-events");
    assert_eq!(config.transport.host, "10.0.0.5");
    assert_eq!(config.transport.port, 6380);
    assert_eq!(config.transport.credential(), Some("hunter2"));
    assert_eq!(config.transport.pool_size, 4);
    assert_eq!(config.transport.acquire_timeout, Duration::from_millis(250));
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.logging.json_format);
    assert!(config.validate().is_empty());
}

#[test]
fn test_from_toml_defaults_missing_sections() {
    let config = NodeConfig::from_toml("").unwrap();
    assert_eq!(config.node.channel, DEFAULT_CHANNEL);
    assert_eq!(config.transport.pool_size, DEFAULT_POOL_SIZE);
}

#[test]
fn test_from_toml_rejects_bad_level() {
    let result = NodeConfig::from_toml(
        r#"
        [logging]
        app_name = "game"
        log_level = "loud"
        log_to_console = true
        log_to_file = false
        json_format = false
        "#,
    );
    assert!(matches!(result, Err(NodeError::ConfigError(_))));
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        ("PACKET_NODE_CHANNEL", "lobby"),
        ("PACKET_NODE_HOST", "bus.internal"),
        ("PACKET_NODE_PORT", "7000"),
        ("PACKET_NODE_PASSWORD", "pw"),
        ("PACKET_NODE_POOL_SIZE", "3"),
    ]
    .into_iter()
    .collect();

    let mut config = NodeConfig::default();
    config
        .apply_env(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.node.channel, "lobby");
    assert_eq!(config.transport.host, "bus.internal");
    assert_eq!(config.transport.port, 7000);
    assert_eq!(config.transport.credential(), Some("pw"));
    assert_eq!(config.transport.pool_size, 3);
}

#[test]
fn test_env_override_bad_port() {
    let mut config = NodeConfig::default();
    let result = config.apply_env(|key| (key == "PACKET_NODE_PORT").then(|| "70000".to_string()));
    assert!(matches!(result, Err(NodeError::ConfigError(_))));
}

#[test]
fn test_save_and_reload() {
    let path = std::env::temp_dir().join(format!("packet-node-config-{}.toml", std::process::id()));

    let config = NodeConfig::new("roundtrip", "localhost", 6390);
    config.save_to_file(&path).unwrap();
    let loaded = NodeConfig::from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.node.channel, "roundtrip");
    assert_eq!(loaded.transport.port, 6390);
    assert_eq!(loaded.transport.acquire_timeout, config.transport.acquire_timeout);
}

#[test]
fn test_missing_file() {
    let result = NodeConfig::from_file("/nonexistent/packet-node.toml");
    assert!(matches!(result, Err(NodeError::ConfigError(_))));
}

#[test]
fn test_example_config_parses() {
    let example = NodeConfig::example_config();
    let parsed = NodeConfig::from_toml(&example).unwrap();
    assert!(parsed.validate().is_empty());
}
