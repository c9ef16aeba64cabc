//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::LogLevel;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_parley_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, parley_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[connection]
endpoint = "https://chat.internal:8443"
request_timeout_secs = 30

[context]
budget = 4000
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.connection.endpoint, "https://chat.internal:8443");
    assert_eq!(config.connection.request_timeout_secs, 30);
    assert_eq!(config.context.budget, 4000);
    // Defaults preserved
    assert_eq!(config.connection.connect_timeout_secs, 10);
    assert_eq!(config.connection.reconnection_attempts, 3);
    assert!(!config.context.include_open_files);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, parley_common::ConfigError::ParseError(_)));
}

#[test]
fn load_config_with_invalid_values_returns_parsed_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[connection]
poll_interval_ms = 500
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.connection.poll_interval_ms, 500);
}

#[test]
fn default_template_parses_to_defaults() {
    let content = template::default_config_toml();
    let config: crate::ParleyConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.connection.endpoint, "wss://assistant.example.dev");
    assert_eq!(config.context.budget, 12_000);
    assert!(config.followups.enabled);
}

#[test]
fn create_default_config_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.connection.socket_path, "/socket.io/");
}

#[test]
fn default_config_path_ends_with_parley() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("parley/config.toml"));
    }
}
