//! Config bootstrap: create-then-exit when missing, load otherwise.

use dockwatch_agent::config::{ensure_config, load_config, AgentConfig, ConfigError};
use std::fs;

#[test]
fn missing_config_is_created_with_defaults_and_reported() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("nested").join("config.json");

    let err = ensure_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Created(ref p) if p == &path));
    assert!(err.to_string().contains("config.json"));

    let written: AgentConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, AgentConfig::default());
    assert_eq!(written.ip, "127.0.0.1:8080");
    assert_eq!(written.token, "your_token_here");

    // second run picks the file up
    assert_eq!(ensure_config(&path).unwrap(), AgentConfig::default());
}

#[test]
fn existing_config_loads_wire_field_names() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("config.json");
    fs::write(&path, r#"{"Ip": "10.1.2.3:9000", "Token": "abc"}"#).unwrap();
    let cfg = ensure_config(&path).unwrap();
    assert_eq!(cfg.ip, "10.1.2.3:9000");
    assert_eq!(cfg.token, "abc");
}

#[test]
fn malformed_or_incomplete_config_is_an_error() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("config.json");

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));

    fs::write(&path, r#"{"Ip": "  ", "Token": "abc"}"#).unwrap();
    assert!(matches!(
        load_config(&path),
        Err(ConfigError::MissingAddress(_))
    ));

    fs::write(&path, r#"{"Token": "abc"}"#).unwrap();
    assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
}
