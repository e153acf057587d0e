//! Integration tests for configuration files

use hid_async::HidConfig;
use std::fs;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[device]
poll_interval_ms = 20
read_buffer_size = 64
default_read_timeout_ms = 250

[logging]
log_level = "debug"
"#;

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = HidConfig::load(Some(path)).unwrap();
    assert_eq!(config.device.poll_interval_ms, 20);
    assert_eq!(config.device.read_buffer_size, 64);
    assert_eq!(config.device.default_read_timeout_ms, 250);
    assert_eq!(config.logging.log_level, "debug");
}

#[test]
fn test_empty_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "").unwrap();

    let config = HidConfig::load(Some(path)).unwrap();
    assert_eq!(config.device, HidConfig::default().device);
}

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = HidConfig::default();
    config.device.poll_interval_ms = 5;
    config.save(&path).unwrap();

    let loaded = HidConfig::load(Some(path)).unwrap();
    assert_eq!(loaded.device.poll_interval_ms, 5);
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[device]\nread_buffer_size = 0\n").unwrap();

    let err = HidConfig::load(Some(path)).unwrap_err();
    assert!(err.to_string().contains("read_buffer_size"));
}

#[test]
fn test_unparseable_file_names_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[device\npoll_interval_ms = ").unwrap();

    let err = HidConfig::load(Some(path)).unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_missing_file_is_error() {
    let dir = TempDir::new().unwrap();
    assert!(HidConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_init_logging_installs_once() {
    let config = HidConfig::default();
    assert!(config.init_logging().is_ok());

    // A second global subscriber is refused
    let err = config.init_logging().unwrap_err();
    assert!(matches!(err, common::Error::Logging(_)));
}
