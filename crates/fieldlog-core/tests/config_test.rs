//! Config tests: defaults, partial TOML, validation failures.

use fieldlog_core::config::{FieldlogConfig, LogFormat};
use fieldlog_core::errors::FieldlogError;

#[test]
fn empty_document_yields_defaults() {
    let config = FieldlogConfig::from_toml("").unwrap();
    assert_eq!(config.queue.batch_size, 50);
    assert_eq!(config.queue.expiry_hours, 24);
    assert_eq!(config.optimistic.timeout_ms, 30_000);
    assert_eq!(config.optimistic.max_retries, 3);
    assert_eq!(config.echo.timestamp_window_ms, 50);
    assert_eq!(config.conflicts.auto_dismiss_days, 7);
    assert_eq!(config.protection.active_visit_timeout_ms, 300_000);
    assert_eq!(config.sync.completion_dedupe_window_ms, 5_000);
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn partial_sections_merge_with_defaults() {
    let config = FieldlogConfig::from_toml(
        r#"
        [queue]
        batch_size = 10

        [logging]
        filter = "fieldlog_sync=debug"
        format = "json"
        "#,
    )
    .unwrap();
    assert_eq!(config.queue.batch_size, 10);
    assert_eq!(config.queue.max_attempts, 5);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.filter, "fieldlog_sync=debug");
}

#[test]
fn protection_timeout_above_one_hour_rejected() {
    let err = FieldlogConfig::from_toml(
        r#"
        [protection]
        restore_timeout_ms = 7200000
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FieldlogError::ConfigError(_)));
}

#[test]
fn zero_batch_size_rejected() {
    assert!(FieldlogConfig::from_toml("[queue]\nbatch_size = 0").is_err());
}

#[test]
fn malformed_toml_is_config_error() {
    let err = FieldlogConfig::from_toml("[queue\nbatch_size = ").unwrap_err();
    assert!(matches!(err, FieldlogError::ConfigError(_)));
}

#[test]
fn to_toml_round_trips() {
    let config = FieldlogConfig::default();
    let text = config.to_toml().unwrap();
    let parsed = FieldlogConfig::from_toml(&text).unwrap();
    assert_eq!(parsed.queue.batch_size, config.queue.batch_size);
    assert_eq!(parsed.protection.day_session_timeout_ms, 60_000);
}

#[test]
fn load_reads_file() {
    let dir = std::env::temp_dir().join(format!("fieldlog-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("fieldlog.toml");
    std::fs::write(&path, "[sync]\nstart_online = false\n").unwrap();

    let config = FieldlogConfig::load(&path).unwrap();
    assert!(!config.sync.start_online);

    std::fs::remove_dir_all(&dir).unwrap();
}
