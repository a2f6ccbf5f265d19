use millrace::config::Config;
use millrace::core::{MillraceError, Snapshot};
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    config.validate().unwrap();
}

#[test]
fn test_empty_document_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.server.port, 8090);
    assert_eq!(config.scheduler.interval, Duration::from_secs(5));
    assert!(config.endpoints.contains_key("list_endpoints"));
}

#[test]
fn test_toml_round_trip_clears_source() {
    let mut config = Config::default();
    config.source = Some("db:application".to_string());
    config.block_ua.activated = true;
    config.block_ua.regexp = "curl|wget".to_string();

    let encoded = config.to_toml().unwrap();
    let decoded = Config::from_toml(&encoded).unwrap();

    config.source = None;
    assert_eq!(config, decoded);
}

#[test]
fn test_humantime_durations_parse() {
    let config = Config::from_toml(
        r#"
        [log]
        flush_interval = "250ms"

        [scheduler]
        interval = "30s"
        backoff_base = "1m"
        backoff_max = "2h"
        "#,
    )
    .unwrap();
    assert_eq!(config.log.flush_interval, Duration::from_millis(250));
    assert_eq!(config.scheduler.interval, Duration::from_secs(30));
    assert_eq!(config.scheduler.backoff_base, Duration::from_secs(60));
    assert_eq!(config.scheduler.backoff_max, Duration::from_secs(7200));
}

#[test]
fn test_validate_rejects_zero_port() {
    let err = Config::from_toml("[server]\nport = 0").unwrap_err();
    assert!(matches!(err, MillraceError::ConfigValidation(_)));
}

#[test]
fn test_validate_rejects_bad_share_percent() {
    let err = Config::from_toml("[block_ip]\nmax_share_percent = 0").unwrap_err();
    assert!(matches!(err, MillraceError::ConfigValidation(_)));

    let err = Config::from_toml("[block_ip]\nmax_share_percent = 101").unwrap_err();
    assert!(matches!(err, MillraceError::ConfigValidation(_)));
}

#[test]
fn test_validate_rejects_malformed_endpoint() {
    let err = Config::from_toml("[endpoints]\nbroken = \"/no-method\"").unwrap_err();
    assert!(matches!(err, MillraceError::ConfigValidation(_)));
}

#[test]
fn test_validate_rejects_empty_ua_pattern_when_activated() {
    let err = Config::from_toml("[block_ua]\nactivated = true").unwrap_err();
    assert!(matches!(err, MillraceError::ConfigValidation(_)));
}

#[test]
fn test_validate_rejects_backoff_max_below_base() {
    let err = Config::from_toml(
        "[scheduler]\nbackoff_base = \"1m\"\nbackoff_max = \"30s\"",
    )
    .unwrap_err();
    assert!(matches!(err, MillraceError::ConfigValidation(_)));
}

#[test]
fn test_snapshot_resolves_endpoints() {
    let snapshot = Snapshot::build(Config::default()).unwrap();
    assert_eq!(
        snapshot.resolve(&axum::http::Method::GET, "/api/list-endpoints"),
        Some("list_endpoints")
    );
    assert_eq!(
        snapshot.resolve(&axum::http::Method::POST, "/api/list-endpoints"),
        None
    );
    assert_eq!(snapshot.resolve(&axum::http::Method::GET, "/nope"), None);
}

#[test]
fn test_snapshot_rejects_invalid_ua_regex() {
    let mut config = Config::default();
    config.block_ua.activated = true;
    config.block_ua.regexp = "(unclosed".to_string();
    let err = Snapshot::build(config).unwrap_err();
    assert!(matches!(err, MillraceError::ConfigValidation(_)));
}

#[test]
fn test_snapshot_compiles_ua_regex() {
    let mut config = Config::default();
    config.block_ua.activated = true;
    config.block_ua.regexp = "(?i)badbot".to_string();
    let snapshot = Snapshot::build(config).unwrap();
    let pattern = snapshot.ua_regex.as_ref().unwrap();
    assert!(pattern.is_match("Mozilla BadBot/1.0"));
    assert!(!pattern.is_match("Mozilla/5.0"));
}
