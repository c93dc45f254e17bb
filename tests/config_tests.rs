use std::collections::HashMap;
use std::time::Duration;

use wacc_kernel::config::{ConfigError, WaccConfig};

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_defaults() {
    let config = WaccConfig::default();
    assert_eq!(config.cache.capacity, 256);
    assert_eq!(config.cache.ttl(), Some(Duration::from_secs(300)));
    assert_eq!(config.telemetry.capacity, 10_000);
    assert!(config.telemetry.start_enabled);
    assert!(config.recovery.auto_recover);
    assert_eq!(config.recovery.max_retry_attempts, 3);
    assert_eq!(config.recovery.settle_delay(), Duration::from_millis(100));
    assert_eq!(config.recovery.telemetry_restart_delay(), Duration::from_secs(1));
    assert_eq!(config.validation.weight_tolerance, 0.01);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_json_keeps_defaults() {
    let config = WaccConfig::from_json_str(
        r#"{ "cache": { "ttl_secs": 0 }, "recovery": { "max_retry_attempts": 5 } }"#,
    )
    .unwrap();

    assert_eq!(config.cache.ttl(), None, "zero disables expiry");
    assert_eq!(config.cache.capacity, 256);
    assert_eq!(config.recovery.max_retry_attempts, 5);
    assert!(config.recovery.auto_recover);
}

#[test]
fn test_overrides_apply() {
    let config = WaccConfig::default()
        .with_overrides(&vars(&[
            ("WACC_CACHE_CAPACITY", "8"),
            ("WACC_TELEMETRY_ENABLED", "false"),
            ("WACC_AUTO_RECOVER", "false"),
            ("WACC_SETTLE_DELAY_MS", " 250 "),
            ("WACC_WEIGHT_TOLERANCE", "0.5"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

    assert_eq!(config.cache.capacity, 8);
    assert!(!config.telemetry.start_enabled);
    assert!(!config.recovery.auto_recover);
    assert_eq!(config.recovery.settle_delay_ms, 250);
    assert_eq!(config.validation.weight_tolerance, 0.5);
}

#[test]
fn test_bad_override_is_reported() {
    let err = WaccConfig::default()
        .with_overrides(&vars(&[("WACC_MAX_RETRY_ATTEMPTS", "many")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "WACC_MAX_RETRY_ATTEMPTS"));
}

#[test]
fn test_invalid_values_rejected() {
    let zero_attempts = WaccConfig::from_json_str(r#"{ "recovery": { "max_retry_attempts": 0 } }"#);
    assert!(matches!(zero_attempts, Err(ConfigError::Invalid(_))));

    let zero_cache = WaccConfig::default().with_overrides(&vars(&[("WACC_CACHE_CAPACITY", "0")]));
    assert!(matches!(zero_cache, Err(ConfigError::Invalid(_))));

    let negative = WaccConfig::from_json_str(r#"{ "validation": { "weight_tolerance": -1.0 } }"#);
    assert!(matches!(negative, Err(ConfigError::Invalid(_))));

    let malformed = WaccConfig::from_json_str("{ not json");
    assert!(matches!(malformed, Err(ConfigError::Parse(_))));
}

#[test]
fn test_missing_file() {
    let err = WaccConfig::from_file("/nonexistent/wacc.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
