// Integration tests for skein_api::config

use skein_api::{PoolConfig, PoolError};
use std::time::Duration;

#[test]
fn test_pool_config_defaults() {
    let config = PoolConfig::default();

    assert_eq!(config.min_units, 1);
    assert_eq!(config.max_units, num_cpus::get().max(1));
    assert_eq!(config.task_timeout, Duration::from_secs(30));
    assert_eq!(config.idle_timeout, Duration::from_secs(60));
    assert_eq!(config.max_retries, 2);
    assert!(config.enable_smart_scheduling);
    assert!(!config.enable_preheating);
    assert_eq!(config.unit_error_threshold, 3);
    assert_eq!(config.reap_interval, Duration::from_secs(10));
    assert_eq!(config.retry_base_delay, Duration::ZERO);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_inverted_bounds() {
    let config = PoolConfig::default().with_units(4, 2);
    match config.validate() {
        Err(PoolError::InvalidConfig(msg)) => assert!(msg.contains("min_units (4)")),
        other => panic!("expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn test_validate_rejects_zero_max_units() {
    let config = PoolConfig::default().with_units(0, 0);
    assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
}

#[test]
fn test_validate_rejects_zero_task_timeout() {
    let config = PoolConfig::default().with_task_timeout(Duration::ZERO);
    assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
}

#[test]
fn test_zero_min_units_is_valid() {
    let config = PoolConfig::default().with_units(0, 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_deserialize_partial_config_uses_defaults() {
    let config: PoolConfig = serde_json::from_str(
        r#"{
            "max_units": 6,
            "idle_timeout_ms": 2500,
            "retry_base_delay_ms": 20,
            "enable_preheating": true
        }"#,
    )
    .unwrap();

    assert_eq!(config.max_units, 6);
    assert_eq!(config.min_units, 1);
    assert_eq!(config.idle_timeout, Duration::from_millis(2500));
    assert_eq!(config.retry_base_delay, Duration::from_millis(20));
    assert!(config.enable_preheating);
    assert_eq!(config.thread_name_prefix, "skein-unit");
}

#[test]
fn test_serialize_uses_millisecond_fields() {
    let config = PoolConfig::default().with_task_timeout(Duration::from_millis(750));
    let json = serde_json::to_value(&config).unwrap();

    assert_eq!(json["task_timeout_ms"], 750);
    assert!(json.get("task_timeout").is_none());

    let back: PoolConfig = serde_json::from_value(json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_builder_methods() {
    let config = PoolConfig::default()
        .with_units(2, 5)
        .with_max_retries(0)
        .with_smart_scheduling(false)
        .with_preheating(true)
        .with_unit_error_threshold(1)
        .with_retry_backoff(Duration::from_millis(10), Duration::from_millis(80));

    assert_eq!((config.min_units, config.max_units), (2, 5));
    assert_eq!(config.max_retries, 0);
    assert!(!config.enable_smart_scheduling);
    assert!(config.enable_preheating);
    assert_eq!(config.unit_error_threshold, 1);
    assert_eq!(config.retry_max_delay, Duration::from_millis(80));
}
