//! Tests for configuration validation and loading

use std::collections::HashMap;

use prometheus_script_engine::config::{EngineConfig, ThreadPoolKind};

#[test]
fn test_default_config_is_valid() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.thread_pool_size(), config.max_concurrent_scripts + 1);
    assert_eq!(config.thread_pool, ThreadPoolKind::Dedicated);
    assert!(config.cancel_reallocated_futures);
}

#[test]
fn test_zero_concurrency_is_rejected() {
    let config = EngineConfig::new().with_max_concurrent_scripts(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_intervals_are_rejected() {
    assert!(EngineConfig::new().with_dispatch_interval_ms(0).validate().is_err());
    assert!(EngineConfig::new().with_gc_interval_ms(0).validate().is_err());
}

#[test]
fn test_tiny_stack_is_rejected() {
    let config = EngineConfig::new().with_thread_stack_size(1024);
    assert!(config.validate().is_err());
}

#[test]
fn test_json_partial_override() {
    let config = EngineConfig::from_json_str(
        r#"{"name": "quests", "max_concurrent_scripts": 3, "thread_pool": "dedicated"}"#,
    )
    .unwrap();
    assert_eq!(config.name, "quests");
    assert_eq!(config.max_concurrent_scripts, 3);
    assert_eq!(config.dispatch_interval_ms, EngineConfig::default().dispatch_interval_ms);
}

#[test]
fn test_json_invalid_values_are_rejected() {
    assert!(EngineConfig::from_json_str(r#"{"max_concurrent_scripts": 0}"#).is_err());
    assert!(EngineConfig::from_json_str("not json").is_err());
}

#[test]
fn test_lookup_overrides() {
    let vars: HashMap<&str, &str> = [
        ("SCRIPT_ENGINE_MAX_CONCURRENT_SCRIPTS", "6"),
        ("SCRIPT_ENGINE_CANCEL_REALLOCATED_FUTURES", "false"),
        ("SCRIPT_ENGINE_THREAD_POOL", "dedicated"),
    ]
    .into_iter()
    .collect();
    let config = EngineConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_owned())).unwrap();
    assert_eq!(config.max_concurrent_scripts, 6);
    assert!(!config.cancel_reallocated_futures);
}

#[test]
fn test_lookup_reports_bad_value() {
    let err = EngineConfig::from_lookup(|key| {
        (key == "SCRIPT_ENGINE_DISPATCH_INTERVAL_MS").then(|| "soon".to_owned())
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("SCRIPT_ENGINE_DISPATCH_INTERVAL_MS"));
}

#[test]
fn test_thread_pool_kind_parses() {
    assert_eq!("tokio".parse::<ThreadPoolKind>().unwrap(), ThreadPoolKind::Tokio);
    assert_eq!("Dedicated".parse::<ThreadPoolKind>().unwrap(), ThreadPoolKind::Dedicated);
    assert!("fibers".parse::<ThreadPoolKind>().is_err());
}
