//! Tests for engine builders

use prometheus_script_engine::builders::{build_engine, build_thread_pool};
use prometheus_script_engine::config::EngineConfig;
use prometheus_script_engine::core::ScriptError;

use crate::common::ClosureLanguage;

#[test]
fn test_build_engine_rejects_invalid_config() {
    let config = EngineConfig::new().with_name("");
    let err = build_engine(config, ClosureLanguage::new()).unwrap_err();
    assert!(matches!(err, ScriptError::InvalidConfig(_)));
}

#[test]
fn test_build_engine_uses_configured_concurrency() {
    let config = EngineConfig::new().with_max_concurrent_scripts(3);
    let engine = build_engine(config, ClosureLanguage::new()).unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.executor_pool_size, 3);
    assert_eq!(snapshot.thread_pool.worker_count, 4);
    assert_eq!(engine.language_name(), "closure");
    engine.dispose(false);
}

#[test]
fn test_build_thread_pool_names_workers() {
    let config = EngineConfig::new()
        .with_name("named")
        .with_max_concurrent_scripts(1);
    let pool = build_thread_pool(&config).unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);
    pool.submit(Box::new(move || {
        let _ = tx.send(std::thread::current().name().map(str::to_owned));
    }))
    .unwrap();
    let name = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .unwrap()
        .unwrap_or_default();
    assert!(name.starts_with("named-worker-"));
    pool.shutdown(false);
}
