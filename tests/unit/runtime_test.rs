//! Tests for the serializable API surface

use prometheus_script_engine::config::EngineConfig;
use prometheus_script_engine::core::ScriptEngine;
use prometheus_script_engine::runtime::EngineSnapshot;

use crate::common::ClosureLanguage;

#[test]
fn test_snapshot_serializes_and_parses() {
    let engine = ScriptEngine::new(EngineConfig::new().with_max_concurrent_scripts(1), ClosureLanguage::new()).unwrap();
    let snapshot = engine.snapshot();
    let json = snapshot.to_json().unwrap();
    let parsed: EngineSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.engine_id, engine.id());
    assert_eq!(parsed.language, "closure");
    assert!(!parsed.disposed);
    engine.dispose(false);
}

#[test]
fn test_health_after_dispose() {
    let engine = ScriptEngine::new(EngineConfig::new().with_max_concurrent_scripts(1), ClosureLanguage::new()).unwrap();
    engine.dispose(false);
    let health = engine.snapshot().health();
    assert!(!health.ok);
    assert!(!health.saturated);
}
