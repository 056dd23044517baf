//! Tests for error types

use prometheus_script_engine::core::{PoolError, ScriptError};

#[test]
fn test_no_such_script_error() {
    let err = ScriptError::NoSuchScript { script_id: 12 };
    assert_eq!(format!("{err}"), "no script compiled with id 12");
}

#[test]
fn test_skip_is_not_a_failure() {
    assert!(ScriptError::ScriptSkipped.is_skip());
    assert!(!ScriptError::EngineDisposed.is_skip());
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.lua");
    let err: ScriptError = io.into();
    assert!(matches!(err, ScriptError::Io(ref msg) if msg.contains("missing.lua")));
}

#[test]
fn test_pool_error_display() {
    assert_eq!(PoolError::PoolShutdown.to_string(), "pool has been shut down");
    assert_eq!(
        PoolError::SpawnFailed("no threads".into()).to_string(),
        "failed to start worker: no threads"
    );
}

#[test]
fn test_pool_error_maps_to_script_error() {
    assert_eq!(ScriptError::from(PoolError::PoolShutdown), ScriptError::EngineDisposed);
    assert_eq!(
        ScriptError::from(PoolError::InvalidConfig("bad".into())),
        ScriptError::InvalidConfig("bad".into())
    );
}
