//! Serializable views of engine state for dashboards and health checks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::PoolStats;

/// Point-in-time engine counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Engine instance id.
    pub engine_id: Uuid,
    /// Script language name.
    pub language: String,
    /// Whether the engine has been disposed.
    pub disposed: bool,
    /// Scripts in the compile cache.
    pub compiled_scripts: usize,
    /// Queued invocations in both lanes.
    pub queued_scripts: usize,
    /// Queued interactive invocations.
    pub queued_interactive_scripts: usize,
    /// Whether an interactive invocation is in flight.
    pub interactive_script_running: bool,
    /// Running-task registry size.
    pub running_tasks: usize,
    /// Running-future registry size.
    pub running_futures: usize,
    /// Futures waiting for the next update.
    pub queued_futures: usize,
    /// Executor instances owned by the engine.
    pub executor_pool_size: usize,
    /// Executor instances currently idle.
    pub available_executors: usize,
    /// Thread pool counters.
    pub thread_pool: PoolStats,
}

impl EngineSnapshot {
    /// Health summary derived from this snapshot.
    #[must_use]
    pub fn health(&self) -> EngineHealth {
        EngineHealth {
            ok: !self.disposed,
            saturated: self.available_executors == 0 && self.queued_scripts > 0,
        }
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Serialization failures from `serde_json`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Health response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineHealth {
    /// Engine is accepting invocations.
    pub ok: bool,
    /// Every executor is busy and invocations are waiting.
    pub saturated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> EngineSnapshot {
        EngineSnapshot {
            engine_id: Uuid::nil(),
            language: "echo".into(),
            disposed: false,
            compiled_scripts: 2,
            queued_scripts: 3,
            queued_interactive_scripts: 1,
            interactive_script_running: true,
            running_tasks: 2,
            running_futures: 0,
            queued_futures: 0,
            executor_pool_size: 2,
            available_executors: 0,
            thread_pool: PoolStats::default(),
        }
    }

    #[test]
    fn test_health_reports_saturation() {
        let health = snapshot().health();
        assert!(health.ok);
        assert!(health.saturated);
    }

    #[test]
    fn test_snapshot_json_field_names() {
        let json = snapshot().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["language"], "echo");
        assert_eq!(value["queued_scripts"], 3);
        assert_eq!(value["thread_pool"]["worker_count"], 0);
        let back: EngineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot());
    }
}
