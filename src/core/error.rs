//! Error types for script scheduling and execution.

use thiserror::Error;

use super::ScriptId;

/// Errors produced by the engine, its adapters and game futures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The invocation references a script id that was never compiled.
    #[error("no script compiled with id {script_id}")]
    NoSuchScript {
        /// The unknown id.
        script_id: ScriptId,
    },
    /// No compiled script is registered under the given filepath.
    #[error("no script compiled from {0}")]
    NoSuchScriptPath(String),
    /// No adapter instance was free to compile. Compile up front, sequentially.
    #[error("insufficient compilers available")]
    InsufficientCompilers,
    /// No adapter instance was free to execute the script.
    #[error("no executor available to run script {script_id}")]
    ExecutorUnavailable {
        /// The script that could not be run.
        script_id: ScriptId,
    },
    /// The owning script or the awaited future was skipped.
    ///
    /// Scripts observe this inside a future wait and should unwind normally.
    #[error("script skipped")]
    ScriptSkipped,
    /// The adapter failed while running the script.
    #[error("script execution failed: {0}")]
    Execution(String),
    /// The adapter failed to compile the source.
    #[error("script compilation failed: {0}")]
    Compile(String),
    /// Reading script source failed.
    #[error("i/o error: {0}")]
    Io(String),
    /// The engine has been disposed.
    #[error("engine disposed")]
    EngineDisposed,
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScriptError {
    /// Returns `true` for the skip error a script should treat as a normal unwind.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::ScriptSkipped)
    }
}

impl From<std::io::Error> for ScriptError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result alias for engine operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Application-facing result using anyhow for host glue such as config loading.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_ids() {
        let err = ScriptError::NoSuchScript { script_id: 12 };
        assert_eq!(err.to_string(), "no script compiled with id 12");
        let err = ScriptError::ExecutorUnavailable { script_id: 3 };
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_only_skip_is_skip() {
        assert!(ScriptError::ScriptSkipped.is_skip());
        assert!(!ScriptError::Execution("boom".into()).is_skip());
    }
}
