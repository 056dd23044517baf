//! Build a [`ScriptEngine`] and its thread pool from [`EngineConfig`].

use tracing::info;

use crate::config::{EngineConfig, ThreadPoolKind};
use crate::core::{
    DedicatedThreadPool, ScriptEngine, ScriptError, ScriptLanguage, ScriptResult, ThreadPoolProvider,
};

/// Validate `config`, start the thread pool it selects, and build an engine
/// running `language`.
///
/// # Errors
///
/// [`ScriptError::InvalidConfig`] if validation fails, or the thread pool /
/// executor start-up error.
pub fn build_engine<L: ScriptLanguage>(config: EngineConfig, language: L) -> ScriptResult<ScriptEngine> {
    config.validate().map_err(ScriptError::InvalidConfig)?;
    let pool = build_thread_pool(&config)?;
    ScriptEngine::with_provider(config, language, pool)
}

/// Start the thread pool selected by `config.thread_pool`, sized to
/// `max_concurrent_scripts + 1` workers.
///
/// # Errors
///
/// [`ScriptError::InvalidConfig`] for a strategy this build does not include,
/// or [`ScriptError::Io`] if worker threads cannot be spawned.
pub fn build_thread_pool(config: &EngineConfig) -> ScriptResult<Box<dyn ThreadPoolProvider>> {
    let workers = config.thread_pool_size();
    info!(
        name = %config.name,
        strategy = ?config.thread_pool,
        workers,
        stack_size = config.thread_stack_size,
        "Starting thread pool"
    );
    match config.thread_pool {
        ThreadPoolKind::Dedicated => {
            let pool = DedicatedThreadPool::new(&config.name, workers, config.thread_stack_size)?;
            Ok(Box::new(pool))
        }
        #[cfg(feature = "tokio-runtime")]
        ThreadPoolKind::Tokio => {
            let pool = crate::runtime::TokioThreadPool::new(&config.name, workers, config.thread_stack_size)?;
            Ok(Box::new(pool))
        }
        #[cfg(not(feature = "tokio-runtime"))]
        ThreadPoolKind::Tokio => Err(ScriptError::InvalidConfig(
            "thread_pool = tokio requires the tokio-runtime feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_thread_pool_sizes_for_dispatch_cycle() {
        let config = EngineConfig::new().with_max_concurrent_scripts(2);
        let pool = build_thread_pool(&config).unwrap();
        assert_eq!(pool.worker_count(), 3);
        pool.shutdown(false);
        assert!(pool.is_shutdown());
    }

    #[cfg(feature = "tokio-runtime")]
    #[test]
    fn test_build_tokio_thread_pool() {
        let config = EngineConfig::new()
            .with_max_concurrent_scripts(1)
            .with_thread_pool(ThreadPoolKind::Tokio);
        let pool = build_thread_pool(&config).unwrap();
        assert_eq!(pool.worker_count(), 2);
        pool.shutdown(false);
    }
}
