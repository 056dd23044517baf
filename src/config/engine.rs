//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Prefix of every environment variable read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "SCRIPT_ENGINE_";

/// Which [`ThreadPoolProvider`](crate::core::thread_pool::ThreadPoolProvider)
/// the engine runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPoolKind {
    /// Self-hosted named OS threads.
    #[default]
    Dedicated,
    /// A tokio multi-thread runtime (`tokio-runtime` feature).
    Tokio,
}

impl FromStr for ThreadPoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dedicated" => Ok(Self::Dedicated),
            "tokio" => Ok(Self::Tokio),
            other => Err(format!("unknown thread pool kind `{other}`")),
        }
    }
}

/// Engine configuration.
///
/// Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix for worker thread names.
    pub name: String,
    /// Scripts that may run at once. The thread pool gets one extra thread
    /// for dispatch and GC.
    pub max_concurrent_scripts: usize,
    /// Thread pool strategy.
    pub thread_pool: ThreadPoolKind,
    /// Skip a running future when another is registered under its id.
    pub cancel_reallocated_futures: bool,
    /// Period of the dispatch cycle.
    pub dispatch_interval_ms: u64,
    /// Period of the GC sweep.
    pub gc_interval_ms: u64,
    /// How long synchronous invocations and compiles wait for an executor.
    pub executor_acquire_timeout_ms: u64,
    /// How long a worker waits for the game thread to process `on_script_begin`.
    pub begin_notification_timeout_ms: u64,
    /// Release the interactive lane only after the listener ran.
    pub notify_then_allow_interaction: bool,
    /// Block interactive workers until game-thread notifications are processed.
    pub wait_for_game_thread_notifications: bool,
    /// Stack size of worker threads, in bytes.
    pub thread_stack_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "script-engine".into(),
            max_concurrent_scripts: num_cpus::get() + 1,
            thread_pool: ThreadPoolKind::Dedicated,
            cancel_reallocated_futures: true,
            dispatch_interval_ms: 16,
            gc_interval_ms: 1000,
            executor_acquire_timeout_ms: 5000,
            begin_notification_timeout_ms: 1000,
            notify_then_allow_interaction: false,
            wait_for_game_thread_notifications: false,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of scripts that may run at once.
    #[must_use]
    pub const fn with_max_concurrent_scripts(mut self, max: usize) -> Self {
        self.max_concurrent_scripts = max;
        self
    }

    /// Set the thread pool strategy.
    #[must_use]
    pub const fn with_thread_pool(mut self, kind: ThreadPoolKind) -> Self {
        self.thread_pool = kind;
        self
    }

    /// Set the reallocated-future policy.
    #[must_use]
    pub const fn with_cancel_reallocated_futures(mut self, cancel: bool) -> Self {
        self.cancel_reallocated_futures = cancel;
        self
    }

    /// Set the dispatch cycle period.
    #[must_use]
    pub const fn with_dispatch_interval_ms(mut self, ms: u64) -> Self {
        self.dispatch_interval_ms = ms;
        self
    }

    /// Set the GC sweep period.
    #[must_use]
    pub const fn with_gc_interval_ms(mut self, ms: u64) -> Self {
        self.gc_interval_ms = ms;
        self
    }

    /// Set the executor acquisition timeout.
    #[must_use]
    pub const fn with_executor_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.executor_acquire_timeout_ms = ms;
        self
    }

    /// Set the begin-notification timeout.
    #[must_use]
    pub const fn with_begin_notification_timeout_ms(mut self, ms: u64) -> Self {
        self.begin_notification_timeout_ms = ms;
        self
    }

    /// Release the interactive lane after (`true`) or before the listener runs.
    #[must_use]
    pub const fn with_notify_then_allow_interaction(mut self, enabled: bool) -> Self {
        self.notify_then_allow_interaction = enabled;
        self
    }

    /// Block interactive workers on game-thread notifications.
    #[must_use]
    pub const fn with_wait_for_game_thread_notifications(mut self, enabled: bool) -> Self {
        self.wait_for_game_thread_notifications = enabled;
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    /// Threads the pool needs: one per concurrent script plus one spare.
    #[must_use]
    pub const fn thread_pool_size(&self) -> usize {
        self.max_concurrent_scripts + 1
    }

    /// Dispatch cycle period.
    #[must_use]
    pub const fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    /// GC sweep period.
    #[must_use]
    pub const fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    /// Executor acquisition timeout.
    #[must_use]
    pub const fn executor_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.executor_acquire_timeout_ms)
    }

    /// Begin-notification timeout.
    #[must_use]
    pub const fn begin_notification_timeout(&self) -> Duration {
        Duration::from_millis(self.begin_notification_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        if self.max_concurrent_scripts == 0 {
            return Err("max_concurrent_scripts must be greater than 0".into());
        }
        if self.dispatch_interval_ms == 0 {
            return Err("dispatch_interval_ms must be greater than 0".into());
        }
        if self.gc_interval_ms == 0 {
            return Err("gc_interval_ms must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.thread_pool == ThreadPoolKind::Tokio && !cfg!(feature = "tokio-runtime") {
            return Err("thread_pool `tokio` requires the `tokio-runtime` feature".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then read `SCRIPT_ENGINE_*` variables over the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from `lookup`, which maps full variable names
    /// (`SCRIPT_ENGINE_GC_INTERVAL_MS`) to values.
    ///
    /// # Errors
    ///
    /// Fails if a value cannot be parsed or the result is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let read = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut cfg = Self::default();

        if let Some(name) = read("NAME") {
            cfg.name = name;
        }
        parse_into(&read, "MAX_CONCURRENT_SCRIPTS", &mut cfg.max_concurrent_scripts)?;
        if let Some(kind) = read("THREAD_POOL") {
            cfg.thread_pool = kind
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("{ENV_PREFIX}THREAD_POOL"))?;
        }
        parse_into(&read, "CANCEL_REALLOCATED_FUTURES", &mut cfg.cancel_reallocated_futures)?;
        parse_into(&read, "DISPATCH_INTERVAL_MS", &mut cfg.dispatch_interval_ms)?;
        parse_into(&read, "GC_INTERVAL_MS", &mut cfg.gc_interval_ms)?;
        parse_into(&read, "EXECUTOR_ACQUIRE_TIMEOUT_MS", &mut cfg.executor_acquire_timeout_ms)?;
        parse_into(&read, "BEGIN_NOTIFICATION_TIMEOUT_MS", &mut cfg.begin_notification_timeout_ms)?;
        parse_into(&read, "NOTIFY_THEN_ALLOW_INTERACTION", &mut cfg.notify_then_allow_interaction)?;
        parse_into(
            &read,
            "WAIT_FOR_GAME_THREAD_NOTIFICATIONS",
            &mut cfg.wait_for_game_thread_notifications,
        )?;
        parse_into(&read, "THREAD_STACK_SIZE", &mut cfg.thread_stack_size)?;

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_into<T>(read: &impl Fn(&str) -> Option<String>, suffix: &str, slot: &mut T) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = read(suffix) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {ENV_PREFIX}{suffix}: `{raw}`"))?;
    }
    Ok(())
}
