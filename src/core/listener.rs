//! Result listeners and the interactive-lane wrapper.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::bindings::ScriptBindings;
use super::error::ScriptError;
use super::invocation_queue::ScriptInvocationQueue;
use super::notification::{AwaitProcessing, Notifier};
use super::ScriptId;

/// Receives the outcome of a script invocation.
///
/// Exactly one of `on_script_success`, `on_script_skipped`,
/// `on_script_exception` or `on_script_cancelled` is delivered per invocation.
/// Callbacks run on the worker thread unless [`call_on_game_thread`] returns
/// `true`, in which case they are queued and run inside
/// [`ScriptEngine::update`].
///
/// [`call_on_game_thread`]: ScriptInvocationListener::call_on_game_thread
/// [`ScriptEngine::update`]: crate::core::ScriptEngine::update
///
/// # Example
///
/// ```rust
/// use prometheus_script_engine::core::{ScriptBindings, ScriptError, ScriptId, ScriptInvocationListener};
///
/// struct LogListener;
///
/// impl ScriptInvocationListener for LogListener {
///     fn on_script_success(&self, script_id: ScriptId, result: Option<ScriptBindings>) {
///         println!("{script_id} finished with {:?}", result.map(|r| r.len()));
///     }
///     fn on_script_skipped(&self, script_id: ScriptId) {
///         println!("{script_id} skipped");
///     }
///     fn on_script_exception(&self, script_id: ScriptId, error: ScriptError) {
///         eprintln!("{script_id} failed: {error}");
///     }
///     fn call_on_game_thread(&self) -> bool {
///         true
///     }
/// }
/// ```
pub trait ScriptInvocationListener: Send + Sync {
    /// The script is about to run.
    fn on_script_begin(&self, _script_id: ScriptId) {}

    /// The script finished. `result` holds the bindings after execution.
    fn on_script_success(&self, script_id: ScriptId, result: Option<ScriptBindings>);

    /// The script (or a future it waited on) was skipped.
    fn on_script_skipped(&self, script_id: ScriptId);

    /// The script could not be run or failed while running.
    fn on_script_exception(&self, script_id: ScriptId, error: ScriptError);

    /// The invocation was removed from the queue before it ran.
    fn on_script_cancelled(&self, _script_id: ScriptId) {}

    /// Whether callbacks must run on the game thread.
    fn call_on_game_thread(&self) -> bool {
        false
    }
}

/// Final outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    /// Finished normally.
    Success(Option<ScriptBindings>),
    /// Skipped while running.
    Skipped,
    /// Failed to start or failed while running.
    Failed(ScriptError),
    /// Removed from the queue before running.
    Cancelled,
}

impl ScriptOutcome {
    /// Calls the listener method matching this outcome.
    pub fn deliver_to(self, listener: &dyn ScriptInvocationListener, script_id: ScriptId) {
        match self {
            Self::Success(result) => listener.on_script_success(script_id, result),
            Self::Skipped => listener.on_script_skipped(script_id),
            Self::Failed(error) => listener.on_script_exception(script_id, error),
            Self::Cancelled => listener.on_script_cancelled(script_id),
        }
    }

    /// Maps an execution result, treating [`ScriptError::ScriptSkipped`] as a skip.
    #[must_use]
    pub fn from_result(result: Result<Option<ScriptBindings>, ScriptError>) -> Self {
        match result {
            Ok(bindings) => Self::Success(bindings),
            Err(error) if error.is_skip() => Self::Skipped,
            Err(error) => Self::Failed(error),
        }
    }
}

/// Wraps the listener of an interactive invocation so the interactive lane is
/// released when the outcome is delivered.
///
/// With `notify_then_allow_interaction` the lane is released after the user's
/// callback has run; otherwise before. `wait_for_game_thread` keeps the worker
/// blocked until a marshalled callback has been processed by `update`.
pub(crate) struct InteractiveScriptListener {
    script_id: ScriptId,
    inner: Option<Arc<dyn ScriptInvocationListener>>,
    queue: Arc<ScriptInvocationQueue>,
    notifier: Notifier,
    notify_then_allow_interaction: bool,
    wait_for_game_thread: bool,
    begin_timeout: Duration,
}

impl InteractiveScriptListener {
    pub(crate) fn new(
        script_id: ScriptId,
        inner: Option<Arc<dyn ScriptInvocationListener>>,
        queue: Arc<ScriptInvocationQueue>,
        notifier: Notifier,
        notify_then_allow_interaction: bool,
        wait_for_game_thread: bool,
        begin_timeout: Duration,
    ) -> Self {
        Self {
            script_id,
            inner,
            queue,
            notifier,
            notify_then_allow_interaction,
            wait_for_game_thread,
            begin_timeout,
        }
    }

    fn finish(&self, script_id: ScriptId, outcome: ScriptOutcome) {
        if script_id != self.script_id {
            return;
        }
        if !self.notify_then_allow_interaction {
            self.queue.clear_interactive_script_status();
        }
        match &self.inner {
            Some(inner) => {
                let wait = if self.wait_for_game_thread {
                    AwaitProcessing::Unbounded
                } else {
                    AwaitProcessing::No
                };
                self.notifier.outcome(inner, script_id, outcome, wait);
            }
            None => {
                if let ScriptOutcome::Failed(error) = outcome {
                    tracing::error!(script_id, %error, "interactive script failed");
                }
            }
        }
        if self.notify_then_allow_interaction {
            self.queue.clear_interactive_script_status();
        }
    }
}

impl ScriptInvocationListener for InteractiveScriptListener {
    fn on_script_begin(&self, script_id: ScriptId) {
        if script_id != self.script_id {
            return;
        }
        if let Some(inner) = &self.inner {
            self.notifier
                .begin(inner, script_id, AwaitProcessing::Bounded(self.begin_timeout));
        }
    }

    fn on_script_success(&self, script_id: ScriptId, result: Option<ScriptBindings>) {
        self.finish(script_id, ScriptOutcome::Success(result));
    }

    fn on_script_skipped(&self, script_id: ScriptId) {
        self.finish(script_id, ScriptOutcome::Skipped);
    }

    fn on_script_exception(&self, script_id: ScriptId, error: ScriptError) {
        self.finish(script_id, ScriptOutcome::Failed(error));
    }

    fn on_script_cancelled(&self, script_id: ScriptId) {
        self.finish(script_id, ScriptOutcome::Cancelled);
    }

    fn call_on_game_thread(&self) -> bool {
        false
    }
}

impl fmt::Debug for InteractiveScriptListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveScriptListener")
            .field("script_id", &self.script_id)
            .field("has_listener", &self.inner.is_some())
            .field("notify_then_allow_interaction", &self.notify_then_allow_interaction)
            .finish_non_exhaustive()
    }
}
