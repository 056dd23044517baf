//! A dispatched invocation running (or about to run) on a worker.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::bindings::ScriptBindings;
use super::engine::ScriptEngine;
use super::error::ScriptError;
use super::executor_pool::LeasedExecutor;
use super::listener::{ScriptInvocationListener, ScriptOutcome};
use super::notification::AwaitProcessing;
use super::thread_pool::panic_message;
use super::{ScriptId, TaskId};
use crate::util::InterruptHandle;

/// Registry entry for one running invocation.
///
/// Skipping raises the task's own interrupt flag, which the worker binds
/// while the script runs; the script unwinds at its next future wait.
pub struct ScriptExecutionTask {
    task_id: TaskId,
    script_id: ScriptId,
    finished: AtomicBool,
    interrupt: InterruptHandle,
}

impl ScriptExecutionTask {
    pub(crate) fn new(task_id: TaskId, script_id: ScriptId) -> Arc<Self> {
        Arc::new(Self {
            task_id,
            script_id,
            finished: AtomicBool::new(false),
            interrupt: InterruptHandle::new(),
        })
    }

    /// Invocation task id.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Script being run.
    #[must_use]
    pub const fn script_id(&self) -> ScriptId {
        self.script_id
    }

    /// Returns `true` once the outcome has been produced.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Requests cooperative interruption of the script.
    pub fn skip(&self) {
        if !self.is_finished() {
            debug!(task_id = self.task_id, script_id = self.script_id, "Skipping script");
            self.interrupt.interrupt();
        }
    }

    /// Runs the script on the current thread and delivers its outcome.
    ///
    /// The executor lease is dropped as soon as the script returns, before the
    /// listener is called.
    pub(crate) fn run(
        &self,
        engine: &ScriptEngine,
        mut lease: Box<dyn LeasedExecutor>,
        bindings: ScriptBindings,
        listener: Option<Arc<dyn ScriptInvocationListener>>,
    ) {
        let _scope = self.interrupt.enter();

        if let Some(listener) = &listener {
            engine.notifier().begin(
                listener,
                self.script_id,
                AwaitProcessing::Bounded(engine.config().begin_notification_timeout()),
            );
        }

        let result = if self.interrupt.clear() {
            Err(ScriptError::ScriptSkipped)
        } else {
            let return_result = listener.is_some();
            panic::catch_unwind(AssertUnwindSafe(|| {
                lease.run(engine, self.task_id, self.script_id, bindings, return_result)
            }))
            .unwrap_or_else(|payload| {
                Err(ScriptError::Execution(format!(
                    "script panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })
        };
        drop(lease);
        self.interrupt.clear();
        self.finished.store(true, Ordering::Release);

        debug!(
            task_id = self.task_id,
            script_id = self.script_id,
            ok = result.is_ok(),
            "Script finished"
        );
        engine.deliver_outcome(listener.as_ref(), self.script_id, ScriptOutcome::from_result(result));
    }
}

impl fmt::Debug for ScriptExecutionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptExecutionTask")
            .field("task_id", &self.task_id)
            .field("script_id", &self.script_id)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
