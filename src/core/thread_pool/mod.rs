//! Thread-pool providers.
//!
//! The engine only needs three things from a thread pool: run this now, run
//! this later (optionally repeating at a fixed rate) and shut down. This module
//! defines that contract as [`ThreadPoolProvider`] and ships the self-hosted
//! [`DedicatedThreadPool`]. The tokio-backed provider lives in
//! [`crate::runtime`].
//!
//! # Cancellation
//!
//! Every submission returns a [`TaskHandle`]. Cancelling removes a task that has
//! not started; with `interrupt = true` it also raises the interrupt flag of the
//! worker currently running it (see [`crate::util::interrupt`]).
//!
//! # Example
//!
//! ```rust
//! use prometheus_script_engine::core::thread_pool::{DedicatedThreadPool, ThreadPoolProvider};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let pool = DedicatedThreadPool::new("demo", 2, 256 * 1024).unwrap();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&hits);
//! let handle = pool
//!     .submit(Box::new(move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }))
//!     .unwrap();
//! assert!(handle.wait(Duration::from_secs(5)));
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! pool.shutdown(false);
//! ```

mod dedicated;
mod scheduled_task;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::error::ScriptError;
use crate::collections::Monitor;
use crate::util::InterruptHandle;

pub use dedicated::DedicatedThreadPool;
pub(crate) use scheduled_task::{ScheduledTask, ScheduledTaskPool};

/// Errors raised by thread-pool providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down.
    PoolShutdown,
    /// A worker thread or runtime could not be started.
    SpawnFailed(String),
    /// Configuration validation failed.
    InvalidConfig(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::SpawnFailed(msg) => write!(f, "failed to start worker: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<PoolError> for ScriptError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::PoolShutdown => Self::EngineDisposed,
            PoolError::SpawnFailed(msg) => Self::Io(msg),
            PoolError::InvalidConfig(msg) => Self::InvalidConfig(msg),
        }
    }
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Jobs currently executing.
    pub active_tasks: u64,
    /// Jobs waiting for their start time or a free worker.
    pub queued_tasks: u64,
    /// Runs that finished normally (each repetition counts).
    pub completed_tasks: u64,
    /// Runs that panicked.
    pub panicked_tasks: u64,
    /// Total submissions.
    pub submitted_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub panicked_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            panicked_tasks: self.panicked_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Work handed to a provider.
pub enum Job {
    /// Runs once.
    Once(Box<dyn FnOnce() + Send>),
    /// Runs every period until cancelled.
    Repeating(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once(_) => write!(f, "Job::Once"),
            Self::Repeating(_) => write!(f, "Job::Repeating"),
        }
    }
}

type CancelHook = Box<dyn FnOnce(&TaskHandle) + Send>;

struct HandleInner {
    id: u64,
    cancelled: AtomicBool,
    running: AtomicBool,
    done: AtomicBool,
    queue_slot: AtomicU64,
    interrupt: InterruptHandle,
    monitor: Arc<Monitor>,
    on_cancel: Mutex<Option<CancelHook>>,
}

/// Handle to a submitted job.
///
/// The task is *done* once it will never run again: it finished, it was
/// cancelled before starting, or it is a repeating task that stopped.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

impl TaskHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                cancelled: AtomicBool::new(false),
                running: AtomicBool::new(false),
                done: AtomicBool::new(false),
                queue_slot: AtomicU64::new(u64::MAX),
                interrupt: InterruptHandle::new(),
                monitor: Arc::new(Monitor::new()),
                on_cancel: Mutex::new(None),
            }),
        }
    }

    /// Provider-assigned id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Cancels the task.
    ///
    /// A task that has not started never runs. With `interrupt`, a running
    /// task has its interrupt flag raised so cooperative waits unwind. Returns
    /// `false` if the task was already done or cancelled.
    pub fn cancel(&self, interrupt: bool) -> bool {
        if self.is_done() || self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let hook = self.inner.on_cancel.lock().take();
        if let Some(hook) = hook {
            hook(self);
        }
        if self.inner.running.load(Ordering::SeqCst) {
            if interrupt {
                self.inner.interrupt.interrupt();
            }
        } else {
            self.finish();
        }
        self.inner.monitor.notify_all();
        true
    }

    /// Returns `true` once [`cancel`](Self::cancel) succeeded.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `true` once the task will never run again.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// Returns `true` while the job body executes.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Blocks until done or `timeout` elapses. Returns `true` if done.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let seen = self.inner.monitor.epoch();
            if self.is_done() {
                return true;
            }
            if !self.inner.monitor.wait_until(seen, deadline) && Instant::now() >= deadline {
                return self.is_done();
            }
        }
    }

    /// Interrupt flag bound to the worker while the job runs.
    #[must_use]
    pub fn interrupt_handle(&self) -> &InterruptHandle {
        &self.inner.interrupt
    }

    /// Registers what cancellation must undo (dequeue, abort). Runs it at once
    /// if the task was cancelled already.
    pub(crate) fn set_cancel_hook(&self, hook: impl FnOnce(&Self) + Send + 'static) {
        if self.is_cancelled() {
            hook(self);
            return;
        }
        *self.inner.on_cancel.lock() = Some(Box::new(hook));
        // Lost a race with cancel(): it found no hook to run.
        if self.is_cancelled() {
            let hook = self.inner.on_cancel.lock().take();
            if let Some(hook) = hook {
                hook(self);
            }
        }
    }

    pub(crate) fn queue_slot(&self) -> u64 {
        self.inner.queue_slot.load(Ordering::Acquire)
    }

    pub(crate) fn set_queue_slot(&self, slot: u64) {
        self.inner.queue_slot.store(slot, Ordering::Release);
    }

    /// Claims the task for execution. Returns `false` if it was cancelled.
    fn begin_run(&self) -> bool {
        self.inner.running.store(true, Ordering::SeqCst);
        if self.inner.cancelled.load(Ordering::SeqCst) {
            self.inner.running.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn end_run(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Marks the task done and wakes waiters. Idempotent.
    pub(crate) fn finish(&self) {
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            self.inner.on_cancel.lock().take();
            self.inner.monitor.notify_all();
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("cancelled", &self.is_cancelled())
            .field("running", &self.is_running())
            .field("done", &self.is_done())
            .finish()
    }
}

/// Contract between the engine and whatever executes its work.
pub trait ThreadPoolProvider: Send + Sync {
    /// Runs `job` as soon as a worker is free.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolShutdown`] after [`shutdown`](Self::shutdown).
    fn submit(&self, job: Box<dyn FnOnce() + Send>) -> Result<TaskHandle, PoolError> {
        self.schedule(job, Duration::ZERO)
    }

    /// Runs `job` once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolShutdown`] after [`shutdown`](Self::shutdown).
    fn schedule(&self, job: Box<dyn FnOnce() + Send>, delay: Duration) -> Result<TaskHandle, PoolError>;

    /// Runs `job` after `initial_delay`, then every `period` measured from the
    /// previous scheduled start, until the handle is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolShutdown`] after [`shutdown`](Self::shutdown).
    fn schedule_at_fixed_rate(
        &self,
        job: Arc<dyn Fn() + Send + Sync>,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, PoolError>;

    /// Stops accepting work and drops queued tasks. With `interrupt`, running
    /// tasks are interrupted too.
    fn shutdown(&self, interrupt: bool);

    /// Returns `true` once shut down.
    fn is_shutdown(&self) -> bool;

    /// Number of worker threads.
    fn worker_count(&self) -> usize;

    /// Current statistics.
    fn stats(&self) -> PoolStats;
}

/// Runs one execution of a job on the current worker.
///
/// Binds the handle's interrupt flag for the duration, catches panics and
/// clears the flag afterwards so it cannot leak into the next job. Returns
/// `false` without running `body` if the task was cancelled first.
pub(crate) fn run_job(handle: &TaskHandle, counters: &PoolCounters, body: impl FnOnce()) -> bool {
    if !handle.begin_run() {
        handle.finish();
        return false;
    }
    counters.active_tasks.fetch_add(1, Ordering::Relaxed);
    let result = {
        let _scope = handle.interrupt_handle().enter();
        panic::catch_unwind(AssertUnwindSafe(body))
    };
    handle.interrupt_handle().clear();
    handle.end_run();
    counters.active_tasks.fetch_sub(1, Ordering::Relaxed);

    match result {
        Ok(()) => {
            counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
        }
        Err(payload) => {
            counters.panicked_tasks.fetch_add(1, Ordering::Relaxed);
            error!(task_id = handle.id(), panic = %panic_message(payload.as_ref()), "Task panicked");
        }
    }
    true
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::PoolShutdown.to_string(), "pool has been shut down");
        assert_eq!(
            PoolError::SpawnFailed("oom".into()).to_string(),
            "failed to start worker: oom"
        );
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.submitted_tasks.fetch_add(10, Ordering::Relaxed);
        counters.completed_tasks.fetch_add(5, Ordering::Relaxed);
        let stats = counters.snapshot(4);
        assert_eq!(stats.worker_count, 4);
        assert_eq!(stats.submitted_tasks, 10);
        assert_eq!(stats.completed_tasks, 5);
    }

    #[test]
    fn test_cancel_before_run_finishes_handle() {
        let handle = TaskHandle::new(1);
        let counters = PoolCounters::default();
        assert!(handle.cancel(false));
        assert!(!handle.cancel(false));
        assert!(handle.is_done());
        assert!(!run_job(&handle, &counters, || panic!("must not run")));
    }

    #[test]
    fn test_cancel_hook_runs_once() {
        let handle = TaskHandle::new(2);
        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&calls);
        handle.set_cancel_hook(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel(true);
        handle.cancel(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_job_catches_panics() {
        let handle = TaskHandle::new(3);
        let counters = PoolCounters::default();
        assert!(run_job(&handle, &counters, || panic!("boom")));
        assert_eq!(counters.panicked_tasks.load(Ordering::Relaxed), 1);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
