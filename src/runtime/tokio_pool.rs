//! Thread-pool provider backed by a tokio multi-thread runtime.
//!
//! Jobs are blocking code (scripts park on game futures), so each run goes
//! through `spawn_blocking`; delays and fixed-rate periods are tokio timers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::collections::RwIntMap;
use crate::core::thread_pool::{run_job, PoolCounters, PoolError, PoolStats, TaskHandle, ThreadPoolProvider};

/// Decrements the queued counter when the job leaves the timer phase, including
/// when the timer future is aborted.
struct QueuedGuard(Arc<PoolCounters>);

impl QueuedGuard {
    fn new(counters: &Arc<PoolCounters>) -> Self {
        counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counters))
    }
}

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        self.0.queued_tasks.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Tokio-backed [`ThreadPoolProvider`].
pub struct TokioThreadPool {
    name: String,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    /// Handles that may still run, so shutdown can cancel them.
    live: Arc<RwIntMap<TaskHandle>>,
    worker_count: usize,
    next_task_id: AtomicU64,
}

impl TokioThreadPool {
    /// Builds a runtime with `worker_count` async workers and at most
    /// `worker_count` blocking threads.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` for zero workers and
    /// `PoolError::SpawnFailed` if the runtime cannot be built.
    pub fn new(name: &str, worker_count: usize, stack_size: usize) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::InvalidConfig("worker_count must be > 0".into()));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_count)
            .max_blocking_threads(worker_count)
            .thread_name(format!("{name}-worker"))
            .thread_stack_size(stack_size)
            .enable_all()
            .build()
            .map_err(|e| PoolError::SpawnFailed(e.to_string()))?;
        let handle = runtime.handle().clone();

        info!(pool = name, worker_count, "Tokio thread pool started");

        Ok(Self {
            name: name.to_owned(),
            runtime: Mutex::new(Some(runtime)),
            handle,
            counters: Arc::new(PoolCounters::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            live: Arc::new(RwIntMap::new()),
            worker_count,
            next_task_id: AtomicU64::new(1),
        })
    }

    fn register(&self) -> Result<TaskHandle, PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        let handle = TaskHandle::new(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        self.live.insert(handle.id(), handle.clone());
        self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    fn install_abort(&self, handle: &TaskHandle, join: tokio::task::JoinHandle<()>) {
        let live: Weak<RwIntMap<TaskHandle>> = Arc::downgrade(&self.live);
        handle.set_cancel_hook(move |handle| {
            join.abort();
            if let Some(live) = live.upgrade() {
                live.remove(handle.id());
            }
        });
    }
}

impl ThreadPoolProvider for TokioThreadPool {
    fn schedule(&self, job: Box<dyn FnOnce() + Send>, delay: Duration) -> Result<TaskHandle, PoolError> {
        let handle = self.register()?;
        let task = handle.clone();
        let counters = Arc::clone(&self.counters);
        let live = Arc::clone(&self.live);

        let join = self.handle.spawn(async move {
            let queued = QueuedGuard::new(&counters);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            drop(queued);
            let blocking = tokio::task::spawn_blocking(move || {
                run_job(&task, &counters, job);
                live.remove(task.id());
                task.finish();
            });
            let _ = blocking.await;
        });
        self.install_abort(&handle, join);

        debug!(pool = %self.name, task_id = handle.id(), ?delay, "Task scheduled");
        Ok(handle)
    }

    fn schedule_at_fixed_rate(
        &self,
        job: Arc<dyn Fn() + Send + Sync>,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, PoolError> {
        if period.is_zero() {
            return Err(PoolError::InvalidConfig("period must be > 0".into()));
        }
        let handle = self.register()?;
        let task = handle.clone();
        let counters = Arc::clone(&self.counters);
        let shutdown = Arc::clone(&self.shutdown);
        let live = Arc::clone(&self.live);

        let join = self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticker = tokio::time::interval_at(start, period);
            // Missed periods run back to back, measured from the first start.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                {
                    let _queued = QueuedGuard::new(&counters);
                    ticker.tick().await;
                }
                let run = task.clone();
                let body = Arc::clone(&job);
                let run_counters = Arc::clone(&counters);
                let ran = tokio::task::spawn_blocking(move || {
                    let ran = run_job(&run, &run_counters, || body());
                    if !ran || run.is_cancelled() {
                        run.finish();
                    }
                    ran
                })
                .await
                .unwrap_or(false);
                if !ran || task.is_cancelled() || shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
            live.remove(task.id());
            task.finish();
        });
        self.install_abort(&handle, join);

        debug!(pool = %self.name, task_id = handle.id(), ?initial_delay, ?period, "Repeating task scheduled");
        Ok(handle)
    }

    /// Cancels every live task and shuts the runtime down in the background.
    /// Blocking jobs that are already running finish on their own threads.
    fn shutdown(&self, interrupt: bool) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(pool = %self.name, interrupt, "Shutting down tokio thread pool");

        for (_, handle) in self.live.drain() {
            handle.cancel(interrupt);
        }
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }

        info!(pool = %self.name, "Tokio thread pool shut down");
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.worker_count)
    }
}

impl Drop for TokioThreadPool {
    fn drop(&mut self) {
        // Dropping a Runtime blocks on its blocking pool; never do that here.
        if let Some(runtime) = self.runtime.lock().take() {
            self.shutdown.store(true, Ordering::Release);
            runtime.shutdown_background();
            debug!(pool = %self.name, "Tokio thread pool dropped without explicit shutdown");
        }
    }
}

impl std::fmt::Debug for TokioThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioThreadPool")
            .field("name", &self.name)
            .field("worker_count", &self.worker_count)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
