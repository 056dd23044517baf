//! Self-hosted thread pool on named OS threads.
//!
//! Workers block on one [`DelayedPriorityQueue`] ordered by scheduled start
//! time, so immediate, delayed and fixed-rate work share the same threads.
//!
//! - **No polling**: `take()` sleeps until the head is due or an earlier item arrives
//! - **Clean shutdown**: closing the queue unblocks idle workers
//! - **Pooled records**: scheduled tasks are recycled through [`ScheduledTaskPool`]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{run_job, Job, PoolCounters, PoolError, PoolStats, ScheduledTask, ScheduledTaskPool};
use super::{TaskHandle, ThreadPoolProvider};
use crate::collections::{DelayedPriorityQueue, RwIntMap};

struct PoolShared {
    queue: DelayedPriorityQueue<ScheduledTask>,
    tasks: ScheduledTaskPool,
    counters: PoolCounters,
    shutdown: AtomicBool,
    /// Handles of jobs currently executing, for interrupting on shutdown.
    running: RwIntMap<TaskHandle>,
}

impl PoolShared {
    fn enqueue(self: &Arc<Self>, task: ScheduledTask) {
        let handle = task.handle().cloned();
        let slot = self.queue.offer(task);
        self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        if let Some(handle) = handle {
            handle.set_queue_slot(slot);
        }
    }

    /// Removes a queued task on cancel. A task already taken by a worker is
    /// skipped by the worker instead.
    fn dequeue(&self, handle: &TaskHandle) {
        if let Some(task) = self.queue.remove(handle.queue_slot()) {
            self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            self.tasks.release(task);
        }
    }
}

/// Thread pool owning `worker_count` dedicated threads.
///
/// # Example
///
/// ```rust
/// use prometheus_script_engine::core::thread_pool::{DedicatedThreadPool, ThreadPoolProvider};
/// use std::time::Duration;
///
/// let pool = DedicatedThreadPool::new("example", 2, 256 * 1024).unwrap();
/// let handle = pool.schedule(Box::new(|| {}), Duration::from_millis(5)).unwrap();
/// assert!(handle.wait(Duration::from_secs(5)));
/// pool.shutdown(false);
/// ```
pub struct DedicatedThreadPool {
    name: String,
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_threads: RwLock<Vec<ThreadId>>,
    worker_count: usize,
    next_task_id: AtomicU64,
}

impl DedicatedThreadPool {
    /// Spawns `worker_count` threads named `{name}-worker-{id}`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` for zero workers or stack size, and
    /// `PoolError::SpawnFailed` if the OS refuses a thread.
    pub fn new(name: &str, worker_count: usize, stack_size: usize) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::InvalidConfig("worker_count must be > 0".into()));
        }
        if stack_size == 0 {
            return Err(PoolError::InvalidConfig("stack_size must be > 0".into()));
        }

        let shared = Arc::new(PoolShared {
            queue: DelayedPriorityQueue::new(),
            tasks: ScheduledTaskPool::default(),
            counters: PoolCounters::default(),
            shutdown: AtomicBool::new(false),
            running: RwIntMap::new(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        let mut worker_threads = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            match spawn_worker(name, worker_id, Arc::clone(&shared), stack_size) {
                Ok(worker) => {
                    worker_threads.push(worker.thread().id());
                    workers.push(worker);
                }
                Err(e) => {
                    shared.shutdown.store(true, Ordering::Release);
                    shared.queue.close();
                    return Err(PoolError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!(pool = name, worker_count, stack_size, "Dedicated thread pool started");

        Ok(Self {
            name: name.to_owned(),
            shared,
            workers: Mutex::new(workers),
            worker_threads: RwLock::new(worker_threads),
            worker_count,
            next_task_id: AtomicU64::new(1),
        })
    }

    fn enqueue(&self, job: Job, delay: Duration, period: Option<Duration>) -> Result<TaskHandle, PoolError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        let handle = TaskHandle::new(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let task = self.shared.tasks.allocate(job, delay, period, handle.clone());
        self.shared.enqueue(task);
        self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);

        let weak: Weak<PoolShared> = Arc::downgrade(&self.shared);
        handle.set_cancel_hook(move |handle| {
            if let Some(shared) = weak.upgrade() {
                shared.dequeue(handle);
            }
        });

        debug!(pool = %self.name, task_id = handle.id(), ?delay, ?period, "Task scheduled");
        Ok(handle)
    }

    fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_threads.read().contains(&current)
    }
}

impl ThreadPoolProvider for DedicatedThreadPool {
    fn schedule(&self, job: Box<dyn FnOnce() + Send>, delay: Duration) -> Result<TaskHandle, PoolError> {
        self.enqueue(Job::Once(job), delay, None)
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
        self.enqueue(Job::Repeating(job), initial_delay, Some(period))
    }

    /// Closes the queue, finishes queued tasks without running them and joins
    /// the workers (2 seconds each).
    ///
    /// Called from one of this pool's own workers, the join is skipped; the
    /// workers exit on their own once the current job returns.
    fn shutdown(&self, interrupt: bool) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(pool = %self.name, interrupt, "Shutting down dedicated thread pool");

        self.shared.queue.close();
        for mut task in self.shared.queue.drain() {
            if let Some(handle) = task.handle() {
                handle.cancel(false);
                handle.finish();
            }
            drop(task.take_job());
            self.shared.tasks.release(task);
        }
        self.shared.counters.queued_tasks.store(0, Ordering::Relaxed);

        if interrupt {
            self.shared.running.for_each(|task_id, handle| {
                debug!(pool = %self.name, task_id, "Interrupting running task");
                handle.cancel(true);
            });
        }

        if self.is_worker_thread() {
            debug!(pool = %self.name, "Shutdown called from a worker thread - not joining");
            return;
        }

        let mut workers = self.workers.lock();
        let worker_count = workers.len();

        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => {
                    debug!(worker_id = idx, "Worker joined successfully");
                }
                Ok(false) => {
                    warn!(worker_id = idx, "Worker panicked");
                }
                Err(_) => {
                    warn!(worker_id = idx, "Worker did not exit within timeout - detaching");
                    // Joining would block; let the helper thread finish on its own.
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!(pool = %self.name, worker_count, "Dedicated thread pool shut down");
    }

    fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(self.worker_count)
    }
}

impl Drop for DedicatedThreadPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join in Drop.
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            self.shared.queue.close();
            debug!(pool = %self.name, "Dedicated thread pool dropped without explicit shutdown - workers will be detached");
        }
    }
}

impl std::fmt::Debug for DedicatedThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedicatedThreadPool")
            .field("name", &self.name)
            .field("worker_count", &self.worker_count)
            .field("shutdown", &self.is_shutdown())
            .field("queued", &self.shared.queue.len())
            .finish()
    }
}

fn spawn_worker(
    name: &str,
    worker_id: usize,
    shared: Arc<PoolShared>,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{name}-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "Worker thread started");

            // Blocks until the head task is due; `None` once the queue closes.
            while let Some(mut task) = shared.queue.take() {
                shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                let (Some(handle), Some(job)) = (task.handle().cloned(), task.take_job()) else {
                    shared.tasks.release(task);
                    continue;
                };

                shared.running.insert(handle.id(), handle.clone());
                match job {
                    Job::Once(body) => {
                        run_job(&handle, &shared.counters, body);
                        shared.running.remove(handle.id());
                        handle.finish();
                        shared.tasks.release(task);
                    }
                    Job::Repeating(body) => {
                        let ran = run_job(&handle, &shared.counters, || body());
                        shared.running.remove(handle.id());
                        if !ran || handle.is_cancelled() || shared.shutdown.load(Ordering::Acquire) {
                            handle.finish();
                            shared.tasks.release(task);
                        } else {
                            task.reschedule(Job::Repeating(body));
                            shared.enqueue(task);
                        }
                    }
                }
            }

            debug!(worker_id, "Worker queue closed, exiting");
        })
}
