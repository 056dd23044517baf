//! The scheduler: queues invocations, dispatches them onto the thread pool and
//! drives game futures from the host's frame loop.
//!
//! # Threads
//!
//! - The **game thread** calls [`ScriptEngine::update`] once per frame. It
//!   evaluates futures and runs listener callbacks that asked for the game
//!   thread.
//! - A **dispatch cycle** runs on the pool every `dispatch_interval`, moving
//!   queued invocations onto free executors.
//! - A **GC sweep** runs on the pool every `gc_interval`, dropping collected
//!   futures and finished tasks from the registries.
//! - **Workers** run scripts. A script blocks only its own worker while it
//!   waits on a [`GameFuture`].

use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::bindings::ScriptBindings;
use super::error::{ScriptError, ScriptResult};
use super::execution::ScriptExecutionTask;
use super::executor::ScriptLanguage;
use super::executor_pool::{read_source, ExecutorPool, LeasedExecutor, ScriptRunner};
use super::future::GameFuture;
use super::invocation::{ScriptInvocation, ScriptInvocationPool};
use super::invocation_queue::ScriptInvocationQueue;
use super::listener::{InteractiveScriptListener, ScriptInvocationListener, ScriptOutcome};
use super::notification::{self, AwaitProcessing, Notifier, ScriptNotification};
use super::thread_pool::{TaskHandle, ThreadPoolProvider};
use super::{FutureId, ScriptId, TaskId};
use crate::collections::{RwIntMap, RwQueue};
use crate::config::EngineConfig;
use crate::runtime::api::EngineSnapshot;

struct EngineShared {
    id: Uuid,
    config: EngineConfig,
    runner: Box<dyn ScriptRunner>,
    pool: Box<dyn ThreadPoolProvider>,
    queue: Arc<ScriptInvocationQueue>,
    invocations: ScriptInvocationPool,
    queued_futures: RwQueue<GameFuture>,
    running_futures: RwIntMap<GameFuture>,
    running_tasks: RwIntMap<Arc<ScriptExecutionTask>>,
    next_future_id: AtomicU64,
    cancel_reallocated_futures: AtomicBool,
    notifier: Notifier,
    notifications: Receiver<ScriptNotification>,
    disposed: AtomicBool,
    dispatch_task: Mutex<Option<TaskHandle>>,
    gc_task: Mutex<Option<TaskHandle>>,
}

/// Handle to a running script engine. Cloning is cheap; the engine is
/// disposed (without interrupting scripts) when the last handle drops.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_script_engine::config::EngineConfig;
/// use prometheus_script_engine::core::{ScriptBindings, ScriptEngine};
///
/// let engine = ScriptEngine::new(EngineConfig::new(), MyLanguage)?;
/// let script_id = engine.compile_script_with_path("scripts/door.lua", DOOR_SOURCE)?;
/// engine.invoke(script_id, ScriptBindings::new().with("door", 4));
///
/// loop {
///     engine.update(frame_delta);
/// }
/// ```
#[derive(Clone)]
pub struct ScriptEngine {
    shared: Arc<EngineShared>,
}

impl ScriptEngine {
    /// Builds an engine whose thread pool is chosen by `config.thread_pool`.
    ///
    /// # Errors
    ///
    /// Invalid configuration, executor creation or thread pool start-up failures.
    pub fn new<L: ScriptLanguage>(config: EngineConfig, language: L) -> ScriptResult<Self> {
        crate::builders::build_engine(config, language)
    }

    /// Builds an engine on a caller-supplied thread pool.
    ///
    /// The pool should have at least `config.max_concurrent_scripts + 1`
    /// workers so the dispatch and GC cycles always find a thread.
    ///
    /// # Errors
    ///
    /// Invalid configuration or executor creation failures.
    pub fn with_provider<L: ScriptLanguage>(
        config: EngineConfig,
        language: L,
        pool: Box<dyn ThreadPoolProvider>,
    ) -> ScriptResult<Self> {
        config.validate().map_err(ScriptError::InvalidConfig)?;
        if pool.worker_count() < config.thread_pool_size() {
            warn!(
                workers = pool.worker_count(),
                wanted = config.thread_pool_size(),
                "Thread pool smaller than max_concurrent_scripts + 1"
            );
        }

        let runner = ExecutorPool::new(language, config.max_concurrent_scripts)?;
        let (notifier, notifications) = notification::channel();
        let cancel_reallocated = config.cancel_reallocated_futures;

        let shared = Arc::new(EngineShared {
            id: Uuid::new_v4(),
            config,
            runner: Box::new(runner),
            pool,
            queue: Arc::new(ScriptInvocationQueue::new()),
            invocations: ScriptInvocationPool::new(),
            queued_futures: RwQueue::new(),
            running_futures: RwIntMap::new(),
            running_tasks: RwIntMap::new(),
            next_future_id: AtomicU64::new(1),
            cancel_reallocated_futures: AtomicBool::new(cancel_reallocated),
            notifier,
            notifications,
            disposed: AtomicBool::new(false),
            dispatch_task: Mutex::new(None),
            gc_task: Mutex::new(None),
        });

        schedule_dispatch(&shared, Duration::ZERO);
        schedule_gc(&shared);

        info!(
            engine_id = %shared.id,
            language = shared.runner.language_name(),
            max_concurrent_scripts = shared.config.max_concurrent_scripts,
            workers = shared.pool.worker_count(),
            "Script engine started"
        );
        Ok(Self { shared })
    }

    /// Unique id of this engine instance.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Name of the script language.
    #[must_use]
    pub fn language_name(&self) -> &str {
        self.shared.runner.language_name()
    }

    /// Whether scripts can run other scripts synchronously.
    #[must_use]
    pub fn supports_embedded_sync(&self) -> bool {
        self.shared.runner.supports_embedded_sync()
    }

    /// Advances one frame. Call from the game thread only.
    ///
    /// Evaluates every running future, moves futures created since the last
    /// frame into the running registry, then processes queued game-thread
    /// notifications in order.
    pub fn update(&self, delta: f32) {
        let shared = &self.shared;
        for future in shared.running_futures.values() {
            future.evaluate(delta);
        }

        let cancel_reallocated = shared.cancel_reallocated_futures.load(Ordering::Acquire);
        while let Some(future) = shared.queued_futures.poll() {
            let future_id = future.future_id();
            let Some(previous) = shared.running_futures.insert(future_id, future.clone()) else {
                continue;
            };
            if cancel_reallocated && !previous.ptr_eq(&future) {
                debug!(future_id, "Skipping reallocated future");
                previous.skip_future();
            }
        }

        for notification in shared.notifications.try_iter() {
            notification.process();
        }
    }

    /// Queues `script_id` with default priority and no listener.
    pub fn invoke(&self, script_id: ScriptId, bindings: ScriptBindings) -> TaskId {
        self.invoke_compiled_script(script_id, bindings, None, 0, false)
    }

    /// Queues `script_id` with default priority, reporting to `listener`.
    pub fn invoke_with_listener(
        &self,
        script_id: ScriptId,
        bindings: ScriptBindings,
        listener: Arc<dyn ScriptInvocationListener>,
    ) -> TaskId {
        self.invoke_compiled_script(script_id, bindings, Some(listener), 0, false)
    }

    /// Queues an invocation. Never blocks.
    ///
    /// Higher `priority` runs sooner; equal priorities run in invocation order.
    /// At most one `interactive` invocation runs at a time engine-wide.
    pub fn invoke_compiled_script(
        &self,
        script_id: ScriptId,
        bindings: ScriptBindings,
        listener: Option<Arc<dyn ScriptInvocationListener>>,
        priority: i32,
        interactive: bool,
    ) -> TaskId {
        let shared = &self.shared;
        let mut invocation = shared
            .invocations
            .allocate(script_id, bindings, listener, priority, interactive);
        let task_id = invocation.task_id();

        if self.is_disposed() {
            let listener = invocation.take_listener();
            shared.invocations.release(invocation);
            shared.deliver_outcome(listener.as_ref(), script_id, ScriptOutcome::Failed(ScriptError::EngineDisposed));
            return task_id;
        }

        shared.queue.offer(invocation);
        debug!(task_id, script_id, priority, interactive, "Script invocation queued");
        task_id
    }

    /// Runs `script_id` on the calling thread, bypassing the queue.
    ///
    /// The task is registered while it runs so it can be skipped. If no
    /// executor frees up within `executor_acquire_timeout`, the listener
    /// receives [`ScriptError::ExecutorUnavailable`].
    pub fn invoke_compiled_script_sync(
        &self,
        script_id: ScriptId,
        bindings: ScriptBindings,
        listener: Option<Arc<dyn ScriptInvocationListener>>,
    ) -> TaskId {
        let shared = &self.shared;
        let task_id = shared.invocations.next_task_id();

        let failure = if self.is_disposed() {
            Some(ScriptError::EngineDisposed)
        } else if !shared.runner.contains(script_id) {
            Some(ScriptError::NoSuchScript { script_id })
        } else {
            None
        };
        if let Some(error) = failure {
            shared.deliver_outcome(listener.as_ref(), script_id, ScriptOutcome::Failed(error));
            return task_id;
        }

        let timeout = shared.config.executor_acquire_timeout();
        let Some(lease) = shared.runner.lease_timeout(timeout) else {
            warn!(task_id, script_id, ?timeout, "No executor free for synchronous invocation");
            shared.deliver_outcome(
                listener.as_ref(),
                script_id,
                ScriptOutcome::Failed(ScriptError::ExecutorUnavailable { script_id }),
            );
            return task_id;
        };

        let task = ScriptExecutionTask::new(task_id, script_id);
        shared.running_tasks.insert(task_id, Arc::clone(&task));
        debug!(task_id, script_id, "Running script synchronously");
        task.run(self, lease, bindings, listener);
        task_id
    }

    /// Compiles `source` (cached by content) and queues it.
    ///
    /// # Errors
    ///
    /// Compilation errors.
    pub fn invoke_script(
        &self,
        source: &str,
        bindings: ScriptBindings,
        listener: Option<Arc<dyn ScriptInvocationListener>>,
        priority: i32,
    ) -> ScriptResult<ScriptId> {
        let script_id = self.compile_script(source)?;
        self.invoke_compiled_script(script_id, bindings, listener, priority, false);
        Ok(script_id)
    }

    /// Compiles `source`. The same content always yields the same id.
    ///
    /// # Errors
    ///
    /// [`ScriptError::InsufficientCompilers`] if no executor frees up in time,
    /// or the language's compile error.
    pub fn compile_script(&self, source: &str) -> ScriptResult<ScriptId> {
        self.shared
            .runner
            .compile(source, None, self.shared.config.executor_acquire_timeout())
    }

    /// Compiles `source` under `filepath`. A filepath compiled before returns
    /// its existing id without recompiling.
    ///
    /// # Errors
    ///
    /// As for [`compile_script`](Self::compile_script).
    pub fn compile_script_with_path(&self, filepath: &str, source: &str) -> ScriptResult<ScriptId> {
        self.shared
            .runner
            .compile(source, Some(filepath), self.shared.config.executor_acquire_timeout())
    }

    /// Reads the whole of `reader` and compiles it under `filepath`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::Io`] if reading fails, otherwise as for
    /// [`compile_script`](Self::compile_script).
    pub fn compile_script_from_reader(&self, filepath: &str, reader: impl Read) -> ScriptResult<ScriptId> {
        if let Some(script_id) = self.compiled_script_id(filepath) {
            return Ok(script_id);
        }
        let source = read_source(reader)?;
        self.compile_script_with_path(filepath, &source)
    }

    /// Id previously assigned to `filepath`.
    #[must_use]
    pub fn compiled_script_id(&self, filepath: &str) -> Option<ScriptId> {
        self.shared.runner.compiled_script_id(filepath)
    }

    /// Requests cooperative interruption of every running task of `script_id`.
    pub fn skip_script(&self, script_id: ScriptId) {
        self.shared.running_tasks.for_each(|_, task| {
            if task.script_id() == script_id {
                task.skip();
            }
        });
    }

    /// Requests cooperative interruption of one running task.
    pub fn skip_script_by_task_id(&self, task_id: TaskId) {
        self.shared.running_tasks.with(task_id, |task| task.skip());
    }

    /// Requests cooperative interruption of every running task.
    pub fn skip_all_scripts(&self) {
        self.shared.skip_all_scripts();
    }

    /// Removes queued invocations of `script_id`; their listeners receive
    /// `on_script_cancelled`. Returns how many were removed.
    pub fn cancel_queued_script(&self, script_id: ScriptId) -> usize {
        let removed = self.shared.queue.cancel_by_script_id(script_id);
        self.shared.notify_cancelled(removed)
    }

    /// Removes the queued invocation `task_id`, if still queued.
    pub fn cancel_queued_script_by_task_id(&self, task_id: TaskId) -> usize {
        let removed = self.shared.queue.cancel_by_task_id(task_id);
        self.shared.notify_cancelled(removed)
    }

    /// Removes every queued invocation.
    pub fn cancel_all_queued_scripts(&self) -> usize {
        let removed = self.shared.queue.cancel_all();
        self.shared.notify_cancelled(removed)
    }

    /// Skips every future in the running registry.
    pub fn skip_all_running_game_futures(&self) {
        for future in self.shared.running_futures.values() {
            future.skip_future();
        }
    }

    /// Skips every future created since the last [`update`](Self::update).
    pub fn skip_all_queued_game_futures(&self) {
        self.shared.queued_futures.for_each(GameFuture::skip_future);
    }

    /// Skips every known future.
    pub fn skip_all_game_futures(&self) {
        self.skip_all_queued_game_futures();
        self.skip_all_running_game_futures();
    }

    /// Whether a displaced future is skipped when another registers its id.
    #[must_use]
    pub fn cancel_reallocated_futures(&self) -> bool {
        self.shared.cancel_reallocated_futures.load(Ordering::Acquire)
    }

    /// Sets the reallocated-future policy.
    pub fn set_cancel_reallocated_futures(&self, cancel: bool) {
        self.shared
            .cancel_reallocated_futures
            .store(cancel, Ordering::Release);
    }

    /// Runs one GC sweep now. Returns how many registry entries were removed.
    pub fn collect_garbage(&self) -> usize {
        self.shared.collect_garbage()
    }

    /// Stops dispatching, cancels the GC sweep and shuts the thread pool down.
    /// With `interrupt_scripts`, running scripts and futures are skipped first.
    /// Idempotent.
    pub fn dispose(&self, interrupt_scripts: bool) {
        self.shared.dispose(interrupt_scripts);
    }

    /// Returns `true` once disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Filepaths (or ids, for scripts compiled without one) of running scripts.
    #[must_use]
    pub fn running_scripts(&self) -> Vec<String> {
        let mut scripts = Vec::new();
        self.shared.running_tasks.for_each(|_, task| {
            if !task.is_finished() {
                let script_id = task.script_id();
                scripts.push(
                    self.shared
                        .runner
                        .filepath(script_id)
                        .unwrap_or_else(|| script_id.to_string()),
                );
            }
        });
        scripts
    }

    /// Queued invocations in both lanes.
    #[must_use]
    pub fn total_scripts_queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Queued interactive invocations.
    #[must_use]
    pub fn total_interactive_scripts_queued(&self) -> usize {
        self.shared.queue.interactive_len()
    }

    /// Queued non-interactive invocations.
    #[must_use]
    pub fn total_non_interactive_scripts_queued(&self) -> usize {
        self.shared.queue.non_interactive_len()
    }

    /// Returns `true` while an interactive invocation is in flight.
    #[must_use]
    pub fn is_interactive_script_running(&self) -> bool {
        self.shared.queue.is_interactive_script_running()
    }

    /// Futures in the running registry.
    #[must_use]
    pub fn running_futures(&self) -> usize {
        self.shared.running_futures.len()
    }

    /// Futures waiting for the next [`update`](Self::update).
    #[must_use]
    pub fn queued_futures(&self) -> usize {
        self.shared.queued_futures.len()
    }

    /// Entries in the running-task registry, finished ones included until
    /// the next GC sweep.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.shared.running_tasks.len()
    }

    /// Point-in-time view of the engine.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        let shared = &self.shared;
        EngineSnapshot {
            engine_id: shared.id,
            language: shared.runner.language_name().to_owned(),
            disposed: self.is_disposed(),
            compiled_scripts: shared.runner.compiled_count(),
            queued_scripts: shared.queue.len(),
            queued_interactive_scripts: shared.queue.interactive_len(),
            interactive_script_running: shared.queue.is_interactive_script_running(),
            running_tasks: shared.running_tasks.len(),
            running_futures: shared.running_futures.len(),
            queued_futures: shared.queued_futures.len(),
            executor_pool_size: shared.runner.size(),
            available_executors: shared.runner.available(),
            thread_pool: shared.pool.stats(),
        }
    }

    pub(crate) fn next_future_id(&self) -> FutureId {
        self.shared.next_future_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn submit_game_future(&self, future: GameFuture) {
        debug!(future_id = future.future_id(), "Game future queued");
        self.shared.queued_futures.offer(future);
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }

    pub(crate) fn deliver_outcome(
        &self,
        listener: Option<&Arc<dyn ScriptInvocationListener>>,
        script_id: ScriptId,
        outcome: ScriptOutcome,
    ) {
        self.shared.deliver_outcome(listener, script_id, outcome);
    }
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("id", &self.shared.id)
            .field("language", &self.language_name())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl EngineShared {
    fn dispatch(self: &Arc<Self>) {
        while !self.disposed.load(Ordering::Acquire) && !self.queue.is_empty() {
            let Some(lease) = self.runner.try_lease() else {
                debug!(queued = self.queue.len(), "No executor free - leaving invocations queued");
                return;
            };
            let Some(invocation) = self.queue.poll() else {
                return;
            };
            self.start(invocation, lease);
        }
    }

    fn start(self: &Arc<Self>, mut invocation: ScriptInvocation, lease: Box<dyn LeasedExecutor>) {
        let task_id = invocation.task_id();
        let script_id = invocation.script_id();
        let interactive = invocation.is_interactive();
        let bindings = invocation.take_bindings();
        let listener = invocation.take_listener();
        self.invocations.release(invocation);

        let listener = if interactive {
            let wrapper: Arc<dyn ScriptInvocationListener> = Arc::new(InteractiveScriptListener::new(
                script_id,
                listener,
                Arc::clone(&self.queue),
                self.notifier.clone(),
                self.config.notify_then_allow_interaction,
                self.config.wait_for_game_thread_notifications,
                self.config.begin_notification_timeout(),
            ));
            Some(wrapper)
        } else {
            listener
        };

        if !self.runner.contains(script_id) {
            drop(lease);
            self.deliver_outcome(
                listener.as_ref(),
                script_id,
                ScriptOutcome::Failed(ScriptError::NoSuchScript { script_id }),
            );
            return;
        }

        let task = ScriptExecutionTask::new(task_id, script_id);
        self.running_tasks.insert(task_id, Arc::clone(&task));

        let weak = Arc::downgrade(self);
        let running = Arc::clone(&task);
        let rejected = listener.clone();
        let job = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                running.run(&ScriptEngine { shared }, lease, bindings, listener);
            }
        });
        match self.pool.submit(job) {
            Ok(_) => debug!(task_id, script_id, interactive, "Script dispatched"),
            Err(error) => {
                self.running_tasks.remove(task_id);
                warn!(task_id, script_id, %error, "Thread pool rejected script");
                // The interactive wrapper releases the lane on this outcome.
                self.deliver_outcome(rejected.as_ref(), script_id, ScriptOutcome::Failed(error.into()));
            }
        }
    }

    fn deliver_outcome(
        &self,
        listener: Option<&Arc<dyn ScriptInvocationListener>>,
        script_id: ScriptId,
        outcome: ScriptOutcome,
    ) {
        match (listener, outcome) {
            (Some(listener), outcome) => {
                self.notifier
                    .outcome(listener, script_id, outcome, AwaitProcessing::No);
            }
            (None, ScriptOutcome::Failed(error)) => {
                error!(script_id, %error, "Script failed");
            }
            (None, _) => {}
        }
    }

    fn notify_cancelled(&self, removed: Vec<ScriptInvocation>) -> usize {
        let count = removed.len();
        for mut invocation in removed {
            let script_id = invocation.script_id();
            debug!(task_id = invocation.task_id(), script_id, "Queued invocation cancelled");
            if let Some(listener) = invocation.take_listener() {
                self.notifier
                    .outcome(&listener, script_id, ScriptOutcome::Cancelled, AwaitProcessing::No);
            }
            self.invocations.release(invocation);
        }
        count
    }

    fn skip_all_scripts(&self) {
        self.running_tasks.for_each(|_, task| task.skip());
    }

    fn collect_garbage(&self) -> usize {
        let collected = self.running_futures.keys_matching(GameFuture::is_ready_for_gc);
        let removed_futures = self
            .running_futures
            .remove_all_if(&collected, GameFuture::is_ready_for_gc);

        let finished = self.running_tasks.keys_matching(|task| task.is_finished());
        let removed_tasks = self
            .running_tasks
            .remove_all_if(&finished, |task| task.is_finished());

        if removed_futures + removed_tasks > 0 {
            debug!(removed_futures, removed_tasks, "GC sweep");
        }
        removed_futures + removed_tasks
    }

    fn dispose(&self, interrupt_scripts: bool) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(engine_id = %self.id, interrupt_scripts, "Disposing script engine");

        if let Some(handle) = self.dispatch_task.lock().take() {
            handle.cancel(false);
        }
        if let Some(handle) = self.gc_task.lock().take() {
            handle.cancel(false);
        }

        let queued = self.queue.cancel_all();
        self.notify_cancelled(queued);

        if interrupt_scripts {
            self.skip_all_scripts();
            self.queued_futures.for_each(GameFuture::skip_future);
            for future in self.running_futures.values() {
                future.skip_future();
            }
        }

        self.pool.shutdown(interrupt_scripts);
        self.runner.close();
        info!(engine_id = %self.id, "Script engine disposed");
    }
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        self.dispose(false);
    }
}

/// Runs one dispatch cycle after `delay`, then reschedules itself so cycles
/// start `dispatch_interval` apart (immediately if a cycle overran).
fn schedule_dispatch(shared: &Arc<EngineShared>, delay: Duration) {
    if shared.disposed.load(Ordering::Acquire) {
        return;
    }
    let weak = Arc::downgrade(shared);
    let cycle = Box::new(move || {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let started = Instant::now();
        shared.dispatch();
        let next = shared
            .config
            .dispatch_interval()
            .saturating_sub(started.elapsed());
        schedule_dispatch(&shared, next);
    });
    match shared.pool.schedule(cycle, delay) {
        Ok(handle) => *shared.dispatch_task.lock() = Some(handle),
        Err(error) => debug!(engine_id = %shared.id, %error, "Dispatch cycle not rescheduled"),
    }
}

fn schedule_gc(shared: &Arc<EngineShared>) {
    let weak = Arc::downgrade(shared);
    let interval = shared.config.gc_interval();
    let sweep = Arc::new(move || {
        if let Some(shared) = weak.upgrade() {
            shared.collect_garbage();
        }
    });
    match shared.pool.schedule_at_fixed_rate(sweep, interval, interval) {
        Ok(handle) => *shared.gc_task.lock() = Some(handle),
        Err(error) => warn!(engine_id = %shared.id, %error, "GC sweep not scheduled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::{ExecutionContext, ScriptExecutor};
    use crate::core::listener::tests::RecordingListener;

    struct Nop;
    struct NopExecutor;

    impl ScriptLanguage for Nop {
        type Compiled = ();
        type Executor = NopExecutor;

        fn name(&self) -> &str {
            "nop"
        }

        fn create_executor(&self) -> ScriptResult<NopExecutor> {
            Ok(NopExecutor)
        }
    }

    impl ScriptExecutor for NopExecutor {
        type Compiled = ();

        fn compile(&mut self, _source: &str) -> ScriptResult<()> {
            Ok(())
        }

        fn execute(
            &mut self,
            _ctx: &ExecutionContext<'_, ()>,
            _compiled: &(),
            bindings: ScriptBindings,
            return_result: bool,
        ) -> ScriptResult<Option<ScriptBindings>> {
            Ok(return_result.then_some(bindings))
        }

        fn execute_embedded(
            &mut self,
            _ctx: &ExecutionContext<'_, ()>,
            _parent_script_id: ScriptId,
            _script_id: ScriptId,
            _compiled: &(),
            _bindings: &mut ScriptBindings,
        ) -> ScriptResult<()> {
            Ok(())
        }
    }

    fn engine() -> ScriptEngine {
        let config = EngineConfig::new()
            .with_max_concurrent_scripts(1)
            .with_gc_interval_ms(60_000);
        ScriptEngine::new(config, Nop).unwrap()
    }

    #[test]
    fn test_update_promotes_and_collects_futures() {
        let engine = engine();
        let future = GameFuture::new(&engine, |_delta: f32| true).unwrap();
        assert_eq!(engine.queued_futures(), 1);
        assert_eq!(engine.running_futures(), 0);

        engine.update(0.016);
        assert_eq!(engine.queued_futures(), 0);
        assert_eq!(engine.running_futures(), 1);

        engine.update(0.016);
        assert!(future.is_completed());
        assert!(future.is_ready_for_gc());
        assert_eq!(engine.collect_garbage(), 1);
        assert_eq!(engine.running_futures(), 0);
        engine.dispose(false);
    }

    #[test]
    fn test_future_ids_are_unique() {
        let engine = engine();
        let a = GameFuture::new(&engine, |_delta: f32| false).unwrap();
        let b = GameFuture::new(&engine, |_delta: f32| false).unwrap();
        assert_ne!(a.future_id(), b.future_id());
        engine.dispose(false);
    }

    #[test]
    fn test_sync_invocation_of_unknown_script() {
        let engine = engine();
        let listener = Arc::new(RecordingListener::new(false));
        let l: Arc<dyn ScriptInvocationListener> = listener.clone();
        engine.invoke_compiled_script_sync(42, ScriptBindings::new(), Some(l));
        assert_eq!(listener.events(), vec!["exception:42".to_owned()]);
        engine.dispose(false);
    }

    #[test]
    fn test_dispose_cancels_queued_invocations() {
        let config = EngineConfig::new()
            .with_max_concurrent_scripts(1)
            .with_dispatch_interval_ms(60_000)
            .with_gc_interval_ms(60_000);
        let engine = ScriptEngine::new(config, Nop).unwrap();
        let script_id = engine.compile_script("anything").unwrap();
        // Let the first dispatch cycle finish; the next one is a minute away.
        while engine.snapshot().thread_pool.completed_tasks == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let listener = Arc::new(RecordingListener::new(false));
        let l: Arc<dyn ScriptInvocationListener> = listener.clone();
        engine.invoke_with_listener(script_id, ScriptBindings::new(), l);
        engine.dispose(false);
        assert_eq!(listener.events(), vec![format!("cancelled:{script_id}")]);
        assert_eq!(engine.total_scripts_queued(), 0);
    }
}
