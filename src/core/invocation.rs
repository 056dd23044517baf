//! Invocation records and their pool.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::bindings::ScriptBindings;
use super::listener::ScriptInvocationListener;
use super::pool::{ObjectPool, Poolable};
use super::{ScriptId, TaskId};
use crate::util::clock;

/// A pending request to run a compiled script.
#[derive(Default)]
pub struct ScriptInvocation {
    task_id: TaskId,
    script_id: ScriptId,
    bindings: ScriptBindings,
    listener: Option<Arc<dyn ScriptInvocationListener>>,
    priority: i32,
    interactive: bool,
    invoke_timestamp: u64,
}

impl ScriptInvocation {
    /// Unique id of this request.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Script to run.
    #[must_use]
    pub const fn script_id(&self) -> ScriptId {
        self.script_id
    }

    /// Higher runs sooner.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether this runs in the interactive lane.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Monotonic nanoseconds at allocation, used for FIFO tie-breaking.
    #[must_use]
    pub const fn invoke_timestamp(&self) -> u64 {
        self.invoke_timestamp
    }

    /// Bindings the script will run with.
    #[must_use]
    pub const fn bindings(&self) -> &ScriptBindings {
        &self.bindings
    }

    /// Listener to notify, if any.
    #[must_use]
    pub fn listener(&self) -> Option<&Arc<dyn ScriptInvocationListener>> {
        self.listener.as_ref()
    }

    /// Moves the bindings out, leaving an empty set.
    pub(crate) fn take_bindings(&mut self) -> ScriptBindings {
        std::mem::take(&mut self.bindings)
    }

    /// Moves the listener out.
    pub(crate) fn take_listener(&mut self) -> Option<Arc<dyn ScriptInvocationListener>> {
        self.listener.take()
    }
}

impl Poolable for ScriptInvocation {
    fn reset(&mut self) {
        self.task_id = 0;
        self.script_id = 0;
        self.bindings.clear();
        self.listener = None;
        self.priority = 0;
        self.interactive = false;
        self.invoke_timestamp = 0;
    }
}

impl fmt::Debug for ScriptInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInvocation")
            .field("task_id", &self.task_id)
            .field("script_id", &self.script_id)
            .field("priority", &self.priority)
            .field("interactive", &self.interactive)
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

/// Allocates [`ScriptInvocation`]s with fresh task ids and recycles released ones.
#[derive(Debug)]
pub struct ScriptInvocationPool {
    pool: ObjectPool<ScriptInvocation>,
    next_task_id: AtomicU64,
}

impl Default for ScriptInvocationPool {
    fn default() -> Self {
        Self {
            pool: ObjectPool::new(ScriptInvocation::default),
            next_task_id: AtomicU64::new(1),
        }
    }
}

impl ScriptInvocationPool {
    /// Creates an empty pool. Task ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a task id without allocating a record (synchronous invocations).
    pub fn next_task_id(&self) -> TaskId {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Takes a record from the pool and fills it in, stamping the current time.
    pub fn allocate(
        &self,
        script_id: ScriptId,
        bindings: ScriptBindings,
        listener: Option<Arc<dyn ScriptInvocationListener>>,
        priority: i32,
        interactive: bool,
    ) -> ScriptInvocation {
        let mut invocation = self.pool.allocate();
        invocation.task_id = self.next_task_id();
        invocation.script_id = script_id;
        invocation.bindings = bindings;
        invocation.listener = listener;
        invocation.priority = priority;
        invocation.interactive = interactive;
        invocation.invoke_timestamp = clock::monotonic_nanos();
        invocation
    }

    /// Clears the record and returns it to the pool.
    pub fn release(&self, invocation: ScriptInvocation) {
        self.pool.release(invocation);
    }

    /// Records waiting in the pool.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }
}
