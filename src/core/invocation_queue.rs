//! Priority queue of pending invocations with an exclusive interactive lane.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::RwLock;

use super::invocation::ScriptInvocation;
use super::{ScriptId, TaskId};
use crate::collections::RwPriorityQueue;

/// Orders invocations by priority (highest first), then FIFO by invoke time,
/// then by task id.
struct QueuedInvocation(ScriptInvocation);

impl PartialEq for QueuedInvocation {
    fn eq(&self, other: &Self) -> bool {
        self.0.task_id() == other.0.task_id()
    }
}

impl Eq for QueuedInvocation {}

impl PartialOrd for QueuedInvocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedInvocation {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; earlier timestamp and lower task id win ties
        // (reversed for the max-heap).
        self.0
            .priority()
            .cmp(&other.0.priority())
            .then_with(|| other.0.invoke_timestamp().cmp(&self.0.invoke_timestamp()))
            .then_with(|| other.0.task_id().cmp(&self.0.task_id()))
    }
}

#[derive(Default)]
struct InteractiveLane {
    queue: BinaryHeap<QueuedInvocation>,
    running: bool,
}

/// Queue of invocations waiting for a worker.
///
/// Non-interactive invocations flow through a priority lane. Interactive ones
/// wait in a separate lane from which at most one may be in flight: `poll`
/// hands out the next interactive invocation only while none is running, and
/// [`clear_interactive_script_status`](Self::clear_interactive_script_status)
/// releases the lane once the running one has delivered its result.
pub struct ScriptInvocationQueue {
    lane: RwPriorityQueue<QueuedInvocation>,
    interactive: RwLock<InteractiveLane>,
}

impl Default for ScriptInvocationQueue {
    fn default() -> Self {
        Self {
            lane: RwPriorityQueue::new(),
            interactive: RwLock::new(InteractiveLane::default()),
        }
    }
}

impl std::fmt::Debug for ScriptInvocationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInvocationQueue")
            .field("non_interactive", &self.non_interactive_len())
            .field("interactive", &self.interactive_len())
            .field("interactive_running", &self.is_interactive_script_running())
            .finish()
    }
}

impl ScriptInvocationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes the invocation to its lane.
    pub fn offer(&self, invocation: ScriptInvocation) {
        if invocation.is_interactive() {
            self.interactive
                .write()
                .queue
                .push(QueuedInvocation(invocation));
        } else {
            self.lane.offer(QueuedInvocation(invocation));
        }
    }

    /// Takes the next invocation to run.
    ///
    /// An interactive invocation is preferred while none is running; taking one
    /// marks the lane as running in the same critical section.
    pub fn poll(&self) -> Option<ScriptInvocation> {
        self.poll_interactive()
            .or_else(|| self.lane.poll().map(|queued| queued.0))
    }

    fn poll_interactive(&self) -> Option<ScriptInvocation> {
        {
            let lane = self.interactive.read();
            if lane.running || lane.queue.is_empty() {
                return None;
            }
        }
        let mut lane = self.interactive.write();
        if lane.running {
            return None;
        }
        let next = lane.queue.pop()?;
        lane.running = true;
        Some(next.0)
    }

    /// Allows the next interactive invocation to be polled.
    pub fn clear_interactive_script_status(&self) {
        self.interactive.write().running = false;
    }

    /// Returns `true` while an interactive invocation is in flight.
    #[must_use]
    pub fn is_interactive_script_running(&self) -> bool {
        self.interactive.read().running
    }

    /// Total queued invocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactive_len() + self.non_interactive_len()
    }

    /// Returns `true` if both lanes are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued interactive invocations.
    #[must_use]
    pub fn interactive_len(&self) -> usize {
        self.interactive.read().queue.len()
    }

    /// Queued non-interactive invocations.
    #[must_use]
    pub fn non_interactive_len(&self) -> usize {
        self.lane.len()
    }

    /// Removes every queued invocation of `script_id` from both lanes.
    ///
    /// The removed records are returned so the caller can notify their
    /// listeners; dropping them is fine too.
    pub fn cancel_by_script_id(&self, script_id: ScriptId) -> Vec<ScriptInvocation> {
        self.remove_matching(|invocation| invocation.script_id() == script_id)
    }

    /// Removes the queued invocation with `task_id`, if any.
    pub fn cancel_by_task_id(&self, task_id: TaskId) -> Vec<ScriptInvocation> {
        self.remove_matching(|invocation| invocation.task_id() == task_id)
    }

    /// Empties both lanes.
    pub fn cancel_all(&self) -> Vec<ScriptInvocation> {
        self.remove_matching(|_| true)
    }

    fn remove_matching(&self, predicate: impl Fn(&ScriptInvocation) -> bool) -> Vec<ScriptInvocation> {
        let mut removed: Vec<ScriptInvocation> = self
            .lane
            .remove_if(|queued| predicate(&queued.0))
            .into_iter()
            .map(|queued| queued.0)
            .collect();

        let mut lane = self.interactive.write();
        if lane.queue.iter().any(|queued| predicate(&queued.0)) {
            let (matched, kept): (Vec<_>, Vec<_>) =
                lane.queue.drain().partition(|queued| predicate(&queued.0));
            lane.queue = kept.into_iter().collect();
            removed.extend(matched.into_iter().map(|queued| queued.0));
        }
        removed
    }
}
