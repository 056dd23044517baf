//! Cooperative interruption of worker threads.
//!
//! Every task run by a thread pool gets an [`InterruptHandle`]. While the task
//! runs, the handle is bound to the worker thread (see [`InterruptHandle::enter`])
//! so code deep inside a script, such as a game future wait, can observe the
//! request through [`interrupted`] without any reference to the task.
//!
//! A blocked waiter registers the [`Monitor`] it sleeps on, so
//! [`InterruptHandle::interrupt`] wakes it immediately instead of leaving it to
//! poll the flag.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collections::Monitor;

thread_local! {
    static CURRENT: RefCell<Option<InterruptHandle>> = const { RefCell::new(None) };
}

#[derive(Debug, Default)]
struct InterruptState {
    requested: AtomicBool,
    blocker: Mutex<Option<Arc<Monitor>>>,
}

/// Shared interrupt flag for one task.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    state: Arc<InterruptState>,
}

impl InterruptHandle {
    /// Creates a handle with the flag cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes the monitor the task is blocked on, if any.
    pub fn interrupt(&self) {
        self.state.requested.store(true, Ordering::SeqCst);
        let blocker = self.state.blocker.lock().clone();
        if let Some(monitor) = blocker {
            monitor.notify_all();
        }
    }

    /// Returns `true` if the flag is raised, leaving it untouched.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// Clears the flag, returning whether it was raised.
    pub fn clear(&self) -> bool {
        self.state.requested.swap(false, Ordering::SeqCst)
    }

    /// Binds this handle to the current thread until the guard drops.
    #[must_use = "the handle is unbound as soon as the guard drops"]
    pub fn enter(&self) -> InterruptScope {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        InterruptScope { previous }
    }

    /// Returns `true` if both handles share one flag.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn block_on(&self, monitor: &Arc<Monitor>) -> BlockerRegistration<'_> {
        *self.state.blocker.lock() = Some(Arc::clone(monitor));
        BlockerRegistration { handle: self }
    }
}

/// Restores the previously bound handle on drop.
#[derive(Debug)]
pub struct InterruptScope {
    previous: Option<InterruptHandle>,
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

struct BlockerRegistration<'a> {
    handle: &'a InterruptHandle,
}

impl Drop for BlockerRegistration<'_> {
    fn drop(&mut self) {
        *self.handle.state.blocker.lock() = None;
    }
}

/// The handle bound to the current thread.
#[must_use]
pub fn current() -> Option<InterruptHandle> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Returns `true` if the current thread's task has been interrupted,
/// leaving the flag raised.
#[must_use]
pub fn is_interrupted() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(InterruptHandle::is_interrupted)
    })
}

/// Checks and clears the current thread's interrupt flag.
///
/// Returns `false` on threads without a bound handle.
pub fn interrupted() -> bool {
    CURRENT.with(|current| current.borrow().as_ref().is_some_and(InterruptHandle::clear))
}

/// Outcome of [`wait_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition became true.
    Ready,
    /// The current thread was interrupted first. The flag is left raised.
    Interrupted,
}

/// Blocks on `monitor` until `ready` returns `true` or the current thread is
/// interrupted.
///
/// `ready` must be re-checked after each notification of `monitor`, so whoever
/// makes it true must call `monitor.notify_all()` afterwards.
pub fn wait_until(monitor: &Arc<Monitor>, mut ready: impl FnMut() -> bool) -> WaitOutcome {
    let handle = current();
    let _registration = handle.as_ref().map(|h| h.block_on(monitor));
    loop {
        let seen = monitor.epoch();
        if ready() {
            return WaitOutcome::Ready;
        }
        if handle.as_ref().is_some_and(InterruptHandle::is_interrupted) {
            return WaitOutcome::Interrupted;
        }
        monitor.wait(seen);
    }
}
