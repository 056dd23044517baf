//! Game futures: cross-frame cooperative suspension for running scripts.
//!
//! A script running on a worker creates a [`GameFuture`] for something that
//! happens on the game thread (an animation finishing, a timer, a dialogue
//! choice) and blocks in [`GameFuture::wait_for_completion`]. The engine
//! evaluates every registered future once per [`ScriptEngine::update`] until
//! its condition holds.
//!
//! ```text
//! Active ──complete──▶ Completed ──evaluate──▶ CompletedCollected
//!   │ ────skip_future──▶ FutureSkipped ──▶ FutureSkippedCollected
//!   └─────interrupt────▶ ScriptSkipped ──▶ ScriptSkippedCollected
//! ```
//!
//! Every transition is a compare-and-set, so only one transition out of
//! `Active` is ever accepted. The collected states mark a future as ready for
//! removal by the engine's GC sweep.
//!
//! [`ScriptEngine::update`]: crate::core::ScriptEngine::update

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::ScriptEngine;
use super::error::{ScriptError, ScriptResult};
use super::FutureId;
use crate::collections::Monitor;
use crate::util::interrupt::{self, WaitOutcome};

/// The condition a game future waits on.
///
/// Closures `FnMut(f32) -> bool` implement this directly.
pub trait FutureCondition: Send {
    /// Advances the condition by `delta` seconds. Returns `true` once satisfied.
    fn update(&mut self, delta: f32) -> bool;

    /// Called on the game thread after the future was skipped.
    fn on_future_skipped(&mut self) {}

    /// Called on the game thread after the owning script was skipped.
    fn on_script_skipped(&mut self) {}
}

impl<F> FutureCondition for F
where
    F: FnMut(f32) -> bool + Send,
{
    fn update(&mut self, delta: f32) -> bool {
        self(delta)
    }
}

/// Lifecycle state of a [`GameFuture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FutureState {
    /// Waiting for its condition.
    Active = 0,
    /// Skipped from outside; waiters return normally.
    FutureSkipped = 1,
    /// The owning script was skipped; waiters get [`ScriptError::ScriptSkipped`].
    ScriptSkipped = 2,
    /// The condition was satisfied.
    Completed = 3,
    /// `FutureSkipped`, callback delivered.
    FutureSkippedCollected = 11,
    /// `ScriptSkipped`, callback delivered.
    ScriptSkippedCollected = 12,
    /// `Completed`, observed by the engine.
    CompletedCollected = 13,
}

impl FutureState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::FutureSkipped,
            2 => Self::ScriptSkipped,
            3 => Self::Completed,
            11 => Self::FutureSkippedCollected,
            12 => Self::ScriptSkippedCollected,
            13 => Self::CompletedCollected,
            _ => Self::Active,
        }
    }

    /// Returns `true` for any state other than `Active`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Returns `true` once the engine may drop the future.
    #[must_use]
    pub const fn is_collected(self) -> bool {
        matches!(
            self,
            Self::FutureSkippedCollected | Self::ScriptSkippedCollected | Self::CompletedCollected
        )
    }
}

struct FutureInner {
    id: FutureId,
    state: AtomicU8,
    condition: Mutex<Box<dyn FutureCondition>>,
    monitor: Arc<Monitor>,
}

/// A condition a running script is waiting on, evaluated once per frame.
///
/// Cloning yields another handle to the same future.
#[derive(Clone)]
pub struct GameFuture {
    inner: Arc<FutureInner>,
}

impl GameFuture {
    /// Creates and registers a future with the next id from `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::ScriptSkipped`] if the calling script has already
    /// been interrupted. The future is still registered and is collected as
    /// script-skipped on the next update.
    pub fn new(engine: &ScriptEngine, condition: impl FutureCondition + 'static) -> ScriptResult<Self> {
        Self::with_id(engine, engine.next_future_id(), condition)
    }

    /// Creates and registers a future under a caller-chosen id.
    ///
    /// If a future with the same id is still running when this one is moved
    /// into the running registry, the older one is skipped when the engine's
    /// `cancel_reallocated_futures` policy is on, and left alone otherwise.
    ///
    /// # Errors
    ///
    /// As for [`GameFuture::new`].
    pub fn with_id(
        engine: &ScriptEngine,
        id: FutureId,
        condition: impl FutureCondition + 'static,
    ) -> ScriptResult<Self> {
        let future = Self::detached(id, condition);
        engine.submit_game_future(future.clone());

        if interrupt::interrupted() {
            future.transition(FutureState::Active, FutureState::ScriptSkipped);
            return Err(ScriptError::ScriptSkipped);
        }
        Ok(future)
    }

    /// Creates a future that no engine knows about.
    pub(crate) fn detached(id: FutureId, condition: impl FutureCondition + 'static) -> Self {
        Self {
            inner: Arc::new(FutureInner {
                id,
                state: AtomicU8::new(FutureState::Active as u8),
                condition: Mutex::new(Box::new(condition)),
                monitor: Arc::new(Monitor::new()),
            }),
        }
    }

    /// Unique id of this future.
    #[must_use]
    pub fn future_id(&self) -> FutureId {
        self.inner.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> FutureState {
        FutureState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: FutureState, to: FutureState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Advances the future by one frame. Game thread only.
    pub(crate) fn evaluate(&self, delta: f32) {
        let mut condition = self.inner.condition.lock();
        match self.state() {
            FutureState::ScriptSkipped => {
                condition.on_script_skipped();
                self.transition(FutureState::ScriptSkipped, FutureState::ScriptSkippedCollected);
            }
            FutureState::FutureSkipped => {
                condition.on_future_skipped();
                self.transition(FutureState::FutureSkipped, FutureState::FutureSkippedCollected);
            }
            FutureState::Completed => {
                self.transition(FutureState::Completed, FutureState::CompletedCollected);
            }
            FutureState::Active => {
                if condition.update(delta) {
                    self.complete();
                    self.transition(FutureState::Completed, FutureState::CompletedCollected);
                }
            }
            _ => {}
        }
    }

    /// Marks the future completed and wakes every waiter.
    ///
    /// Has no effect unless the future is still active.
    pub fn complete(&self) {
        if self.transition(FutureState::Active, FutureState::Completed) {
            self.inner.monitor.notify_all();
        }
    }

    /// Gives up on the future. Waiters return `Ok` without the condition holding.
    pub fn skip_future(&self) {
        if self.transition(FutureState::Active, FutureState::FutureSkipped) {
            self.inner.monitor.notify_all();
        }
    }

    /// Blocks the calling script until the future completes or is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::ScriptSkipped`] if the owning script was skipped,
    /// including when the calling task is interrupted while waiting. The
    /// interrupt flag is cleared so it does not leak into the next script run
    /// on the same worker.
    pub fn wait_for_completion(&self) -> ScriptResult<()> {
        let outcome = interrupt::wait_until(&self.inner.monitor, || self.state().is_terminal());
        if outcome == WaitOutcome::Interrupted {
            interrupt::interrupted();
            self.transition(FutureState::Active, FutureState::ScriptSkipped);
            return Err(ScriptError::ScriptSkipped);
        }
        if self.is_script_skipped() {
            return Err(ScriptError::ScriptSkipped);
        }
        Ok(())
    }

    /// Short alias for [`wait_for_completion`](Self::wait_for_completion).
    ///
    /// # Errors
    ///
    /// As for [`wait_for_completion`](Self::wait_for_completion).
    pub fn wfc(&self) -> ScriptResult<()> {
        self.wait_for_completion()
    }

    /// Completed, collected or not.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.state(), FutureState::Completed | FutureState::CompletedCollected)
    }

    /// Skipped via [`skip_future`](Self::skip_future), collected or not.
    #[must_use]
    pub fn is_future_skipped(&self) -> bool {
        matches!(
            self.state(),
            FutureState::FutureSkipped | FutureState::FutureSkippedCollected
        )
    }

    /// Skipped because its script was skipped, collected or not.
    #[must_use]
    pub fn is_script_skipped(&self) -> bool {
        matches!(
            self.state(),
            FutureState::ScriptSkipped | FutureState::ScriptSkippedCollected
        )
    }

    /// Returns `true` once the engine may drop the future.
    #[must_use]
    pub fn is_ready_for_gc(&self) -> bool {
        self.state().is_collected()
    }

    /// Returns `true` if both handles point at the same future.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for GameFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameFuture")
            .field("future_id", &self.future_id())
            .field("state", &self.state())
            .finish()
    }
}
