//! Host-thread notifications.
//!
//! Listeners that touch host-owned state ask for their callbacks on the game
//! thread. Workers then package the callback as a [`ScriptNotification`] and
//! push it onto a crossbeam channel that [`ScriptEngine::update`] drains in
//! FIFO order.
//!
//! [`ScriptEngine::update`]: crate::core::ScriptEngine::update

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use super::listener::{ScriptInvocationListener, ScriptOutcome};
use super::ScriptId;
use crate::collections::Monitor;
use crate::util::interrupt::{self, WaitOutcome};

/// Completion flag a worker can block on until the host processed a notification.
///
/// The flag is raised when the notification is processed *or* dropped unprocessed
/// (engine disposed), so a waiting worker is never stranded.
#[derive(Debug, Default)]
pub struct ProcessedSignal {
    processed: AtomicBool,
    monitor: Arc<Monitor>,
}

impl ProcessedSignal {
    /// Returns `true` once the notification has been handled.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    fn mark(&self) {
        self.processed.store(true, Ordering::Release);
        self.monitor.notify_all();
    }

    /// Blocks until processed or `timeout` elapses. Returns `true` if processed.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let seen = self.monitor.epoch();
            if self.is_processed() {
                return true;
            }
            if interrupt::is_interrupted()
                || (!self.monitor.wait_until(seen, deadline) && Instant::now() >= deadline)
            {
                return self.is_processed();
            }
        }
    }

    /// Blocks until processed or the current task is interrupted.
    pub fn wait(&self) -> bool {
        interrupt::wait_until(&self.monitor, || self.is_processed()) == WaitOutcome::Ready
    }
}

/// What a notification delivers.
#[derive(Debug)]
pub enum NotificationKind {
    /// `on_script_begin`.
    Begin,
    /// The script's final outcome.
    Outcome(ScriptOutcome),
}

/// A listener callback queued for the game thread.
pub struct ScriptNotification {
    listener: Arc<dyn ScriptInvocationListener>,
    script_id: ScriptId,
    kind: Option<NotificationKind>,
    signal: Option<Arc<ProcessedSignal>>,
}

impl ScriptNotification {
    /// Packages a callback.
    pub fn new(
        listener: Arc<dyn ScriptInvocationListener>,
        script_id: ScriptId,
        kind: NotificationKind,
    ) -> Self {
        Self {
            listener,
            script_id,
            kind: Some(kind),
            signal: None,
        }
    }

    /// Attaches a signal that fires once this notification is processed.
    #[must_use]
    pub fn with_signal(mut self, signal: Arc<ProcessedSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Script the callback is about.
    #[must_use]
    pub const fn script_id(&self) -> ScriptId {
        self.script_id
    }

    /// Runs the callback on the current (game) thread.
    pub fn process(mut self) {
        match self.kind.take() {
            Some(NotificationKind::Begin) => self.listener.on_script_begin(self.script_id),
            Some(NotificationKind::Outcome(outcome)) => {
                outcome.deliver_to(self.listener.as_ref(), self.script_id);
            }
            None => {}
        }
    }
}

impl Drop for ScriptNotification {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.mark();
        }
    }
}

impl fmt::Debug for ScriptNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptNotification")
            .field("script_id", &self.script_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Creates the worker-to-host notification channel.
pub(crate) fn channel() -> (Notifier, Receiver<ScriptNotification>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Notifier { tx }, rx)
}

/// Routes listener callbacks directly or through the game-thread channel.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: Sender<ScriptNotification>,
}

/// How long a worker waits for a marshalled notification.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AwaitProcessing {
    /// Fire and forget.
    No,
    /// Wait at most this long.
    Bounded(Duration),
    /// Wait until processed or interrupted.
    Unbounded,
}

impl Notifier {
    /// Queues a notification for the game thread.
    pub(crate) fn send(&self, notification: ScriptNotification) {
        // A closed channel means the engine is gone; dropping the notification
        // still releases any waiter.
        let _ = self.tx.send(notification);
    }

    /// Calls `on_script_begin`, on the game thread if the listener asks for it.
    pub(crate) fn begin(
        &self,
        listener: &Arc<dyn ScriptInvocationListener>,
        script_id: ScriptId,
        wait: AwaitProcessing,
    ) {
        self.route(listener, script_id, NotificationKind::Begin, wait);
    }

    /// Delivers `outcome`, on the game thread if the listener asks for it.
    pub(crate) fn outcome(
        &self,
        listener: &Arc<dyn ScriptInvocationListener>,
        script_id: ScriptId,
        outcome: ScriptOutcome,
        wait: AwaitProcessing,
    ) {
        self.route(listener, script_id, NotificationKind::Outcome(outcome), wait);
    }

    fn route(
        &self,
        listener: &Arc<dyn ScriptInvocationListener>,
        script_id: ScriptId,
        kind: NotificationKind,
        wait: AwaitProcessing,
    ) {
        if !listener.call_on_game_thread() {
            ScriptNotification::new(Arc::clone(listener), script_id, kind).process();
            return;
        }
        let notification = ScriptNotification::new(Arc::clone(listener), script_id, kind);
        match wait {
            AwaitProcessing::No => self.send(notification),
            AwaitProcessing::Bounded(timeout) => {
                let signal = Arc::new(ProcessedSignal::default());
                self.send(notification.with_signal(Arc::clone(&signal)));
                if !signal.wait_for(timeout) {
                    tracing::warn!(
                        script_id,
                        ?timeout,
                        "game thread did not process notification in time"
                    );
                }
            }
            AwaitProcessing::Unbounded => {
                let signal = Arc::new(ProcessedSignal::default());
                self.send(notification.with_signal(Arc::clone(&signal)));
                signal.wait();
            }
        }
    }
}
