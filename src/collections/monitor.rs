//! Epoch-counting monitor for wait/notify handoff.
//!
//! A [`Monitor`] pairs a `parking_lot::Mutex` with a `parking_lot::Condvar`, but
//! instead of guarding user data it guards a notification counter (the *epoch*).
//! Waiters snapshot the epoch *before* checking their condition and then wait for
//! the epoch to move. Any notification issued after the snapshot bumps the epoch,
//! so a wakeup that lands between the condition check and the wait is never lost.
//!
//! This lets the containers in this module keep their data behind a
//! `parking_lot::RwLock` (many readers) while still offering blocking
//! producer/consumer operations.
//!
//! # Examples
//!
//! ```
//! use prometheus_script_engine::collections::Monitor;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let monitor = Arc::new(Monitor::new());
//! let ready = Arc::new(AtomicBool::new(false));
//!
//! let (m, r) = (Arc::clone(&monitor), Arc::clone(&ready));
//! let signaller = thread::spawn(move || {
//!     r.store(true, Ordering::SeqCst);
//!     m.notify_all();
//! });
//!
//! loop {
//!     let seen = monitor.epoch();
//!     if ready.load(Ordering::SeqCst) {
//!         break;
//!     }
//!     monitor.wait(seen);
//! }
//! signaller.join().unwrap();
//! ```

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Wait/notify primitive keyed on a monotonically increasing epoch.
#[derive(Debug, Default)]
pub struct Monitor {
    epoch: Mutex<u64>,
    condvar: Condvar,
}

impl Monitor {
    /// Creates a monitor at epoch zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            epoch: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Returns the current epoch. Take this before checking the wait condition.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Blocks until the epoch differs from `seen`.
    ///
    /// Returns immediately if a notification already happened after `seen` was taken.
    pub fn wait(&self, seen: u64) {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            self.condvar.wait(&mut epoch);
        }
    }

    /// Blocks until the epoch differs from `seen` or `timeout` elapses.
    ///
    /// Returns `true` if a notification was observed, `false` on timeout.
    pub fn wait_for(&self, seen: u64, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(seen, deadline),
            None => {
                self.wait(seen);
                true
            }
        }
    }

    /// Blocks until the epoch differs from `seen` or `deadline` passes.
    ///
    /// Returns `true` if a notification was observed, `false` on timeout.
    pub fn wait_until(&self, seen: u64, deadline: Instant) -> bool {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            if self.condvar.wait_until(&mut epoch, deadline).timed_out() {
                return *epoch != seen;
            }
        }
        true
    }

    /// Advances the epoch and wakes one waiter.
    pub fn notify_one(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        drop(epoch);
        self.condvar.notify_one();
    }

    /// Advances the epoch and wakes every waiter.
    pub fn notify_all(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        drop(epoch);
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_returns_when_notified_before_wait() {
        let monitor = Monitor::new();
        let seen = monitor.epoch();
        monitor.notify_one();
        // Must not block: the notification happened after the snapshot.
        monitor.wait(seen);
        assert_eq!(monitor.epoch(), seen + 1);
    }

    #[test]
    fn test_wait_for_times_out() {
        let monitor = Monitor::new();
        let seen = monitor.epoch();
        let start = Instant::now();
        assert!(!monitor.wait_for(seen, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_notify_all_wakes_every_waiter() {
        let monitor = Arc::new(Monitor::new());
        let seen = monitor.epoch();
        let mut handles = vec![];

        for _ in 0..4 {
            let monitor = Arc::clone(&monitor);
            handles.push(thread::spawn(move || monitor.wait_for(seen, Duration::from_secs(5))));
        }

        thread::sleep(Duration::from_millis(20));
        monitor.notify_all();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
