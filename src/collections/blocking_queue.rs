//! Capacity-bounded blocking queue for producer/consumer handoff.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::Monitor;

/// FIFO queue with a fixed capacity.
///
/// Storage sits behind a `parking_lot::Mutex`; blocking operations wait on two
/// [`Monitor`]s, one signalled when items arrive and one when space frees up.
/// Closing the queue wakes every waiter; `take` keeps draining remaining items
/// and returns `None` only once the queue is both closed and empty.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    item_added: Monitor,
    item_removed: Monitor,
    closed: AtomicBool,
}

impl<T> BlockingQueue<T> {
    /// Creates a queue that holds at most `capacity` items.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            item_added: Monitor::new(),
            item_removed: Monitor::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Maximum number of items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Free slots left before `put` blocks.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the queue and wakes every blocked producer and consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.item_added.notify_all();
        self.item_removed.notify_all();
    }

    /// Adds an item without blocking. Hands the item back if full or closed.
    pub fn offer(&self, item: T) -> Result<(), T> {
        if self.is_closed() {
            return Err(item);
        }
        self.try_push(item)?;
        self.item_added.notify_one();
        Ok(())
    }

    /// Adds an item, blocking while the queue is full.
    ///
    /// Hands the item back if the queue is closed.
    pub fn put(&self, item: T) -> Result<(), T> {
        let mut pending = item;
        loop {
            let seen = self.item_removed.epoch();
            if self.is_closed() {
                return Err(pending);
            }
            match self.try_push(pending) {
                Ok(()) => {
                    self.item_added.notify_one();
                    return Ok(());
                }
                Err(item) => pending = item,
            }
            self.item_removed.wait(seen);
        }
    }

    /// Adds an item, blocking for at most `timeout` while the queue is full.
    pub fn offer_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut pending = item;
        loop {
            let seen = self.item_removed.epoch();
            if self.is_closed() {
                return Err(pending);
            }
            match self.try_push(pending) {
                Ok(()) => {
                    self.item_added.notify_one();
                    return Ok(());
                }
                Err(item) => pending = item,
            }
            if !self.item_removed.wait_until(seen, deadline) && Instant::now() >= deadline {
                return Err(pending);
            }
        }
    }

    /// Removes the head item without blocking.
    pub fn poll(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.item_removed.notify_one();
        }
        item
    }

    /// Removes the head item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn take(&self) -> Option<T> {
        loop {
            let seen = self.item_added.epoch();
            if let Some(item) = self.poll() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            self.item_added.wait(seen);
        }
    }

    /// Removes the head item, blocking for at most `timeout` while empty.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let seen = self.item_added.epoch();
            if let Some(item) = self.poll() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            if !self.item_added.wait_until(seen, deadline) && Instant::now() >= deadline {
                return self.poll();
            }
        }
    }

    /// Takes every queued item.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = self.items.lock().drain(..).collect();
        if !items.is_empty() {
            self.item_removed.notify_all();
        }
        items
    }

    fn try_push(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        Ok(())
    }
}
