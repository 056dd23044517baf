//! Read-write-lock guarded FIFO queue.

use std::collections::VecDeque;

use parking_lot::RwLock;

/// A `VecDeque` behind a `parking_lot::RwLock`.
#[derive(Debug)]
pub struct RwQueue<T> {
    inner: RwLock<VecDeque<T>>,
}

impl<T> Default for RwQueue<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(VecDeque::new()),
        }
    }
}

impl<T> RwQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty queue with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends an item at the tail.
    pub fn offer(&self, item: T) {
        self.inner.write().push_back(item);
    }

    /// Appends an item only if the queue holds fewer than `limit` items.
    ///
    /// Returns the item back when the queue is full.
    pub fn offer_bounded(&self, item: T, limit: usize) -> Result<(), T> {
        let mut queue = self.inner.write();
        if queue.len() >= limit {
            return Err(item);
        }
        queue.push_back(item);
        Ok(())
    }

    /// Removes the head item.
    pub fn poll(&self) -> Option<T> {
        // Skip the write lock when there is nothing to take.
        if self.inner.read().is_empty() {
            return None;
        }
        self.inner.write().pop_front()
    }

    /// Removes every item matching `predicate`, returning them in queue order.
    pub fn remove_if(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut queue = self.inner.write();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());
        for item in queue.drain(..) {
            if predicate(&item) {
                removed.push(item);
            } else {
                kept.push_back(item);
            }
        }
        *queue = kept;
        removed
    }

    /// Takes every queued item in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        self.inner.write().drain(..).collect()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Runs `f` over every queued item under the read lock.
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for item in self.inner.read().iter() {
            f(item);
        }
    }

    /// Removes every item.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl<T: Clone> RwQueue<T> {
    /// Clone of the head item.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.inner.read().front().cloned()
    }
}
