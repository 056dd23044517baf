//! Read-write-lock guarded priority queue.

use std::collections::BinaryHeap;

use parking_lot::RwLock;

/// A `BinaryHeap` (max-first by `Ord`) behind a `parking_lot::RwLock`.
///
/// Callers encode their ordering in `Ord`; the greatest element is polled first.
#[derive(Debug)]
pub struct RwPriorityQueue<T: Ord> {
    heap: RwLock<BinaryHeap<T>>,
}

impl<T: Ord> Default for RwPriorityQueue<T> {
    fn default() -> Self {
        Self {
            heap: RwLock::new(BinaryHeap::new()),
        }
    }
}

impl<T: Ord> RwPriorityQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty queue with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: RwLock::new(BinaryHeap::with_capacity(capacity)),
        }
    }

    /// Inserts an item. O(log n).
    pub fn offer(&self, item: T) {
        self.heap.write().push(item);
    }

    /// Removes the greatest item. O(log n).
    pub fn poll(&self) -> Option<T> {
        if self.heap.read().is_empty() {
            return None;
        }
        self.heap.write().pop()
    }

    /// Removes the greatest item only if `accept` approves it.
    pub fn poll_if(&self, accept: impl FnOnce(&T) -> bool) -> Option<T> {
        let mut heap = self.heap.write();
        if heap.peek().is_some_and(accept) {
            heap.pop()
        } else {
            None
        }
    }

    /// Runs `f` on the greatest item under the read lock.
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.heap.read().peek().map(f)
    }

    /// Removes every item matching `predicate` and returns them (unordered).
    ///
    /// The heap is rebuilt without the removed items.
    pub fn remove_if(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut heap = self.heap.write();
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(heap.len());
        for item in heap.drain() {
            if predicate(&item) {
                removed.push(item);
            } else {
                kept.push(item);
            }
        }
        *heap = BinaryHeap::from(kept);
        removed
    }

    /// Takes every item in priority order.
    pub fn drain_sorted(&self) -> Vec<T> {
        let heap = std::mem::take(&mut *self.heap.write());
        let mut items = heap.into_sorted_vec();
        items.reverse();
        items
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.read().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.read().is_empty()
    }

    /// Counts items matching `predicate` under the read lock.
    pub fn count_matching(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.heap.read().iter().filter(|item| predicate(item)).count()
    }
}
