//! Delay-aware priority queue keyed by scheduled start time.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::Monitor;
use crate::util::clock;

/// An item that knows when it should run.
pub trait Delayed {
    /// Monotonic start time in nanoseconds (see [`clock::monotonic_nanos`]).
    fn scheduled_start_nanos(&self) -> u64;
}

struct Entry<T> {
    start: u64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Earliest start first, then insertion order.
        other
            .start
            .cmp(&self.start)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queue whose [`take`](Self::take) blocks until the earliest item is due.
///
/// Inserting an item wakes every waiting taker so the wait is recomputed
/// against the new head. Items with equal start times come out in insertion
/// order.
pub struct DelayedPriorityQueue<T: Delayed> {
    heap: Mutex<BinaryHeap<Entry<T>>>,
    next_seq: AtomicU64,
    changed: Monitor,
    closed: AtomicBool,
}

impl<T: Delayed> Default for DelayedPriorityQueue<T> {
    fn default() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            changed: Monitor::new(),
            closed: AtomicBool::new(false),
        }
    }
}

impl<T: Delayed> std::fmt::Debug for DelayedPriorityQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedPriorityQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T: Delayed> DelayedPriorityQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item and returns its queue sequence number, usable with
    /// [`remove`](Self::remove).
    pub fn offer(&self, item: T) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let start = item.scheduled_start_nanos();
        self.heap.lock().push(Entry { start, seq, item });
        self.changed.notify_all();
        seq
    }

    /// Blocks until the head item is due and removes it.
    ///
    /// Returns `None` once the queue is closed.
    pub fn take(&self) -> Option<T> {
        loop {
            let seen = self.changed.epoch();
            if self.is_closed() {
                return None;
            }
            let now = clock::monotonic_nanos();
            let wait = {
                let mut heap = self.heap.lock();
                match heap.peek().map(|head| head.start) {
                    None => None,
                    Some(start) if start <= now => {
                        return heap.pop().map(|entry| entry.item);
                    }
                    Some(start) => Some(start - now),
                }
            };
            match wait {
                None => self.changed.wait(seen),
                Some(nanos) => {
                    self.changed.wait_for(seen, Duration::from_nanos(nanos));
                }
            }
        }
    }

    /// Removes the item inserted under `seq`, if it is still queued.
    pub fn remove(&self, seq: u64) -> Option<T> {
        let mut heap = self.heap.lock();
        if !heap.iter().any(|entry| entry.seq == seq) {
            return None;
        }
        let mut removed = None;
        let mut kept = Vec::with_capacity(heap.len());
        for entry in heap.drain() {
            if entry.seq == seq {
                removed = Some(entry.item);
            } else {
                kept.push(entry);
            }
        }
        *heap = BinaryHeap::from(kept);
        drop(heap);
        self.changed.notify_all();
        removed
    }

    /// Closes the queue; blocked and future `take` calls return `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.changed.notify_all();
    }

    /// Returns `true` once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Takes every remaining item regardless of start time.
    pub fn drain(&self) -> Vec<T> {
        self.heap.lock().drain().map(|entry| entry.item).collect()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}
