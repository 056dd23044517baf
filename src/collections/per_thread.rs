//! Thread-indexed state for adapters that keep an interpreter per thread.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::RwMap;

/// One lazily created `T` per OS thread.
///
/// Values are shared through `Arc<Mutex<T>>` so the owning thread can hold the
/// lock while another thread (e.g. a disposing host) inspects or clears the map.
#[derive(Debug)]
pub struct PerThread<T> {
    values: RwMap<ThreadId, Arc<Mutex<T>>>,
}

impl<T> Default for PerThread<T> {
    fn default() -> Self {
        Self {
            values: RwMap::new(),
        }
    }
}

impl<T> PerThread<T> {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current thread's value, creating it with `init` on first use.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> Arc<Mutex<T>> {
        self.values
            .get_or_insert_with(thread::current().id(), || Arc::new(Mutex::new(init())))
    }

    /// Runs `f` with the current thread's value, creating it first if needed.
    pub fn with<R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let value = self.get_or_init(init);
        let mut guard = value.lock();
        f(&mut guard)
    }

    /// Drops the current thread's value.
    pub fn remove_current(&self) -> Option<Arc<Mutex<T>>> {
        self.values.remove(&thread::current().id())
    }

    /// Number of threads holding a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no thread holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every thread's value.
    pub fn clear(&self) {
        self.values.clear();
    }
}
