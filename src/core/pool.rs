//! Free-list object pool for frequently recycled records.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// A record that can be recycled through an [`ObjectPool`].
pub trait Poolable: Send {
    /// Clears every field that must not leak into the next user.
    fn reset(&mut self);
}

/// Thread-safe free list.
///
/// The list sits behind a `parking_lot::Mutex` so records only need to be
/// `Send`.
///
/// `allocate` pops a recycled instance or builds a new one with the factory;
/// `release` resets the instance and pushes it back, dropping it instead once
/// `max_retained` instances are already pooled.
pub struct ObjectPool<T: Poolable> {
    free: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    max_retained: usize,
    created: AtomicUsize,
}

impl<T: Poolable> ObjectPool<T> {
    /// Default upper bound on pooled instances.
    pub const DEFAULT_MAX_RETAINED: usize = 1024;

    /// Creates a pool that builds new instances with `factory`.
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            max_retained: Self::DEFAULT_MAX_RETAINED,
            created: AtomicUsize::new(0),
        }
    }

    /// Caps how many released instances are kept.
    #[must_use]
    pub const fn with_max_retained(mut self, max_retained: usize) -> Self {
        self.max_retained = max_retained;
        self
    }

    /// Pops a pooled instance or builds a new one.
    pub fn allocate(&self) -> T {
        let recycled = self.free.lock().pop();
        recycled.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        })
    }

    /// Resets `item` and returns it to the pool.
    pub fn release(&self, mut item: T) {
        item.reset();
        let mut free = self.free.lock();
        // Over the cap the item is simply dropped.
        if free.len() < self.max_retained {
            free.push(item);
        }
    }

    /// Instances currently pooled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Returns `true` if nothing is pooled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.lock().is_empty()
    }

    /// Instances built by the factory over the pool's lifetime.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl<T: Poolable> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("pooled", &self.len())
            .field("created", &self.created())
            .field("max_retained", &self.max_retained)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct Record {
        payload: Option<String>,
    }

    impl Poolable for Record {
        fn reset(&mut self) {
            self.payload = None;
        }
    }

    #[test]
    fn test_release_resets_and_recycles() {
        let pool = ObjectPool::new(Record::default);
        let mut record = pool.allocate();
        record.payload = Some("secret".into());
        pool.release(record);
        assert_eq!(pool.len(), 1);

        let record = pool.allocate();
        assert!(record.payload.is_none());
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_max_retained_drops_extras() {
        let pool = ObjectPool::new(Record::default).with_max_retained(2);
        let records: Vec<_> = (0..5).map(|_| pool.allocate()).collect();
        for record in records {
            pool.release(record);
        }
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_concurrent_allocate_release() {
        let pool = Arc::new(ObjectPool::new(Record::default));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let record = pool.allocate();
                        pool.release(record);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.created() <= 8);
        assert_eq!(pool.len(), pool.created());
    }
}
