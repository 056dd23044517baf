//! Read-write-lock guarded hash map.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

/// A `HashMap` behind a `parking_lot::RwLock`.
///
/// Reads take the shared lock and return clones or snapshots so no guard ever
/// escapes; writes take the exclusive lock for the shortest possible time.
#[derive(Debug)]
pub struct RwMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for RwMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> RwMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one for the key.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Inserts only if the key is absent. Returns `true` if inserted.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Removes a key.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Runs `f` against the value under the read lock.
    pub fn with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.inner.read().get(key).map(f)
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&self, f: impl FnMut(&K, &mut V) -> bool) {
        self.inner.write().retain(f);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl<K, V> RwMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns a clone of the value for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Returns a clone of the value for `key`, inserting `init()` first if absent.
    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> V {
        if let Some(value) = self.inner.read().get(&key) {
            return value.clone();
        }
        self.inner.write().entry(key).or_insert_with(init).clone()
    }

    /// Snapshot of all values.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }
}

impl<K, V> RwMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Snapshot of all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_if_absent() {
        let map = RwMap::new();
        assert!(map.put_if_absent("a", 1));
        assert!(!map.put_if_absent("a", 2));
        assert_eq!(map.get(&"a"), Some(1));
    }

    #[test]
    fn test_get_or_insert_with_only_initialises_once() {
        let map = RwMap::new();
        assert_eq!(map.get_or_insert_with(7, || "first"), "first");
        assert_eq!(map.get_or_insert_with(7, || "second"), "first");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_concurrent_writers() {
        let map = Arc::new(RwMap::new());
        let mut handles = vec![];
        for t in 0..8u32 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for i in 0..100u32 {
                    map.insert(t * 1000 + i, i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 800);
        map.retain(|_, v| *v < 50);
        assert_eq!(map.len(), 400);
    }
}
