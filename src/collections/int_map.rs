//! Open-addressing map keyed by `u64` identifiers.
//!
//! Keys are placed with Fibonacci hashing (multiply by 2^64 / phi and keep the
//! top bits), collisions are resolved by linear probing, and removal shifts the
//! following run of entries backwards instead of leaving tombstones, so lookups
//! never degrade after churn. Capacity is always a power of two and the table
//! grows once it is 80% full.

use parking_lot::RwLock;

use super::IntSet;

const GOLDEN_RATIO: u64 = 0x9E37_79B9_7F4A_7C15;
const MIN_CAPACITY: usize = 8;

/// Integer-keyed hash map without per-key boxing or tombstones.
#[derive(Debug, Clone)]
pub struct IntMap<V> {
    slots: Vec<Option<(u64, V)>>,
    len: usize,
    shift: u32,
    threshold: usize,
}

impl<V> Default for IntMap<V> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<V> IntMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map that holds `expected` entries without growing.
    #[must_use]
    pub fn with_capacity(expected: usize) -> Self {
        let wanted = expected.saturating_mul(5) / 4 + 1;
        let capacity = wanted.next_power_of_two().max(MIN_CAPACITY);
        Self::allocate(capacity)
    }

    fn allocate(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            len: 0,
            shift: 64 - capacity.trailing_zeros(),
            threshold: capacity * 4 / 5,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn place(&self, key: u64) -> usize {
        (key.wrapping_mul(GOLDEN_RATIO) >> self.shift) as usize
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    fn find(&self, key: u64) -> Option<usize> {
        let mask = self.mask();
        let mut idx = self.place(key);
        loop {
            match &self.slots[idx] {
                None => return None,
                Some((k, _)) if *k == key => return Some(idx),
                Some(_) => idx = (idx + 1) & mask,
            }
        }
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the map is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current slot count (always a power of two).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    /// Borrows the value for `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&V> {
        let idx = self.find(key)?;
        self.slots[idx].as_ref().map(|(_, v)| v)
    }

    /// Mutably borrows the value for `key`.
    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let idx = self.find(key)?;
        self.slots[idx].as_mut().map(|(_, v)| v)
    }

    /// Inserts a value, returning the previous one for `key`.
    pub fn insert(&mut self, key: u64, value: V) -> Option<V> {
        if let Some(idx) = self.find(key) {
            return self.slots[idx]
                .as_mut()
                .map(|(_, v)| std::mem::replace(v, value));
        }
        if self.len + 1 > self.threshold {
            self.grow();
        }
        self.insert_absent(key, value);
        None
    }

    fn insert_absent(&mut self, key: u64, value: V) {
        let mask = self.mask();
        let mut idx = self.place(key);
        while self.slots[idx].is_some() {
            idx = (idx + 1) & mask;
        }
        self.slots[idx] = Some((key, value));
        self.len += 1;
    }

    fn grow(&mut self) {
        let mut grown = Self::allocate(self.slots.len() * 2);
        for (key, value) in self.slots.drain(..).flatten() {
            grown.insert_absent(key, value);
        }
        *self = grown;
    }

    /// Removes `key`, shifting the rest of its probe run back into the gap.
    pub fn remove(&mut self, key: u64) -> Option<V> {
        let mut hole = self.find(key)?;
        let (_, value) = self.slots[hole].take()?;
        self.len -= 1;

        let mask = self.mask();
        let mut next = hole;
        loop {
            next = (next + 1) & mask;
            let ideal = match &self.slots[next] {
                None => break,
                Some((k, _)) => self.place(*k),
            };
            // The entry may fill the hole only if the hole lies between its
            // ideal slot and where it sits now.
            if next.wrapping_sub(ideal) & mask >= next.wrapping_sub(hole) & mask {
                self.slots[hole] = self.slots[next].take();
                hole = next;
            }
        }
        Some(value)
    }

    /// Removes every entry, keeping the allocation.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
    }

    /// Iterates over `(key, &value)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &V)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|(k, v)| (*k, v)))
    }

    /// Iterates over the keys in slot order.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Iterates over the values in slot order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(u64, &V) -> bool) {
        let doomed: Vec<u64> = self
            .iter()
            .filter(|(k, v)| !keep(*k, v))
            .map(|(k, _)| k)
            .collect();
        for key in doomed {
            self.remove(key);
        }
    }
}

impl<V> FromIterator<(u64, V)> for IntMap<V> {
    fn from_iter<I: IntoIterator<Item = (u64, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// An [`IntMap`] behind a `parking_lot::RwLock`, used for id-keyed registries.
#[derive(Debug)]
pub struct RwIntMap<V> {
    inner: RwLock<IntMap<V>>,
}

impl<V> Default for RwIntMap<V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(IntMap::new()),
        }
    }
}

impl<V> RwIntMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one for `key`.
    pub fn insert(&self, key: u64, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Inserts only if absent. Returns `true` if inserted.
    pub fn put_if_absent(&self, key: u64, value: V) -> bool {
        let mut map = self.inner.write();
        if map.contains_key(key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Removes `key`.
    pub fn remove(&self, key: u64) -> Option<V> {
        self.inner.write().remove(key)
    }

    /// Removes every key in `keys`, returning how many were present.
    pub fn remove_all(&self, keys: &IntSet) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let mut map = self.inner.write();
        keys.iter().filter(|key| map.remove(*key).is_some()).count()
    }

    /// Removes each key in `keys` whose current value still matches
    /// `predicate`. Entries replaced since `keys` was collected are kept.
    pub fn remove_all_if(&self, keys: &IntSet, mut predicate: impl FnMut(&V) -> bool) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let mut map = self.inner.write();
        let mut removed = 0;
        for key in keys.iter() {
            if map.get(key).is_some_and(&mut predicate) {
                map.remove(key);
                removed += 1;
            }
        }
        removed
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: u64) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Runs `f` on the value under the read lock.
    pub fn with<R>(&self, key: u64, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.inner.read().get(key).map(f)
    }

    /// Runs `f` on every entry under the read lock.
    pub fn for_each(&self, mut f: impl FnMut(u64, &V)) {
        for (k, v) in self.inner.read().iter() {
            f(k, v);
        }
    }

    /// Collects the keys whose values match `predicate`.
    pub fn keys_matching(&self, mut predicate: impl FnMut(&V) -> bool) -> IntSet {
        self.inner
            .read()
            .iter()
            .filter(|(_, v)| predicate(v))
            .map(|(k, _)| k)
            .collect()
    }

    /// Snapshot of every key.
    #[must_use]
    pub fn keys(&self) -> Vec<u64> {
        self.inner.read().keys().collect()
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

    /// Removes every entry and returns them.
    pub fn drain(&self) -> Vec<(u64, V)> {
        let old = std::mem::take(&mut *self.inner.write());
        old.slots.into_iter().flatten().collect()
    }
}

impl<V: Clone> RwIntMap<V> {
    /// Clone of the value for `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Snapshot of every value.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashMap;

    #[test]
    fn test_insert_get_replace() {
        let mut map = IntMap::new();
        assert_eq!(map.insert(1, "one"), None);
        assert_eq!(map.insert(1, "uno"), Some("one"));
        assert_eq!(map.get(1), Some(&"uno"));
        assert_eq!(map.len(), 1);
        assert!(map.get(2).is_none());
    }

    #[test]
    fn test_grows_past_load_factor() {
        let mut map = IntMap::new();
        let initial = map.capacity();
        for key in 0..1_000u64 {
            map.insert(key, key * 2);
        }
        assert!(map.capacity() > initial);
        assert!(map.capacity().is_power_of_two());
        assert!(map.len() * 5 <= map.capacity() * 4);
        for key in 0..1_000u64 {
            assert_eq!(map.get(key), Some(&(key * 2)));
        }
    }

    #[test]
    fn test_backward_shift_keeps_probe_runs_reachable() {
        // Dense sequential keys force long probe runs in a small table.
        let mut map = IntMap::with_capacity(4);
        for key in 0..6u64 {
            map.insert(key << 40, key);
        }
        for key in (0..6u64).step_by(2) {
            assert_eq!(map.remove(key << 40), Some(key));
        }
        for key in (1..6u64).step_by(2) {
            assert_eq!(map.get(key << 40), Some(&key));
        }
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_matches_std_hashmap_under_random_churn() {
        let mut rng = rand::rng();
        let mut map = IntMap::new();
        let mut model = HashMap::new();
        for _ in 0..20_000 {
            let key = rng.random_range(0..512u64);
            if rng.random_bool(0.6) {
                assert_eq!(map.insert(key, key + 1), model.insert(key, key + 1));
            } else {
                assert_eq!(map.remove(key), model.remove(&key));
            }
        }
        assert_eq!(map.len(), model.len());
        for (key, value) in &model {
            assert_eq!(map.get(*key), Some(value));
        }
    }

    #[test]
    fn test_rw_int_map_remove_all() {
        let map = RwIntMap::new();
        for key in 0..10u64 {
            map.insert(key, key % 2 == 0);
        }
        let evens = map.keys_matching(|even| *even);
        assert_eq!(evens.len(), 5);
        assert_eq!(map.remove_all(&evens), 5);
        assert_eq!(map.len(), 5);
        assert!(map.values().iter().all(|even| !even));
    }
}
