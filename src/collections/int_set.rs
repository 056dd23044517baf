//! Open-addressing set of `u64` identifiers.

use super::IntMap;

/// Set of integer ids backed by [`IntMap`].
#[derive(Debug, Clone, Default)]
pub struct IntSet {
    map: IntMap<()>,
}

impl IntSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set that holds `expected` ids without growing.
    #[must_use]
    pub fn with_capacity(expected: usize) -> Self {
        Self {
            map: IntMap::with_capacity(expected),
        }
    }

    /// Adds `id`. Returns `true` if it was not already present.
    pub fn add(&mut self, id: u64) -> bool {
        self.map.insert(id, ()).is_none()
    }

    /// Removes `id`. Returns `true` if it was present.
    pub fn remove(&mut self, id: u64) -> bool {
        self.map.remove(id).is_some()
    }

    /// Returns `true` if `id` is present.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.map.contains_key(id)
    }

    /// Number of ids.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over the ids in slot order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.map.keys()
    }

    /// Removes every id.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl FromIterator<u64> for IntSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<u64> for IntSet {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        for id in iter {
            self.add(id);
        }
    }
}
