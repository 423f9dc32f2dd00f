//! Bounded associative cache with access-order eviction.

use std::hash::Hash;

use indexmap::IndexMap;

/// A map that holds at most `capacity` entries.
///
/// Map order is recency order: [`get`](LruCache::get) moves the hit entry to
/// the back, and inserting a *new* key at capacity evicts the front (least
/// recently accessed) entry first. Replacing the value of an existing key
/// leaves its recency untouched. The capacity is fixed at construction.
///
/// The cache does no internal locking; callers that mutate it from several
/// threads must serialize access themselves.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    entries: IndexMap<K, V>,
    capacity: usize,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    /// Create a cache bounded at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        LruCache {
            entries: IndexMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up `key`, marking it most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let index = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get(key)
    }

    /// Insert `value` under `key`, evicting the least-recently-used entry
    /// when a new key would exceed capacity.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, value);
    }
}
