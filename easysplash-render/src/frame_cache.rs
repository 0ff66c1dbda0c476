//! Bounded LRU cache for resident frame images
//!
//! Backed by `lru::LruCache` for O(1) lookup, promotion and eviction. Every
//! value leaving the cache, whether evicted, replaced or dropped together
//! with the cache, goes through the eviction callback first; that is where
//! the display backend releases the image.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Called with each entry removed from the cache; must not panic
pub type EvictFn<K, V> = Box<dyn FnMut(&K, V)>;

pub struct FrameCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    on_evict: Option<EvictFn<K, V>>,
}

impl<K: Hash + Eq, V> FrameCache<K, V> {
    /// Creates a cache holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            on_evict: None,
        }
    }

    /// Creates a cache that hands every removed entry to `on_evict`
    pub fn with_eviction(capacity: NonZeroUsize, on_evict: impl FnMut(&K, V) + 'static) -> Self {
        Self {
            entries: LruCache::new(capacity),
            on_evict: Some(Box::new(on_evict)),
        }
    }

    /// Looks up an entry and marks it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Inserts an entry as most recently used
    ///
    /// If the cache is full the least recently used entry is evicted. An
    /// existing entry under the same key is evicted as well.
    pub fn put(&mut self, key: K, value: V) -> &V {
        if let Some(previous) = self.entries.pop(&key) {
            self.evict(&key, previous);
        } else if self.entries.len() >= self.entries.cap().get() {
            if let Some((lru_key, lru_value)) = self.entries.pop_lru() {
                self.evict(&lru_key, lru_value);
            }
        }

        self.entries.get_or_insert(key, || value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.entries.cap()
    }

    /// Evicts every entry
    pub fn clear(&mut self) {
        while let Some((key, value)) = self.entries.pop_lru() {
            self.evict(&key, value);
        }
    }

    fn evict(&mut self, key: &K, value: V) {
        if let Some(on_evict) = self.on_evict.as_mut() {
            on_evict(key, value);
        }
    }
}

impl<K: Hash + Eq, V> Drop for FrameCache<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}
