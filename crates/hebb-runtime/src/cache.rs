//! Bounded query cache with wholesale invalidation.
//!
//! Entries are evicted least-recently-used once the cache is full and
//! dropped all at once by [`QueryCache::invalidate`]. A capacity of zero
//! disables caching: every lookup misses and nothing is stored.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub capacity: usize,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct Entries<K, V> {
    map: HashMap<K, V>,
    /// Most recently used at the end.
    access_order: Vec<K>,
}

pub struct QueryCache<K, V> {
    entries: Mutex<Entries<K, V>>,
    capacity: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl<K: Eq + Hash + Clone, V: Clone> QueryCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                access_order: Vec::new(),
            }),
            capacity: AtomicUsize::new(capacity),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity.load(Ordering::Relaxed) > 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.map.get(key).cloned() {
            Some(value) => {
                entries.access_order.retain(|k| k != key);
                entries.access_order.push(key.clone());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        if capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.map.insert(key.clone(), value).is_some() {
            entries.access_order.retain(|k| *k != key);
        }
        entries.access_order.push(key);
        self.evict_to(&mut entries, capacity);
    }

    /// Cached value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    fn evict_to(&self, entries: &mut Entries<K, V>, capacity: usize) {
        while entries.map.len() > capacity && !entries.access_order.is_empty() {
            let oldest = entries.access_order.remove(0);
            entries.map.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every entry. Returns how many were dropped.
    pub fn invalidate(&self) -> usize {
        let mut entries = self.entries.lock();
        let dropped = entries.map.len();
        entries.map.clear();
        entries.access_order.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        dropped
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        self.evict_to(&mut entries, capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let capacity = self.capacity.load(Ordering::Relaxed);
        CacheStats {
            enabled: capacity > 0,
            capacity,
            size: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_and_miss_counts() {
        let cache: QueryCache<&str, u32> = QueryCache::new(4);
        assert_eq!(cache.get(&"a"), None);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"a"), Some(1));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = QueryCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.insert("c", 3);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn invalidation_is_wholesale() {
        let cache = QueryCache::new(8);
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            cache.insert(k, v);
        }
        assert_eq!(cache.invalidate(), 3);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn zero_capacity_disables() {
        let cache = QueryCache::new(0);
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_insert_with("a", || {
                calls += 1;
                7
            });
        }
        assert_eq!(calls, 3);
        assert!(!cache.stats().enabled);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn shrinking_capacity_evicts() {
        let cache = QueryCache::new(4);
        for k in 0..4 {
            cache.insert(k, k);
        }
        cache.set_capacity(1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&3), Some(3));
    }
}
