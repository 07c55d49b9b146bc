//! Bounded least-frequently-used cache.
//!
//! Two instances back the pipeline: one maps shortcut keywords to their
//! expansion text, the other holds resolved credential values. Every entry
//! carries an access count; when the cache is full the entry with the
//! smallest count is evicted, ties going to the entry inserted first.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

#[derive(Debug)]
struct CacheEntry {
    value: String,
    access_count: u64,
    /// Insertion sequence, used to break access-count ties deterministically.
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// Thread-safe LFU cache of `String -> String`.
///
/// All operations take a single internal lock, so a `get` racing a `set`
/// observes either the old or the new entry, never a torn one.
#[derive(Debug)]
pub struct ReplacementCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ReplacementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `key`, bumping its access count on a hit.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(key)?;
        entry.access_count += 1;
        Some(entry.value.clone())
    }

    /// Insert `key` with an access count of one, evicting the least
    /// frequently used entry first if the cache is full.
    ///
    /// Overwriting an existing key never evicts; it replaces the value and
    /// resets the count.
    pub fn set(&self, key: &str, value: &str) {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        if let Some(entry) = inner.entries.get_mut(key) {
            entry.value = value.to_string();
            entry.access_count = 1;
            entry.seq = seq;
            return;
        }

        if inner.entries.len() >= self.capacity {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.access_count, entry.seq))
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                trace!(evicted = %victim, "Cache full, evicting");
                inner.entries.remove(&victim);
            }
        }

        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                access_count: 1,
                seq,
            },
        );
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn miss_has_no_side_effect() {
        let cache = ReplacementCache::new(2);
        assert_eq!(cache.get("nope"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_frequently_used() {
        let cache = ReplacementCache::new(2);
        cache.set("A", "alpha");
        cache.set("B", "beta");
        assert_eq!(cache.get("A").as_deref(), Some("alpha"));

        cache.set("C", "gamma");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("B"), None);
        assert_eq!(cache.get("A").as_deref(), Some("alpha"));
        assert_eq!(cache.get("C").as_deref(), Some("gamma"));
    }

    #[test]
    fn ties_evict_oldest_insertion() {
        let cache = ReplacementCache::new(3);
        cache.set("first", "1");
        cache.set("second", "2");
        cache.set("third", "3");
        cache.set("fourth", "4");

        assert_eq!(cache.get("first"), None);
        assert!(cache.get("second").is_some());
        assert!(cache.get("fourth").is_some());
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = ReplacementCache::new(2);
        cache.set("A", "alpha");
        cache.set("B", "beta");
        cache.set("A", "ALPHA");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("A").as_deref(), Some("ALPHA"));
        assert_eq!(cache.get("B").as_deref(), Some("beta"));
    }

    #[test]
    fn never_exceeds_capacity_under_contention() {
        let cache = Arc::new(ReplacementCache::new(16));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}-{}", t, i);
                        cache.set(&key, "v");
                        cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= cache.capacity());
    }

    #[test]
    fn clear_empties_everything() {
        let cache = ReplacementCache::new(4);
        cache.set("A", "alpha");
        cache.set("B", "beta");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("A"), None);
    }
}
