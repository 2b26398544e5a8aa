//! Catalog Response Cache
//!
//! TTL cache for upstream catalog responses. Entries expire lazily: an expired
//! entry is only removed when a lookup finds it. Capacity is bounded by an LRU
//! so a long-lived process cannot grow the cache without limit.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default cache capacity (distinct request URLs)
pub const DEFAULT_CAPACITY: usize = 512;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe TTL cache keyed by resolved request URL
pub struct TtlCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a live entry. An expired entry is evicted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(entry) if Instant::now() <= entry.expires_at => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Store a value, replacing any previous entry for the key.
    pub fn set(&self, key: String, value: V, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    /// Drop an entry. Returns whether one was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|mut entries| entries.pop(key).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Number of stored entries, expired ones included until they are looked up.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
