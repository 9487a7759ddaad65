//! In-memory TTL cache for volatile data (realtime quotes).
//!
//! Expiry is checked lazily on read; an expired entry is dropped by the read
//! that notices it. There is no capacity bound and no background sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Key → (value, stored_at) map with per-read TTL.
#[derive(Debug, Clone)]
pub struct MemoryCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Value for `key` if it was stored no more than `ttl` ago.
    pub fn get(&mut self, key: &str, ttl: Duration) -> Option<V> {
        self.get_at(key, ttl, Instant::now())
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored keys, expired-but-unread ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&mut self, key: &str, ttl: Duration, now: Instant) -> Option<V> {
        let stored_at = self.entries.get(key)?.stored_at;
        if now.saturating_duration_since(stored_at) > ttl {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    fn set_at(&mut self, key: impl Into<String>, value: V, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }
}

impl<V: Clone> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
