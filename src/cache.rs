//! Per-inference-kind result cache: LRU eviction + per-entry TTL.
//!
//! Grounded on `promptkit-executor::vm_cache::VmCache`, which also hand-rolls
//! its eviction over a plain map rather than reaching for an LRU crate; here
//! the eviction order must be true LRU (the teacher's cache tolerates random
//! eviction since it only pools fungible VM instances) so the map is kept in
//! insertion/access order via `IndexMap`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

struct Entry {
    value: Value,
    expires_at: Instant,
}

struct Inner {
    // Front = least recently used, back = most recently used.
    entries: IndexMap<u64, Entry>,
}

/// Cache statistics snapshot (`spec.md` §4.2 `Stats()`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = self.hits as f64 / total as f64;
            ratio
        }
    }
}

/// A fixed-capacity fingerprint -> inference-result cache, one instance per
/// inference kind (`spec.md` §4.2).
pub struct ResultCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// `capacity <= 0` disables the cache: every `get` misses and `put` is
    /// a no-op, per `spec.md` §4.2.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let ttl = ttl.max(Duration::from_secs(1));
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, Duration::from_secs(60))
    }

    /// Returns `Some(result)` on a cache hit, `None` on miss (including an
    /// expired entry, which is evicted as part of the lookup).
    pub fn get(&self, fingerprint: u64) -> Option<Value> {
        if self.capacity == 0 {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get(&fingerprint) else {
            drop(inner);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.expires_at < Instant::now() {
            inner.entries.shift_remove(&fingerprint);
            drop(inner);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        // Bump recency: move this entry to the back of the map.
        let (_, entry) = inner
            .entries
            .shift_remove_full(&fingerprint)
            .map(|(_, k, v)| (k, v))
            .expect("entry observed present above");
        let value = entry.value.clone();
        inner.entries.insert(fingerprint, entry);
        drop(inner);

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Stores a deep copy of `result`; the caller may freely mutate its own
    /// copy afterward without affecting the cached value (`spec.md` §4.2).
    pub fn put(&self, fingerprint: u64, result: &Value) {
        if self.capacity == 0 {
            return;
        }

        let mut inner = self.inner.lock();
        inner.entries.shift_remove(&fingerprint);
        inner.entries.insert(
            fingerprint,
            Entry {
                value: result.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        while inner.entries.len() > self.capacity {
            inner.entries.shift_remove_index(0);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.inner.lock().entries.len(),
            capacity: self.capacity,
            ttl_seconds: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
