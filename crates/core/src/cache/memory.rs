//! In-process cache tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{CacheBackend, CacheEntry, now_ms};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Logical access clock per key; the smallest tick is least recently used.
    access: HashMap<String, u64>,
    tick: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        self.tick += 1;
        self.access.insert(key.to_string(), self.tick);
    }

    fn remove(&mut self, key: &str) -> bool {
        self.access.remove(key);
        self.entries.remove(key).is_some()
    }

    fn evict_lru(&mut self) -> Option<String> {
        let victim = self.access.iter().min_by_key(|(_, tick)| **tick).map(|(key, _)| key.clone())?;
        self.remove(&victim);
        Some(victim)
    }
}

/// HashMap-backed cache with lazy expiry and an optional LRU bound.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_entries: Option<usize>,
    evictions: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self { inner: Mutex::new(Inner::default()), max_entries, evictions: AtomicU64::new(0) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a prebuilt entry, keeping its original timestamps.
    ///
    /// Used when promoting an entry from a slower tier.
    pub fn put_entry(&self, entry: CacheEntry) {
        let mut inner = self.lock();
        let key = entry.key.clone();
        let is_new = !inner.entries.contains_key(&key);

        if is_new && let Some(max) = self.max_entries {
            while inner.entries.len() >= max {
                match inner.evict_lru() {
                    Some(victim) => {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(key = %victim, "evicted least recently used entry");
                    }
                    None => break,
                }
            }
        }

        inner.entries.insert(key.clone(), entry);
        inner.touch(&key);
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.lock();
        let entry = inner.entries.get(key)?.clone();
        if entry.is_expired() {
            inner.remove(key);
            return None;
        }
        inner.touch(key);
        Some(entry)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.put_entry(CacheEntry::new(key, value, ttl));
    }

    async fn delete(&self, key: &str) {
        self.lock().remove(key);
    }

    async fn delete_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        let keys: Vec<String> = inner.entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        for key in &keys {
            inner.remove(key);
        }
        keys.len()
    }

    async fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.access.clear();
    }

    async fn cleanup(&self) -> usize {
        let now = now_ms();
        let mut inner = self.lock();
        let expired: Vec<String> =
            inner.entries.values().filter(|e| e.is_expired_at(now)).map(|e| e.key.clone()).collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    async fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
