//! Pluggable TTL cache with LRU eviction.
//!
//! One [`CacheBackend`] interface, four strategies:
//!
//! - `memory`: in-process map ([`MemoryCache`])
//! - `local`: SQLite file that survives restarts ([`DurableCache`])
//! - `session`: in-memory SQLite database scoped to the process ([`DurableCache`])
//! - `hybrid`: memory tier fronting the local tier, with read-through
//!   promotion ([`HybridCache`])
//!
//! The strategy is resolved once when the [`CacheManager`] is built. The cache
//! is never the system of record: every failure below the manager is logged
//! and reported as a miss.

pub mod connection;
pub mod durable;
pub mod hash;
pub mod hybrid;
pub mod memory;
pub mod migrations;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::{CacheConfig, CacheStrategy};

pub use connection::CacheDb;
pub use durable::{DurableCache, DurableScope};
pub use hybrid::HybridCache;
pub use memory::MemoryCache;

/// Current wall-clock time in milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A cached value with its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, data: Value, ttl: Duration) -> Self {
        Self { key: key.into(), data, created_at: now_ms(), ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX) }
    }

    /// An entry is expired once `now - created_at > ttl`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now.saturating_sub(self.created_at) > i64::try_from(self.ttl_ms).unwrap_or(i64::MAX)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// Storage tier behind the [`CacheManager`].
///
/// Implementations absorb their own I/O failures.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name for logs and stats.
    fn name(&self) -> &'static str;

    /// Live entry for `key`. Expired entries are removed and reported absent.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    async fn set(&self, key: &str, value: Value, ttl: Duration);

    async fn delete(&self, key: &str);

    /// Remove every entry whose key starts with `prefix`, returning the count.
    async fn delete_prefix(&self, prefix: &str) -> usize;

    async fn clear(&self);

    /// Purge expired entries, returning how many were removed.
    async fn cleanup(&self) -> usize;

    /// Number of stored entries, expired or not.
    async fn len(&self) -> usize;

    /// Entries dropped to honour a capacity bound since creation.
    fn evictions(&self) -> u64 {
        0
    }
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub strategy: String,
    pub backend: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Front door to the configured cache strategy.
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    strategy: CacheStrategy,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("strategy", &self.strategy)
            .field("backend", &self.backend.name())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, strategy: CacheStrategy, default_ttl: Duration) -> Self {
        Self { backend, strategy, default_ttl, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    /// In-process cache, used when no durable tier is wanted.
    pub fn in_memory(default_ttl: Duration, max_entries: Option<usize>) -> Self {
        Self::new(Arc::new(MemoryCache::new(max_entries)), CacheStrategy::Memory, default_ttl)
    }

    /// Build the backend for the configured strategy.
    ///
    /// A durable tier that cannot be opened degrades to the memory strategy.
    pub async fn from_config(config: &CacheConfig) -> Self {
        let ttl = config.default_ttl();
        let backend: Arc<dyn CacheBackend> = match config.strategy {
            CacheStrategy::Memory => Arc::new(MemoryCache::new(config.max_entries)),
            CacheStrategy::Local => match DurableCache::local(&config.db_path, config.max_entries).await {
                Ok(durable) => Arc::new(durable),
                Err(e) => return Self::degraded(config, &e),
            },
            CacheStrategy::Session => match DurableCache::session(config.max_entries).await {
                Ok(durable) => Arc::new(durable),
                Err(e) => return Self::degraded(config, &e),
            },
            CacheStrategy::Hybrid => match DurableCache::local(&config.db_path, None).await {
                Ok(durable) => Arc::new(HybridCache::new(MemoryCache::new(config.max_entries), durable)),
                Err(e) => return Self::degraded(config, &e),
            },
        };

        tracing::info!(strategy = %config.strategy, backend = backend.name(), "cache initialized");
        Self::new(backend, config.strategy, ttl)
    }

    fn degraded(config: &CacheConfig, err: &crate::Error) -> Self {
        tracing::warn!(
            strategy = %config.strategy,
            path = %config.db_path.display(),
            error = %err,
            "durable cache unavailable, falling back to memory"
        );
        Self::in_memory(config.default_ttl(), config.max_entries)
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.backend.get(key).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Typed read. A value that no longer matches `T` is dropped and
    /// reported absent.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value has unexpected shape, discarding");
                self.backend.delete(key).await;
                None
            }
        }
    }

    /// Store `value`; `ttl` defaults to the configured lifetime.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.backend.set(key, value, ttl.unwrap_or(self.default_ttl)).await;
    }

    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl).await,
            Err(e) => tracing::warn!(key, error = %e, "value not cacheable, skipping"),
        }
    }

    pub async fn delete(&self, key: &str) {
        self.backend.delete(key).await;
    }

    /// Invalidate every key under `prefix`.
    pub async fn clear_prefix(&self, prefix: &str) -> usize {
        let removed = self.backend.delete_prefix(prefix).await;
        tracing::debug!(prefix, removed, "cleared cache prefix");
        removed
    }

    pub async fn clear(&self) {
        self.backend.clear().await;
    }

    pub async fn cleanup(&self) -> usize {
        self.backend.cleanup().await
    }

    pub async fn len(&self) -> usize {
        self.backend.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            strategy: self.strategy.to_string(),
            backend: self.backend.name().to_string(),
            entries: self.backend.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.backend.evictions(),
        }
    }

    /// Run `cleanup` every `interval` until the returned task is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> CleanupTask {
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.cleanup().await;
                if removed > 0 {
                    tracing::debug!(removed, "cache cleanup purged expired entries");
                }
            }
        });
        CleanupTask { handle }
    }
}

/// Handle to the background cleanup loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct CleanupTask {
    handle: JoinHandle<()>,
}

impl CleanupTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
