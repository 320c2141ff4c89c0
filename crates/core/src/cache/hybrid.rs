//! Two-tier cache: memory in front of the local durable tier.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{CacheBackend, CacheEntry, DurableCache, MemoryCache};

/// Reads try memory first, then the durable tier. A durable hit is promoted
/// into memory with its original timestamps so it expires at the same time
/// in both tiers. Writes and deletes go to both.
#[derive(Debug)]
pub struct HybridCache {
    memory: MemoryCache,
    durable: DurableCache,
}

impl HybridCache {
    pub fn new(memory: MemoryCache, durable: DurableCache) -> Self {
        Self { memory, durable }
    }
}

#[async_trait]
impl CacheBackend for HybridCache {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.get(key).await {
            return Some(entry);
        }
        let entry = self.durable.get_entry(key).await?;
        tracing::trace!(key, "promoting durable hit to memory");
        self.memory.put_entry(entry.clone());
        Some(entry)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry::new(key, value, ttl);
        self.memory.put_entry(entry.clone());
        self.durable.put_entry(entry).await;
    }

    async fn delete(&self, key: &str) {
        self.memory.delete(key).await;
        self.durable.delete(key).await;
    }

    async fn delete_prefix(&self, prefix: &str) -> usize {
        let in_memory = self.memory.delete_prefix(prefix).await;
        let durable = self.durable.delete_prefix(prefix).await;
        in_memory.max(durable)
    }

    async fn clear(&self) {
        self.memory.clear().await;
        self.durable.clear().await;
    }

    async fn cleanup(&self) -> usize {
        self.memory.cleanup().await + self.durable.cleanup().await
    }

    /// Size of the durable tier, which holds a superset of memory.
    async fn len(&self) -> usize {
        self.durable.len().await
    }

    fn evictions(&self) -> u64 {
        self.memory.evictions() + self.durable.evictions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINUTE: Duration = Duration::from_secs(60);

    async fn hybrid(max_memory: Option<usize>) -> HybridCache {
        HybridCache::new(MemoryCache::new(max_memory), DurableCache::session(None).await.unwrap())
    }

    #[tokio::test]
    async fn test_write_through_both_tiers() {
        let cache = hybrid(None).await;
        cache.set("k", json!(1), MINUTE).await;

        assert!(cache.memory.get("k").await.is_some());
        assert!(cache.durable.get("k").await.is_some());
    }

    #[tokio::test]
    async fn test_durable_hit_is_promoted() {
        let cache = hybrid(None).await;
        cache.durable.set("k", json!("durable"), MINUTE).await;
        assert_eq!(cache.memory.len().await, 0);

        let entry = cache.get("k").await.unwrap();
        assert_eq!(entry.data, json!("durable"));

        let promoted = cache.memory.get("k").await.unwrap();
        assert_eq!(promoted.created_at, entry.created_at);
    }

    #[tokio::test]
    async fn test_memory_eviction_falls_back_to_durable() {
        let cache = hybrid(Some(1)).await;
        cache.set("a", json!("a"), MINUTE).await;
        cache.set("b", json!("b"), MINUTE).await;

        assert_eq!(cache.memory.len().await, 1);
        assert_eq!(cache.get("a").await.unwrap().data, json!("a"));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_delete_and_clear_hit_both_tiers() {
        let cache = hybrid(None).await;
        cache.set("a", json!(1), MINUTE).await;
        cache.set("b", json!(2), MINUTE).await;

        cache.delete("a").await;
        assert!(cache.get("a").await.is_none());

        cache.clear().await;
        assert!(cache.get("b").await.is_none());
        assert_eq!(cache.len().await, 0);
    }
}
