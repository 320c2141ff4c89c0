//! Typed, cached access to the remote key-value store.
//!
//! Every read is read-through and every write is write-through the
//! [`CacheManager`], under keys prefixed with [`CACHE_PREFIX`]. Store failures
//! are wrapped into [`Error::Network`] with the operation and key; unlike
//! cache failures they are never swallowed here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::cache::CacheManager;
use crate::error::{Error, Result};
use crate::kv::{KvNamespace, ListOptions, PutOptions};
use crate::models::VersionRecord;

pub const CATEGORIES_KEY: &str = "bookmarks:categories";
pub const SITES_KEY: &str = "bookmarks:sites";
pub const METADATA_KEY: &str = "bookmarks:metadata";
pub const VERSION_KEY: &str = "data:version";

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

/// Schema versions this build can read.
pub const COMPATIBLE_VERSIONS: &[&str] = &["1.0.0"];

/// Namespace for adapter entries in the shared cache.
pub const CACHE_PREFIX: &str = "kv:";

/// Adapter-wide settings.
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    /// Prepended to every logical key before it reaches the store.
    pub key_prefix: Option<String>,
    /// Cache lifetime for adapter entries; the cache default when unset.
    pub cache_ttl: Option<Duration>,
    /// `expirationTtl` applied to writes that do not set their own.
    pub expiration_ttl: Option<u64>,
}

/// Per-write settings.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub expiration_ttl: Option<u64>,
    pub metadata: Option<Value>,
    pub cache_ttl: Option<Duration>,
}

pub struct KvAdapter {
    store: Option<Arc<dyn KvNamespace>>,
    cache: Arc<CacheManager>,
    options: AdapterOptions,
}

impl std::fmt::Debug for KvAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvAdapter")
            .field("available", &self.is_available())
            .field("options", &self.options)
            .finish()
    }
}

impl KvAdapter {
    /// Wrap a store handle. A missing handle makes the adapter permanently
    /// unavailable for the life of the process.
    pub fn new(store: Option<Arc<dyn KvNamespace>>, cache: Arc<CacheManager>, options: AdapterOptions) -> Self {
        if store.is_none() {
            tracing::info!("no remote store configured, adapter unavailable");
        }
        Self { store, cache, options }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self, operation: &str, key: &str) -> Result<&Arc<dyn KvNamespace>> {
        self.store.as_ref().ok_or_else(|| Error::network(operation, key, "remote store is not available"))
    }

    fn store_key(&self, key: &str) -> String {
        match &self.options.key_prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }

    fn cache_key(key: &str) -> String {
        format!("{CACHE_PREFIX}{key}")
    }

    /// Stored text for `key`, bypassing the cache.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let store = self.store("get", key)?;
        store.get(&self.store_key(key)).await.map_err(|e| Error::network("get", key, e))
    }

    async fn fetch_value(&self, key: &str) -> Result<Option<Value>> {
        match self.get_raw(key).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Read-through get. Absent keys are not cached.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let cache_key = Self::cache_key(key);
        if let Some(hit) = self.cache.get_as::<T>(&cache_key).await {
            tracing::trace!(key, "adapter cache hit");
            return Ok(Some(hit));
        }

        let Some(value) = self.fetch_value(key).await? else {
            return Ok(None);
        };
        let typed = serde_json::from_value(value.clone())?;
        self.cache.set(&cache_key, value, self.options.cache_ttl).await;
        Ok(Some(typed))
    }

    /// Get straight from the store. Refreshes the cache on success.
    pub async fn get_uncached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let cache_key = Self::cache_key(key);
        match self.fetch_value(key).await? {
            Some(value) => {
                let typed = serde_json::from_value(value.clone())?;
                self.cache.set(&cache_key, value, self.options.cache_ttl).await;
                Ok(Some(typed))
            }
            None => {
                self.cache.delete(&cache_key).await;
                Ok(None)
            }
        }
    }

    /// Write-through set.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: SetOptions) -> Result<()> {
        let store = self.store("put", key)?;
        let value = serde_json::to_value(value)?;
        let text = serde_json::to_string(&value)?;
        let put = PutOptions {
            expiration_ttl: options.expiration_ttl.or(self.options.expiration_ttl),
            metadata: options.metadata,
        };

        store.put(&self.store_key(key), &text, put).await.map_err(|e| Error::network("put", key, e))?;
        tracing::debug!(key, bytes = text.len(), "stored value");

        self.cache.set(&Self::cache_key(key), value, options.cache_ttl.or(self.options.cache_ttl)).await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let store = self.store("delete", key)?;
        store.delete(&self.store_key(key)).await.map_err(|e| Error::network("delete", key, e))?;
        self.cache.delete(&Self::cache_key(key)).await;
        Ok(())
    }

    /// Put back a value captured with [`get_raw`](Self::get_raw), or delete
    /// the key when there was none.
    pub async fn restore_raw(&self, key: &str, previous: Option<&str>) -> Result<()> {
        let store = self.store("restore", key)?;
        let stored_key = self.store_key(key);
        let result = match previous {
            Some(text) => store.put(&stored_key, text, PutOptions::default()).await,
            None => store.delete(&stored_key).await,
        };
        self.cache.delete(&Self::cache_key(key)).await;
        result.map_err(|e| Error::network("restore", key, e))
    }

    /// Logical keys under `prefix`, in store order, paging until the listing
    /// completes or `limit` keys were collected.
    pub async fn list(&self, prefix: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
        let label = prefix.unwrap_or("*");
        let store = self.store("list", label)?;
        let store_prefix = self.options.key_prefix.as_deref().unwrap_or("");
        let full_prefix = format!("{store_prefix}{}", prefix.unwrap_or(""));

        let mut names = Vec::new();
        let mut cursor = None;
        loop {
            let options = ListOptions { prefix: Some(full_prefix.clone()), limit: None, cursor: cursor.take() };
            let page = store.list(options).await.map_err(|e| Error::network("list", label, e))?;

            for key in page.keys {
                let name = key.name.strip_prefix(store_prefix).unwrap_or(&key.name).to_string();
                names.push(name);
                if limit.is_some_and(|max| names.len() >= max) {
                    return Ok(names);
                }
            }

            if page.list_complete || page.cursor.is_none() {
                break;
            }
            cursor = page.cursor;
        }
        Ok(names)
    }

    /// Concurrent gets. A key that fails resolves to `None`.
    pub async fn batch_get<T: DeserializeOwned>(&self, keys: &[&str]) -> HashMap<String, Option<T>> {
        let results = join_all(keys.iter().map(|key| self.get::<T>(key))).await;
        keys.iter()
            .zip(results)
            .map(|(key, result)| {
                let value = result.unwrap_or_else(|e| {
                    tracing::warn!(key, error = %e, "batch get failed for key");
                    None
                });
                (key.to_string(), value)
            })
            .collect()
    }

    /// Concurrent sets. Every write is attempted; the first failure is
    /// returned.
    pub async fn batch_set<T: Serialize + Sync>(&self, entries: &[(&str, T)], options: SetOptions) -> Result<()> {
        let results = join_all(entries.iter().map(|(key, value)| self.set(key, value, options.clone()))).await;
        let mut first_error = None;
        for ((key, _), result) in entries.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(key, error = %e, "batch set failed for key");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn get_version(&self) -> Result<Option<VersionRecord>> {
        self.get(VERSION_KEY).await
    }

    /// Write the version record, marking `version` against the compatible set
    /// of this build.
    pub async fn set_version(&self, version: &str) -> Result<VersionRecord> {
        let record = VersionRecord {
            version: version.to_string(),
            timestamp: Utc::now(),
            compatible_versions: COMPATIBLE_VERSIONS.iter().map(|v| v.to_string()).collect(),
        };
        self.set(VERSION_KEY, &record, SetOptions::default()).await?;
        tracing::info!(version, "schema version recorded");
        Ok(record)
    }

    /// Whether the stored data can be trusted by this build.
    ///
    /// A missing record counts as the current version. An unavailable store
    /// is never compatible.
    pub async fn check_version_compatibility(&self) -> Result<bool> {
        if !self.is_available() {
            return Ok(false);
        }
        let record = match self.get_version().await? {
            Some(record) => record,
            None => VersionRecord {
                version: CURRENT_SCHEMA_VERSION.to_string(),
                timestamp: Utc::now(),
                compatible_versions: COMPATIBLE_VERSIONS.iter().map(|v| v.to_string()).collect(),
            },
        };

        let compatible = record.is_compatible() && COMPATIBLE_VERSIONS.contains(&record.version.as_str());
        if !compatible {
            tracing::warn!(
                found = %record.version,
                compatible = ?record.compatible_versions,
                "stored schema version is not compatible"
            );
        }
        Ok(compatible)
    }

    /// Drop the cached copy of `key`.
    pub async fn invalidate(&self, key: &str) {
        self.cache.delete(&Self::cache_key(key)).await;
    }

    /// Drop every adapter entry from the cache.
    pub async fn invalidate_all(&self) -> usize {
        self.cache.clear_prefix(CACHE_PREFIX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use crate::kv::testing::FlakyKv;
    use crate::models::Category;
    use std::sync::atomic::Ordering;

    fn cache() -> Arc<CacheManager> {
        Arc::new(CacheManager::in_memory(Duration::from_secs(60), None))
    }

    fn adapter_with(store: Arc<dyn KvNamespace>) -> KvAdapter {
        KvAdapter::new(Some(store), cache(), AdapterOptions::default())
    }

    #[tokio::test]
    async fn test_set_then_get_reads_cache() {
        let kv = Arc::new(FlakyKv::new());
        let adapter = adapter_with(kv.clone());
        let categories = vec![Category::new("dev", "Dev", "💻")];

        adapter.set(CATEGORIES_KEY, &categories, SetOptions::default()).await.unwrap();
        let read: Vec<Category> = adapter.get(CATEGORIES_KEY).await.unwrap().unwrap();

        assert_eq!(read, categories);
        assert_eq!(kv.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_populates_cache_and_skips_store_after() {
        let kv = Arc::new(FlakyKv::new());
        kv.inner.put(SITES_KEY, "[]", PutOptions::default()).await.unwrap();
        let adapter = adapter_with(kv.clone());

        let first: Option<Vec<Value>> = adapter.get(SITES_KEY).await.unwrap();
        let second: Option<Vec<Value>> = adapter.get(SITES_KEY).await.unwrap();

        assert_eq!(first, Some(vec![]));
        assert_eq!(second, Some(vec![]));
        assert_eq!(kv.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absent_key_is_none_and_not_cached() {
        let adapter = adapter_with(Arc::new(MemoryKv::new()));
        let value: Option<Vec<Value>> = adapter.get("missing").await.unwrap();
        assert!(value.is_none());
        assert!(adapter.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_error_is_network_with_context() {
        let kv = Arc::new(FlakyKv::new());
        kv.fail_reads(true);
        let adapter = adapter_with(kv);

        let err = adapter.get::<Value>(SITES_KEY).await.unwrap_err();
        match err {
            Error::Network { operation, key, .. } => {
                assert_eq!(operation, "get");
                assert_eq!(key, SITES_KEY);
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let adapter = KvAdapter::new(None, cache(), AdapterOptions::default());
        assert!(!adapter.is_available());
        assert!(adapter.get::<Value>(SITES_KEY).await.is_err());
        assert!(adapter.set(SITES_KEY, &1, SetOptions::default()).await.is_err());
        assert!(!adapter.check_version_compatibility().await.unwrap());
    }

    #[tokio::test]
    async fn test_key_prefix_applied_and_stripped() {
        let kv = Arc::new(MemoryKv::new());
        let options = AdapterOptions { key_prefix: Some("prod:".into()), ..Default::default() };
        let adapter = KvAdapter::new(Some(kv.clone()), cache(), options);

        adapter.set(CATEGORIES_KEY, &Vec::<Category>::new(), SetOptions::default()).await.unwrap();
        adapter.set(SITES_KEY, &Vec::<Category>::new(), SetOptions::default()).await.unwrap();
        adapter.set(VERSION_KEY, &"x", SetOptions::default()).await.unwrap();

        assert!(kv.raw("prod:bookmarks:categories").is_some());
        let keys = adapter.list(Some("bookmarks:"), None).await.unwrap();
        assert_eq!(keys, vec![CATEGORIES_KEY.to_string(), SITES_KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_list_pages_and_honours_limit() {
        let kv = Arc::new(MemoryKv::new());
        for i in 0..1_205 {
            kv.put(&format!("item:{i:05}"), "1", PutOptions::default()).await.unwrap();
        }
        let adapter = adapter_with(kv);

        assert_eq!(adapter.list(Some("item:"), None).await.unwrap().len(), 1_205);
        assert_eq!(adapter.list(Some("item:"), Some(10)).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_batch_get_tolerates_failures() {
        let kv = Arc::new(FlakyKv::new());
        kv.inner.put("a", "1", PutOptions::default()).await.unwrap();
        let adapter = adapter_with(kv.clone());

        // Warm "a" so it is served from cache once the store starts failing.
        let _: Option<i64> = adapter.get("a").await.unwrap();
        kv.fail_reads(true);

        let results = adapter.batch_get::<i64>(&["a", "b"]).await;
        assert_eq!(results["a"], Some(1));
        assert_eq!(results["b"], None);
    }

    #[tokio::test]
    async fn test_batch_set_attempts_all_and_reports_first_error() {
        let kv = Arc::new(FlakyKv::new());
        kv.fail_puts_for("b");
        let adapter = adapter_with(kv.clone());

        let err = adapter.batch_set(&[("a", 1), ("b", 2), ("c", 3)], SetOptions::default()).await.unwrap_err();

        assert!(matches!(err, Error::Network { ref key, .. } if key == "b"));
        assert_eq!(kv.puts.load(Ordering::SeqCst), 3);
        assert!(kv.inner.raw("a").is_some());
        assert!(kv.inner.raw("c").is_some());
    }

    #[tokio::test]
    async fn test_version_compatibility() {
        let kv = Arc::new(MemoryKv::new());
        let adapter = adapter_with(kv.clone());

        // First run: no record yet.
        assert!(adapter.check_version_compatibility().await.unwrap());

        let record = adapter.set_version(CURRENT_SCHEMA_VERSION).await.unwrap();
        assert_eq!(record.compatible_versions, vec!["1.0.0".to_string()]);
        assert!(adapter.check_version_compatibility().await.unwrap());

        let future = serde_json::json!({
            "version": "2.0.0",
            "timestamp": Utc::now(),
            "compatibleVersions": ["2.0.0"]
        });
        kv.put(VERSION_KEY, &future.to_string(), PutOptions::default()).await.unwrap();
        adapter.invalidate(VERSION_KEY).await;
        assert!(!adapter.check_version_compatibility().await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_raw_puts_back_or_deletes() {
        let kv = Arc::new(MemoryKv::new());
        kv.put("a", "\"old\"", PutOptions::default()).await.unwrap();
        let adapter = adapter_with(kv.clone());

        adapter.set("a", &"new", SetOptions::default()).await.unwrap();
        adapter.set("b", &"new", SetOptions::default()).await.unwrap();
        adapter.restore_raw("a", Some("\"old\"")).await.unwrap();
        adapter.restore_raw("b", None).await.unwrap();

        assert_eq!(adapter.get::<String>("a").await.unwrap().as_deref(), Some("old"));
        assert!(kv.raw("b").is_none());
    }

    #[tokio::test]
    async fn test_invalidate_all_only_drops_adapter_entries() {
        let cache = cache();
        cache.set("data:sites", Value::Null, None).await;
        let adapter = KvAdapter::new(Some(Arc::new(MemoryKv::new())), cache.clone(), AdapterOptions::default());
        adapter.set("a", &1, SetOptions::default()).await.unwrap();

        assert_eq!(adapter.invalidate_all().await, 1);
        assert_eq!(cache.len().await, 1);
    }
}
