//! Data access facade over the bundled dataset and the remote store.
//!
//! The active [`DataSource`] is resolved on first use and kept until
//! [`DataManager::refresh_source`] runs again (the migrator does so after
//! writing a new schema version):
//!
//! - `Static`: no store, or the stored schema version is not compatible.
//!   Reads serve the bundled dataset and every write fails with
//!   [`Error::ReadOnly`].
//! - `Kv`: reads and writes go through the [`KvAdapter`]. A collection that
//!   has never been written falls back to its bundled counterpart.
//!
//! Reads never fail. A store error while reading is logged and the bundled
//! collection is returned, so the navigation page always has something to
//! render. Writes re-read the collection from the store, validate, and
//! replace the whole collection. Concurrent writers are last-write-wins.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::adapter::{CATEGORIES_KEY, KvAdapter, METADATA_KEY, SITES_KEY, SetOptions};
use crate::bundled::BundledDataset;
use crate::cache::CacheManager;
use crate::cache::hash::search_cache_key;
use crate::error::{Error, Result};
use crate::models::{Category, CategoryPatch, CollectionMeta, DataSource, DataSourceInfo, Metadata, Site, SitePatch};
use crate::validation::{
    check_category_deletable, check_new_category, check_new_site, check_updated_site, validate_category,
};

const CATEGORIES_CACHE_KEY: &str = "data:categories";
const SITES_CACHE_KEY: &str = "data:sites";
const SITES_BY_CATEGORY_PREFIX: &str = "data:sites:category:";
const SEARCH_PREFIX: &str = "data:search:";
const METADATA_CACHE_KEY: &str = "data:metadata";
const MANAGER_PREFIX: &str = "data:";

/// Which cached reads `clear_cache` drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    #[default]
    All,
    Categories,
    Sites,
}

impl std::str::FromStr for CacheScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "categories" => Ok(Self::Categories),
            "sites" => Ok(Self::Sites),
            other => Err(Error::InvalidInput(format!("unknown cache scope '{other}'"))),
        }
    }
}

#[derive(Clone, Copy)]
enum Collection {
    Categories,
    Sites,
}

#[derive(Debug)]
pub struct DataManager {
    adapter: Arc<KvAdapter>,
    cache: Arc<CacheManager>,
    bundled: Arc<BundledDataset>,
    source: RwLock<Option<DataSource>>,
    detect_lock: Mutex<()>,
}

impl DataManager {
    pub fn new(adapter: Arc<KvAdapter>, cache: Arc<CacheManager>, bundled: Arc<BundledDataset>) -> Self {
        Self { adapter, cache, bundled, source: RwLock::new(None), detect_lock: Mutex::new(()) }
    }

    /// Resolve the data source now instead of on first access.
    pub async fn initialize(&self) -> DataSource {
        self.source().await
    }

    /// Run detection again and switch to its result.
    pub async fn refresh_source(&self) -> DataSource {
        let _guard = self.detect_lock.lock().await;
        let source = self.detect_source().await;
        let previous = self.source.write().unwrap_or_else(PoisonError::into_inner).replace(source);
        if previous.is_some_and(|p| p != source) {
            tracing::info!(from = ?previous, to = ?source, "data source changed");
        }
        source
    }

    fn current_source(&self) -> Option<DataSource> {
        *self.source.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn source(&self) -> DataSource {
        if let Some(source) = self.current_source() {
            return source;
        }
        let _guard = self.detect_lock.lock().await;
        if let Some(source) = self.current_source() {
            return source;
        }
        let source = self.detect_source().await;
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = Some(source);
        source
    }

    async fn detect_source(&self) -> DataSource {
        if !self.adapter.is_available() {
            tracing::info!(source = "static", "remote store unavailable, serving bundled dataset");
            return DataSource::Static;
        }
        match self.adapter.check_version_compatibility().await {
            Ok(true) => {
                tracing::info!(source = "kv", "serving remote store");
                DataSource::Kv
            }
            Ok(false) => {
                tracing::warn!(source = "static", "incompatible schema version, serving bundled dataset");
                DataSource::Static
            }
            Err(e) => {
                tracing::warn!(source = "static", error = %e, "version check failed, serving bundled dataset");
                DataSource::Static
            }
        }
    }

    /// Current source selection. Does not trigger initialization.
    pub fn get_data_source_info(&self) -> DataSourceInfo {
        let current = self.current_source();
        DataSourceInfo {
            source: current.unwrap_or(DataSource::Static),
            is_kv_available: self.adapter.is_available(),
            is_initialized: current.is_some(),
        }
    }

    /// The collection under `key`, and whether it may be cached. Fallbacks
    /// taken because of a store error are not cached.
    async fn load_collection<T>(&self, key: &str, use_cache: bool, bundled: &[T]) -> (Vec<T>, bool)
    where
        T: serde::de::DeserializeOwned + Clone,
    {
        if self.source().await == DataSource::Static {
            return (bundled.to_vec(), true);
        }
        let result = if use_cache { self.adapter.get::<Vec<T>>(key).await } else { self.adapter.get_uncached(key).await };
        match result {
            Ok(Some(items)) => (items, true),
            Ok(None) => (bundled.to_vec(), true),
            Err(e) => {
                tracing::warn!(key, error = %e, "store read failed, falling back to bundled dataset");
                (bundled.to_vec(), false)
            }
        }
    }

    /// Pass `use_cache = false` to read past both cache layers.
    pub async fn get_categories(&self, use_cache: bool) -> Vec<Category> {
        if use_cache && let Some(hit) = self.cache.get_as(CATEGORIES_CACHE_KEY).await {
            return hit;
        }
        let (categories, cacheable) = self.load_collection(CATEGORIES_KEY, use_cache, &self.bundled.categories).await;
        if cacheable {
            self.cache.set_as(CATEGORIES_CACHE_KEY, &categories, None).await;
        }
        categories
    }

    pub async fn get_sites(&self, use_cache: bool) -> Vec<Site> {
        self.sites(use_cache).await.0
    }

    async fn sites(&self, use_cache: bool) -> (Vec<Site>, bool) {
        if use_cache && let Some(hit) = self.cache.get_as(SITES_CACHE_KEY).await {
            return (hit, true);
        }
        let (sites, cacheable) = self.load_collection(SITES_KEY, use_cache, &self.bundled.sites).await;
        if cacheable {
            self.cache.set_as(SITES_CACHE_KEY, &sites, None).await;
        }
        (sites, cacheable)
    }

    pub async fn get_sites_by_category(&self, category_id: &str, use_cache: bool) -> Vec<Site> {
        let key = format!("{SITES_BY_CATEGORY_PREFIX}{category_id}");
        if use_cache && let Some(hit) = self.cache.get_as(&key).await {
            return hit;
        }
        let (sites, cacheable) = self.sites(use_cache).await;
        let sites: Vec<Site> = sites.into_iter().filter(|s| s.category == category_id).collect();
        if cacheable {
            self.cache.set_as(&key, &sites, None).await;
        }
        sites
    }

    /// Case-insensitive substring search. A blank query returns every site.
    pub async fn search_sites(&self, query: &str, use_cache: bool) -> Vec<Site> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.get_sites(use_cache).await;
        }
        let key = format!("{SEARCH_PREFIX}{}", search_cache_key(&needle));
        if use_cache && let Some(hit) = self.cache.get_as(&key).await {
            return hit;
        }
        let (sites, cacheable) = self.sites(use_cache).await;
        let sites: Vec<Site> = sites.into_iter().filter(|s| s.matches(&needle)).collect();
        if cacheable {
            self.cache.set_as(&key, &sites, None).await;
        }
        sites
    }

    pub async fn get_category(&self, id: &str) -> Result<Category> {
        self.get_categories(true)
            .await
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("Category '{id}' not found")))
    }

    pub async fn get_site(&self, id: &str) -> Result<Site> {
        self.get_sites(true)
            .await
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("Site '{id}' not found")))
    }

    /// Collection counts and freshness. Counts derived after a store error
    /// are returned but not cached.
    pub async fn get_metadata(&self) -> Metadata {
        if let Some(hit) = self.cache.get_as(METADATA_CACHE_KEY).await {
            return hit;
        }
        let (metadata, cacheable) = match self.source().await {
            DataSource::Static => (self.bundled.metadata(), true),
            DataSource::Kv | DataSource::Hybrid => match self.adapter.get::<Metadata>(METADATA_KEY).await {
                Ok(Some(metadata)) => (metadata, true),
                Ok(None) => (self.derived_metadata().await, true),
                Err(e) => {
                    tracing::warn!(error = %e, "metadata read failed, deriving from collections");
                    (self.derived_metadata().await, false)
                }
            },
        };
        if cacheable {
            self.cache.set_as(METADATA_CACHE_KEY, &metadata, None).await;
        }
        metadata
    }

    async fn derived_metadata(&self) -> Metadata {
        let (categories, sites) = tokio::join!(self.get_categories(true), self.get_sites(true));
        Metadata::for_counts(categories.len(), sites.len())
    }

    async fn ensure_writable(&self) -> Result<()> {
        match self.source().await {
            DataSource::Static => Err(Error::ReadOnly(
                "serving the bundled dataset; configure the remote store to enable writes".into(),
            )),
            DataSource::Kv | DataSource::Hybrid => Ok(()),
        }
    }

    /// Authoritative copy for the write path. Store errors propagate.
    async fn current_categories(&self) -> Result<Vec<Category>> {
        Ok(self.adapter.get_uncached(CATEGORIES_KEY).await?.unwrap_or_else(|| self.bundled.categories.clone()))
    }

    async fn current_sites(&self) -> Result<Vec<Site>> {
        Ok(self.adapter.get_uncached(SITES_KEY).await?.unwrap_or_else(|| self.bundled.sites.clone()))
    }

    async fn current_collections(&self) -> Result<(Vec<Category>, Vec<Site>)> {
        let (categories, sites) = tokio::join!(self.current_categories(), self.current_sites());
        Ok((categories?, sites?))
    }

    async fn persist_categories(&self, categories: &[Category]) -> Result<()> {
        self.adapter.set(CATEGORIES_KEY, categories, SetOptions::default()).await?;
        self.cache.set_as(CATEGORIES_CACHE_KEY, categories, None).await;
        self.update_metadata(Collection::Categories, categories.len()).await;
        Ok(())
    }

    async fn persist_sites(&self, sites: &[Site]) -> Result<()> {
        self.adapter.set(SITES_KEY, sites, SetOptions::default()).await?;
        self.cache.set_as(SITES_CACHE_KEY, sites, None).await;
        self.cache.clear_prefix(SITES_BY_CATEGORY_PREFIX).await;
        self.cache.clear_prefix(SEARCH_PREFIX).await;
        self.update_metadata(Collection::Sites, sites.len()).await;
        Ok(())
    }

    /// Refresh the count for one collection. The data is already persisted,
    /// so a failure here is only logged.
    async fn update_metadata(&self, changed: Collection, count: usize) {
        let previous = match self.adapter.get_uncached::<Metadata>(METADATA_KEY).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(error = %e, "metadata read failed, rebuilding");
                None
            }
        };
        let mut metadata = match previous {
            Some(metadata) => metadata,
            None => {
                let (categories, sites) = tokio::join!(self.get_categories(true), self.get_sites(true));
                Metadata::for_counts(categories.len(), sites.len())
            }
        };
        match changed {
            Collection::Categories => metadata.categories = CollectionMeta::now(count),
            Collection::Sites => metadata.sites = CollectionMeta::now(count),
        }

        if let Err(e) = self.adapter.set(METADATA_KEY, &metadata, SetOptions::default()).await {
            tracing::warn!(error = %e, "metadata write failed");
        }
        self.cache.delete(METADATA_CACHE_KEY).await;
    }

    pub async fn add_category(&self, category: Category) -> Result<Category> {
        self.ensure_writable().await?;
        let mut categories = self.current_categories().await?;
        check_new_category(&categories, &category)?;

        categories.push(category.clone());
        self.persist_categories(&categories).await?;
        tracing::info!(id = %category.id, "category added");
        Ok(category)
    }

    pub async fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Category> {
        self.ensure_writable().await?;
        if patch.is_empty() {
            return Err(Error::InvalidInput("no fields to update".into()));
        }
        let mut categories = self.current_categories().await?;
        let category = categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("Category '{id}' not found")))?;

        patch.apply(category);
        let errors = validate_category(category);
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }
        let updated = category.clone();

        self.persist_categories(&categories).await?;
        tracing::info!(id, "category updated");
        Ok(updated)
    }

    /// Fails with a validation error while any site still references `id`.
    pub async fn delete_category(&self, id: &str) -> Result<()> {
        self.ensure_writable().await?;
        let (mut categories, sites) = self.current_collections().await?;
        check_category_deletable(&sites, id)?;

        let index = categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("Category '{id}' not found")))?;
        categories.remove(index);

        self.persist_categories(&categories).await?;
        self.cache.delete(&format!("{SITES_BY_CATEGORY_PREFIX}{id}")).await;
        tracing::info!(id, "category deleted");
        Ok(())
    }

    pub async fn add_site(&self, site: Site) -> Result<Site> {
        self.ensure_writable().await?;
        let (categories, mut sites) = self.current_collections().await?;
        check_new_site(&categories, &sites, &site)?;

        sites.push(site.clone());
        self.persist_sites(&sites).await?;
        tracing::info!(id = %site.id, category = %site.category, "site added");
        Ok(site)
    }

    pub async fn update_site(&self, id: &str, patch: SitePatch) -> Result<Site> {
        self.ensure_writable().await?;
        if patch.is_empty() {
            return Err(Error::InvalidInput("no fields to update".into()));
        }
        let (categories, mut sites) = self.current_collections().await?;
        let index = sites
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("Site '{id}' not found")))?;

        let mut updated = sites[index].clone();
        patch.apply(&mut updated);
        check_updated_site(&categories, &sites, &updated)?;
        sites[index] = updated.clone();

        self.persist_sites(&sites).await?;
        tracing::info!(id, "site updated");
        Ok(updated)
    }

    pub async fn delete_site(&self, id: &str) -> Result<()> {
        self.ensure_writable().await?;
        let mut sites = self.current_sites().await?;
        let index = sites
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("Site '{id}' not found")))?;
        sites.remove(index);

        self.persist_sites(&sites).await?;
        tracing::info!(id, "site deleted");
        Ok(())
    }

    /// Drop cached reads for `scope`, in this manager and in the adapter.
    pub async fn clear_cache(&self, scope: CacheScope) {
        match scope {
            CacheScope::All => {
                self.cache.clear_prefix(MANAGER_PREFIX).await;
                self.adapter.invalidate_all().await;
            }
            CacheScope::Categories => {
                self.cache.delete(CATEGORIES_CACHE_KEY).await;
                self.cache.delete(METADATA_CACHE_KEY).await;
                self.adapter.invalidate(CATEGORIES_KEY).await;
                self.adapter.invalidate(METADATA_KEY).await;
            }
            CacheScope::Sites => {
                self.cache.delete(SITES_CACHE_KEY).await;
                self.cache.clear_prefix(SITES_BY_CATEGORY_PREFIX).await;
                self.cache.clear_prefix(SEARCH_PREFIX).await;
                self.cache.delete(METADATA_CACHE_KEY).await;
                self.adapter.invalidate(SITES_KEY).await;
                self.adapter.invalidate(METADATA_KEY).await;
            }
        }
        tracing::debug!(?scope, "data cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterOptions, CURRENT_SCHEMA_VERSION, VERSION_KEY};
    use crate::kv::testing::FlakyKv;
    use crate::kv::{KvNamespace, MemoryKv, PutOptions};
    use std::time::Duration;

    fn dev_dataset() -> BundledDataset {
        BundledDataset::new(vec![Category::new("dev", "Dev", "💻")], vec![])
    }

    fn manager(store: Option<Arc<dyn KvNamespace>>, bundled: BundledDataset) -> DataManager {
        let cache = Arc::new(CacheManager::in_memory(Duration::from_secs(60), None));
        let adapter = Arc::new(KvAdapter::new(store, cache.clone(), AdapterOptions::default()));
        DataManager::new(adapter, cache, Arc::new(bundled))
    }

    fn github() -> Site {
        Site::new("gh", "GitHub", "https://github.com", "dev").with_short_desc("Code hosting")
    }

    #[tokio::test]
    async fn test_static_mode_serves_bundled_and_rejects_writes() {
        let bundled = BundledDataset::embedded().unwrap();
        let data = manager(None, bundled.clone());

        assert_eq!(data.get_categories(true).await, bundled.categories);
        assert!(matches!(data.add_category(Category::new("x", "X", "")).await, Err(Error::ReadOnly(_))));
        assert_eq!(data.get_sites(false).await, bundled.sites);
        assert!(matches!(data.delete_site("github").await, Err(Error::ReadOnly(_))));
        assert_eq!(data.get_data_source_info().source, DataSource::Static);
    }

    #[tokio::test]
    async fn test_data_source_info_does_not_initialize() {
        let data = manager(Some(Arc::new(MemoryKv::new())), dev_dataset());

        let info = data.get_data_source_info();
        assert!(!info.is_initialized);
        assert!(info.is_kv_available);
        assert_eq!(info.source, DataSource::Static);

        assert_eq!(data.initialize().await, DataSource::Kv);
        let info = data.get_data_source_info();
        assert!(info.is_initialized);
        assert_eq!(info.source, DataSource::Kv);
    }

    #[tokio::test]
    async fn test_incompatible_version_forces_static() {
        let kv = Arc::new(MemoryKv::new());
        let record = r#"{"version":"9.0.0","timestamp":"2026-01-01T00:00:00Z","compatibleVersions":["9.0.0"]}"#;
        kv.put(VERSION_KEY, record, PutOptions::default()).await.unwrap();
        let data = manager(Some(kv), dev_dataset());

        assert_eq!(data.initialize().await, DataSource::Static);
        assert!(matches!(data.add_site(github()).await, Err(Error::ReadOnly(_))));
    }

    #[tokio::test]
    async fn test_add_site_duplicate_url_then_blocked_category_delete() {
        let data = manager(Some(Arc::new(MemoryKv::new())), dev_dataset());

        data.add_site(github()).await.unwrap();

        let dup = Site::new("gh2", "GitHub mirror", "https://github.com", "dev");
        let err = data.add_site(dup).await.unwrap_err();
        assert!(err.to_string().contains("URL already exists"));

        let err = data.delete_category("dev").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("1 site uses this category"));

        data.delete_site("gh").await.unwrap();
        data.delete_category("dev").await.unwrap();
        assert!(data.get_categories(false).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let data = manager(Some(Arc::new(MemoryKv::new())), dev_dataset());
        data.add_site(github()).await.unwrap();

        let dangling = Site::new("x", "X", "https://x.example", "missing");
        let err = data.add_site(dangling).await.unwrap_err();
        assert!(err.to_string().contains("Category 'missing' does not exist"));

        let dup_id = Category::new("dev", "Dev again", "");
        assert!(data.add_category(dup_id).await.is_err());

        assert_eq!(data.get_sites(false).await.len(), 1);
        assert_eq!(data.get_categories(false).await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_remote_collection_is_honoured() {
        let kv = Arc::new(MemoryKv::new());
        kv.put(SITES_KEY, "[]", PutOptions::default()).await.unwrap();
        let bundled = BundledDataset::embedded().unwrap();
        let data = manager(Some(kv), bundled.clone());

        assert!(data.get_sites(true).await.is_empty());
        // Categories were never written, so the bundled ones are served.
        assert_eq!(data.get_categories(true).await, bundled.categories);
    }

    #[tokio::test]
    async fn test_read_failure_falls_back_to_bundled() {
        let kv = Arc::new(FlakyKv::new());
        let data = manager(Some(kv.clone()), BundledDataset::embedded().unwrap());
        data.initialize().await;

        kv.fail_reads(true);
        let sites = data.get_sites(false).await;
        assert_eq!(sites, data.bundled.sites);

        // Writes do not fall back.
        assert!(matches!(data.add_site(github()).await, Err(Error::Network { .. })));
    }

    #[tokio::test]
    async fn test_reads_are_cached_and_refreshed_by_writes() {
        let kv = Arc::new(FlakyKv::new());
        let data = manager(Some(kv.clone()), dev_dataset());
        data.initialize().await;

        assert!(data.get_sites(true).await.is_empty());
        let reads = kv.gets.load(std::sync::atomic::Ordering::SeqCst);
        assert!(data.get_sites(true).await.is_empty());
        assert_eq!(kv.gets.load(std::sync::atomic::Ordering::SeqCst), reads);

        data.add_site(github()).await.unwrap();
        assert_eq!(data.get_sites(true).await.len(), 1);
        assert_eq!(data.get_sites_by_category("dev", true).await.len(), 1);
    }

    #[tokio::test]
    async fn test_search_and_category_filter() {
        let data = manager(None, BundledDataset::embedded().unwrap());

        let hits = data.search_sites("RUST", true).await;
        assert!(hits.iter().any(|s| s.id == "rust-book"));
        assert!(hits.iter().all(|s| s.matches("rust")));

        // Cached search results are keyed on the normalized query.
        assert_eq!(data.search_sites("  rust ", true).await, hits);

        let all = data.search_sites("   ", true).await;
        assert_eq!(all.len(), data.bundled.sites.len());

        let dev = data.get_sites_by_category("dev", true).await;
        assert!(!dev.is_empty());
        assert!(dev.iter().all(|s| s.category == "dev"));
    }

    #[tokio::test]
    async fn test_update_site_and_category() {
        let data = manager(Some(Arc::new(MemoryKv::new())), dev_dataset());
        data.add_category(Category::new("tools", "Tools", "🧰")).await.unwrap();
        data.add_site(github()).await.unwrap();

        let patch = SitePatch { category: Some("tools".into()), ..Default::default() };
        let updated = data.update_site("gh", patch).await.unwrap();
        assert_eq!(updated.category, "tools");
        assert!(updated.last_modified.is_some());
        assert_eq!(updated.short_desc, "Code hosting");

        let bad = SitePatch { category: Some("nope".into()), ..Default::default() };
        assert!(matches!(data.update_site("gh", bad).await, Err(Error::Validation(_))));

        let renamed = data
            .update_category("tools", CategoryPatch { name: Some("Utilities".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(renamed.name, "Utilities");
        assert_eq!(data.get_category("tools").await.unwrap().name, "Utilities");

        assert!(matches!(data.update_site("missing", SitePatch::default()).await, Err(Error::InvalidInput(_))));
        let patch = SitePatch { title: Some("t".into()), ..Default::default() };
        assert!(matches!(data.update_site("missing", patch).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_metadata_tracks_writes() {
        let kv = Arc::new(MemoryKv::new());
        let data = manager(Some(kv.clone()), dev_dataset());

        data.add_site(github()).await.unwrap();
        let metadata = data.get_metadata().await;
        assert_eq!(metadata.sites.count, 1);
        assert_eq!(metadata.categories.count, 1);
        assert!(kv.raw(METADATA_KEY).is_some());
    }

    #[tokio::test]
    async fn test_metadata_failure_does_not_fail_write() {
        let kv = Arc::new(FlakyKv::new());
        kv.fail_puts_for(METADATA_KEY);
        let data = manager(Some(kv.clone()), dev_dataset());

        data.add_site(github()).await.unwrap();
        assert!(kv.inner.raw(SITES_KEY).is_some());
        assert!(kv.inner.raw(METADATA_KEY).is_none());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_store_read() {
        let kv = Arc::new(MemoryKv::new());
        let data = manager(Some(kv.clone()), dev_dataset());
        data.add_site(github()).await.unwrap();

        // Out-of-band write, invisible until the cache is cleared.
        kv.put(SITES_KEY, "[]", PutOptions::default()).await.unwrap();
        assert_eq!(data.get_sites(true).await.len(), 1);

        data.clear_cache(CacheScope::Sites).await;
        assert!(data.get_sites(true).await.is_empty());
    }

    #[tokio::test]
    async fn test_version_record_present_keeps_kv_mode() {
        let kv = Arc::new(MemoryKv::new());
        let cache = Arc::new(CacheManager::in_memory(Duration::from_secs(60), None));
        let adapter = Arc::new(KvAdapter::new(Some(kv), cache.clone(), AdapterOptions::default()));
        adapter.set_version(CURRENT_SCHEMA_VERSION).await.unwrap();

        let data = DataManager::new(adapter, cache, Arc::new(dev_dataset()));
        assert_eq!(data.initialize().await, DataSource::Kv);
    }

    #[tokio::test]
    async fn test_metadata_fallback_after_read_error_is_not_cached() {
        let kv = Arc::new(FlakyKv::new());
        let stored = serde_json::to_string(&Metadata::for_counts(3, 7)).unwrap();
        kv.inner.put(METADATA_KEY, &stored, PutOptions::default()).await.unwrap();
        let data = manager(Some(kv.clone()), dev_dataset());
        assert_eq!(data.initialize().await, DataSource::Kv);

        kv.fail_reads(true);
        let derived = data.get_metadata().await;
        assert_eq!(derived.categories.count, 1);
        assert_eq!(derived.sites.count, 0);
        assert!(data.cache.get(METADATA_CACHE_KEY).await.is_none());

        kv.fail_reads(false);
        let metadata = data.get_metadata().await;
        assert_eq!(metadata.categories.count, 3);
        assert_eq!(metadata.sites.count, 7);
        assert!(data.cache.get(METADATA_CACHE_KEY).await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_source_picks_up_new_version() {
        let kv = Arc::new(MemoryKv::new());
        let record = r#"{"version":"9.0.0","timestamp":"2026-01-01T00:00:00Z","compatibleVersions":["9.0.0"]}"#;
        kv.put(VERSION_KEY, record, PutOptions::default()).await.unwrap();
        let data = manager(Some(kv), dev_dataset());
        assert_eq!(data.initialize().await, DataSource::Static);

        data.adapter.set_version(CURRENT_SCHEMA_VERSION).await.unwrap();
        assert_eq!(data.initialize().await, DataSource::Static);

        assert_eq!(data.refresh_source().await, DataSource::Kv);
        assert_eq!(data.get_data_source_info().source, DataSource::Kv);
        data.add_site(github()).await.unwrap();
    }

    #[test]
    fn test_cache_scope_parse() {
        assert_eq!("sites".parse::<CacheScope>().unwrap(), CacheScope::Sites);
        assert_eq!("".parse::<CacheScope>().unwrap(), CacheScope::All);
        assert!("everything".parse::<CacheScope>().is_err());
    }
}
