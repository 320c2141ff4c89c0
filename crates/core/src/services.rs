//! Composition root shared by the binaries.

use std::sync::Arc;

use crate::adapter::{AdapterOptions, KvAdapter};
use crate::bundled::BundledDataset;
use crate::cache::{CacheManager, CleanupTask};
use crate::config::AppConfig;
use crate::error::Result;
use crate::kv::KvNamespace;
use crate::manager::DataManager;
use crate::migration::Migrator;

/// Every long-lived handle, built once and passed down.
///
/// Dropping it stops the background cache cleanup.
#[derive(Debug)]
pub struct Services {
    pub cache: Arc<CacheManager>,
    pub adapter: Arc<KvAdapter>,
    pub data: Arc<DataManager>,
    pub migrator: Arc<Migrator>,
    pub bundled: Arc<BundledDataset>,
    _cleanup: CleanupTask,
}

impl Services {
    /// Wire the layers for `config`. `store` is the remote store handle, if
    /// the environment provides one.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn build(config: &AppConfig, store: Option<Arc<dyn KvNamespace>>) -> Result<Self> {
        let bundled = Arc::new(BundledDataset::from_config(config)?);
        if let Err(e) = bundled.validate() {
            tracing::warn!(error = %e, "bundled dataset violates invariants, serving it anyway");
        }

        let cache = Arc::new(CacheManager::from_config(&config.cache).await);
        let cleanup = cache.spawn_cleanup(config.cache.cleanup_interval());

        let options = AdapterOptions {
            key_prefix: config.kv.as_ref().and_then(|kv| kv.key_prefix.clone()),
            cache_ttl: None,
            expiration_ttl: config.store_ttl_secs,
        };
        let adapter = Arc::new(KvAdapter::new(store, cache.clone(), options));
        let data = Arc::new(DataManager::new(adapter.clone(), cache.clone(), bundled.clone()));
        let migrator = Arc::new(Migrator::new(adapter.clone(), data.clone(), bundled.clone()));

        Ok(Self { cache, adapter, data, migrator, bundled, _cleanup: cleanup })
    }
}
