//! clear_cache tool implementation.
//!
//! Drops cached collection reads by scope and optionally sweeps expired
//! entries from the cache backend.

use marknav_core::{CacheManager, CacheScope, CacheStats, DataManager};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the clear_cache tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClearCacheParams {
    /// "all" (default), "categories" or "sites".
    #[serde(default)]
    pub scope: Option<String>,

    /// Also remove expired entries from the backend.
    #[serde(default)]
    pub purge_expired: bool,
}

/// Output from the clear_cache tool.
#[derive(Debug, Serialize)]
struct ClearCacheOutput {
    scope: CacheScope,
    expired_removed: usize,
    stats: CacheStats,
}

pub async fn clear_cache_impl(
    data: &DataManager, cache: &CacheManager, params: ClearCacheParams,
) -> Result<CallToolResult, McpError> {
    let scope: CacheScope = params.scope.as_deref().unwrap_or_default().parse()?;
    data.clear_cache(scope).await;

    let expired_removed = if params.purge_expired { cache.cleanup().await } else { 0 };
    json_result(&ClearCacheOutput { scope, expired_removed, stats: cache.stats().await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output, services};

    #[tokio::test]
    async fn test_clear_all() {
        let services = services(true).await;
        services.data.get_sites(true).await;
        services.data.get_categories(true).await;
        assert!(services.cache.len().await > 0);

        let out = output(&clear_cache_impl(&services.data, &services.cache, ClearCacheParams::default()).await.unwrap());
        assert_eq!(out["scope"], "all");
        assert_eq!(out["stats"]["entries"], 0);
    }

    #[tokio::test]
    async fn test_clear_sites_keeps_categories() {
        let services = services(true).await;
        services.data.get_categories(true).await;
        let before = services.cache.len().await;
        services.data.get_sites(true).await;

        let params = ClearCacheParams { scope: Some("sites".into()), purge_expired: true };
        let out = output(&clear_cache_impl(&services.data, &services.cache, params).await.unwrap());
        assert_eq!(out["scope"], "sites");
        assert_eq!(out["stats"]["entries"], before);
    }

    #[tokio::test]
    async fn test_unknown_scope() {
        let services = services(false).await;
        let params = ClearCacheParams { scope: Some("everything".into()), purge_expired: false };
        assert!(clear_cache_impl(&services.data, &services.cache, params).await.is_err());
    }
}
