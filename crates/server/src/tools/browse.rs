//! Read-only navigation tools: list_categories, list_sites, search_sites,
//! get_metadata and data_source_info.

use marknav_core::{Category, DataManager, Site};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{default_true, json_result};

/// Parameters for the list_categories tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListCategoriesParams {
    /// Serve from the cache when possible (default: true).
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

/// Parameters for the list_sites tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListSitesParams {
    /// Only return sites in this category id.
    #[serde(default)]
    pub category: Option<String>,

    /// Serve from the cache when possible (default: true).
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

/// Parameters for the search_sites tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchSitesParams {
    /// Case-insensitive text matched against title, descriptions and category.
    /// A blank query returns every site.
    pub query: String,

    /// Serve from the cache when possible (default: true).
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

#[derive(Debug, Serialize)]
struct CategoriesOutput {
    count: usize,
    categories: Vec<Category>,
}

#[derive(Debug, Serialize)]
struct SitesOutput {
    count: usize,
    sites: Vec<Site>,
}

impl From<Vec<Site>> for SitesOutput {
    fn from(sites: Vec<Site>) -> Self {
        Self { count: sites.len(), sites }
    }
}

pub async fn list_categories_impl(
    data: &DataManager, params: ListCategoriesParams,
) -> Result<CallToolResult, McpError> {
    let categories = data.get_categories(params.use_cache).await;
    json_result(&CategoriesOutput { count: categories.len(), categories })
}

pub async fn list_sites_impl(data: &DataManager, params: ListSitesParams) -> Result<CallToolResult, McpError> {
    let sites = match params.category.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() => data.get_sites_by_category(category, params.use_cache).await,
        _ => data.get_sites(params.use_cache).await,
    };
    json_result(&SitesOutput::from(sites))
}

pub async fn search_sites_impl(data: &DataManager, params: SearchSitesParams) -> Result<CallToolResult, McpError> {
    let sites = data.search_sites(&params.query, params.use_cache).await;
    tracing::debug!(query = %params.query, hits = sites.len(), "search_sites");
    json_result(&SitesOutput::from(sites))
}

pub async fn get_metadata_impl(data: &DataManager) -> Result<CallToolResult, McpError> {
    json_result(&data.get_metadata().await)
}

pub async fn data_source_info_impl(data: &DataManager) -> Result<CallToolResult, McpError> {
    json_result(&data.get_data_source_info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output, services};

    #[tokio::test]
    async fn test_list_categories() {
        let services = services(true).await;
        let result = list_categories_impl(&services.data, ListCategoriesParams { use_cache: true })
            .await
            .unwrap();
        let out = output(&result);
        assert_eq!(out["count"], services.bundled.categories.len());
        assert_eq!(out["categories"][0]["id"], services.bundled.categories[0].id.as_str());
    }

    #[tokio::test]
    async fn test_list_sites_by_category() {
        let services = services(true).await;
        let params = ListSitesParams { category: Some("learning".into()), use_cache: true };
        let out = output(&list_sites_impl(&services.data, params).await.unwrap());

        let sites = out["sites"].as_array().unwrap();
        assert!(!sites.is_empty());
        assert!(sites.iter().all(|s| s["category"] == "learning"));
    }

    #[tokio::test]
    async fn test_list_sites_blank_category_returns_all() {
        let services = services(false).await;
        let params = ListSitesParams { category: Some("  ".into()), use_cache: false };
        let out = output(&list_sites_impl(&services.data, params).await.unwrap());
        assert_eq!(out["count"], services.bundled.sites.len());
    }

    #[tokio::test]
    async fn test_search_sites() {
        let services = services(true).await;
        let params = SearchSitesParams { query: "CRATES".into(), use_cache: true };
        let out = output(&search_sites_impl(&services.data, params).await.unwrap());
        assert!(out["sites"].as_array().unwrap().iter().any(|s| s["id"] == "crates-io"));
    }

    #[tokio::test]
    async fn test_data_source_info_before_and_after_init() {
        let services = services(true).await;
        let out = output(&data_source_info_impl(&services.data).await.unwrap());
        assert_eq!(out["isInitialized"], false);
        assert_eq!(out["isKvAvailable"], true);

        get_metadata_impl(&services.data).await.unwrap();
        let out = output(&data_source_info_impl(&services.data).await.unwrap());
        assert_eq!(out["isInitialized"], true);
        assert_eq!(out["source"], "kv");
    }
}
