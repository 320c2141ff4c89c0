//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    CategoryInput, ClearCacheParams, ExportParams, IdParams, ListCategoriesParams, ListSitesParams, SearchSitesParams,
    SiteInput, UpdateCategoryParams, UpdateSiteParams, browse, cache, edit, migration,
};

use marknav_core::Services;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for marknav.
#[derive(Clone)]
pub struct MarknavServer {
    services: Arc<Services>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl MarknavServer {
    /// Create a new server handler over the wired data layer.
    pub fn new(services: Arc<Services>) -> Self {
        Self { services, tool_router: Self::tool_router() }
    }

    #[tool(description = "List all bookmark categories.")]
    async fn list_categories(&self, params: Parameters<ListCategoriesParams>) -> Result<CallToolResult, McpError> {
        browse::list_categories_impl(&self.services.data, params.0).await
    }

    #[tool(description = "List bookmarked sites, optionally only those in one category.")]
    async fn list_sites(&self, params: Parameters<ListSitesParams>) -> Result<CallToolResult, McpError> {
        browse::list_sites_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Search sites by title, description or category. Case-insensitive.")]
    async fn search_sites(&self, params: Parameters<SearchSitesParams>) -> Result<CallToolResult, McpError> {
        browse::search_sites_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Add a category. Requires the remote store.")]
    async fn add_category(&self, params: Parameters<CategoryInput>) -> Result<CallToolResult, McpError> {
        edit::add_category_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Update fields of an existing category. The id cannot change.")]
    async fn update_category(&self, params: Parameters<UpdateCategoryParams>) -> Result<CallToolResult, McpError> {
        edit::update_category_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Delete a category that no site references.")]
    async fn delete_category(&self, params: Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        edit::delete_category_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Add a site to an existing category. Requires the remote store.")]
    async fn add_site(&self, params: Parameters<SiteInput>) -> Result<CallToolResult, McpError> {
        edit::add_site_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Update fields of an existing site. The id cannot change.")]
    async fn update_site(&self, params: Parameters<UpdateSiteParams>) -> Result<CallToolResult, McpError> {
        edit::update_site_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Delete a site.")]
    async fn delete_site(&self, params: Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        edit::delete_site_impl(&self.services.data, params.0).await
    }

    #[tool(description = "Report which data source is in use and whether the remote store is reachable.")]
    async fn data_source_info(&self) -> Result<CallToolResult, McpError> {
        browse::data_source_info_impl(&self.services.data).await
    }

    #[tool(description = "Collection counts and last-updated timestamps.")]
    async fn get_metadata(&self) -> Result<CallToolResult, McpError> {
        browse::get_metadata_impl(&self.services.data).await
    }

    #[tool(description = "Clear cached reads for all data, categories or sites. Returns cache statistics.")]
    async fn clear_cache(&self, params: Parameters<ClearCacheParams>) -> Result<CallToolResult, McpError> {
        cache::clear_cache_impl(&self.services.data, &self.services.cache, params.0).await
    }

    /// Copy the bundled dataset into the remote store.
    ///
    /// Progress is recorded on the migrator; poll migration_status from another call.
    #[tool(description = "Migrate the bundled dataset into the remote store. Rolls back on write failure.")]
    async fn migrate_to_kv(&self) -> Result<CallToolResult, McpError> {
        migration::migrate_to_kv_impl(&self.services.migrator).await
    }

    #[tool(description = "Export the remote store contents, optionally as a static json or js file.")]
    async fn export_from_kv(&self, params: Parameters<ExportParams>) -> Result<CallToolResult, McpError> {
        migration::export_from_kv_impl(&self.services.migrator, params.0).await
    }

    #[tool(description = "Current migration state, progress and log.")]
    async fn migration_status(&self) -> Result<CallToolResult, McpError> {
        migration::migration_status_impl(&self.services.migrator).await
    }

    #[tool(description = "Reset migration status. Fails while a migration is running.")]
    async fn reset_migration(&self) -> Result<CallToolResult, McpError> {
        migration::reset_migration_impl(&self.services.migrator).await
    }
}

impl ServerHandler for MarknavServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "marknav".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::services;

    #[tokio::test]
    async fn test_router_lists_every_tool() {
        let server = MarknavServer::new(Arc::new(services(false).await));
        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();

        assert_eq!(
            names,
            [
                "add_category",
                "add_site",
                "clear_cache",
                "data_source_info",
                "delete_category",
                "delete_site",
                "export_from_kv",
                "get_metadata",
                "list_categories",
                "list_sites",
                "migrate_to_kv",
                "migration_status",
                "reset_migration",
                "search_sites",
                "update_category",
                "update_site",
            ]
        );
    }

    #[tokio::test]
    async fn test_server_info() {
        let server = MarknavServer::new(Arc::new(services(false).await));
        assert_eq!(server.get_info().server_info.name, "marknav");
    }
}
