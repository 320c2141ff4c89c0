//! MCP tool implementations.
//!
//! This module contains all tools exposed by the marknav server. Every tool
//! answers with its output serialized as pretty JSON text.

pub mod browse;
pub mod cache;
pub mod edit;
pub mod migration;

use marknav_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

pub use browse::{ListCategoriesParams, ListSitesParams, SearchSitesParams};
pub use cache::ClearCacheParams;
pub use edit::{CategoryInput, IdParams, SiteInput, UpdateCategoryParams, UpdateSiteParams};
pub use migration::ExportParams;

/// Wrap `value` as a successful tool result.
pub(crate) fn json_result<T: Serialize + ?Sized>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(Error::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn default_true() -> bool {
    true
}
