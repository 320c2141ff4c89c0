//! Collection editing tools.
//!
//! Writes only succeed while the data manager serves the remote store; in
//! static mode every tool here fails with a read-only error.

use marknav_core::{Category, CategoryPatch, DataManager, Site, SitePatch};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// A new category.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategoryInput {
    /// Unique id, also used in URLs.
    pub id: String,
    pub name: String,
    /// Emoji or icon name.
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
}

impl From<CategoryInput> for Category {
    fn from(input: CategoryInput) -> Self {
        Category::new(input.id, input.name, input.icon).with_description(input.description)
    }
}

/// A new site.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteInput {
    pub id: String,
    pub title: String,
    /// Absolute http(s) URL.
    pub url: String,
    /// Id of an existing category.
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub icon: String,
}

impl From<SiteInput> for Site {
    fn from(input: SiteInput) -> Self {
        let mut site = Site::new(input.id, input.title, input.url, input.category)
            .with_description(input.description)
            .with_short_desc(input.short_desc);
        site.icon = input.icon;
        site
    }
}

/// Identifies a record by id.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IdParams {
    pub id: String,
}

/// Fields to change on a category. Omitted fields are left as they are.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateCategoryParams {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Fields to change on a site. Omitted fields are left as they are.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateSiteParams {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_desc: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Move the site to another existing category.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
struct Deleted<'a> {
    deleted: &'a str,
}

pub async fn add_category_impl(data: &DataManager, params: CategoryInput) -> Result<CallToolResult, McpError> {
    let category = data.add_category(params.into()).await?;
    json_result(&category)
}

pub async fn update_category_impl(
    data: &DataManager, params: UpdateCategoryParams,
) -> Result<CallToolResult, McpError> {
    let patch = CategoryPatch { name: params.name, icon: params.icon, description: params.description };
    let category = data.update_category(&params.id, patch).await?;
    json_result(&category)
}

pub async fn delete_category_impl(data: &DataManager, params: IdParams) -> Result<CallToolResult, McpError> {
    data.delete_category(&params.id).await?;
    json_result(&Deleted { deleted: &params.id })
}

pub async fn add_site_impl(data: &DataManager, params: SiteInput) -> Result<CallToolResult, McpError> {
    let site = data.add_site(params.into()).await?;
    json_result(&site)
}

pub async fn update_site_impl(data: &DataManager, params: UpdateSiteParams) -> Result<CallToolResult, McpError> {
    let patch = SitePatch {
        title: params.title,
        url: params.url,
        description: params.description,
        short_desc: params.short_desc,
        icon: params.icon,
        category: params.category,
    };
    let site = data.update_site(&params.id, patch).await?;
    json_result(&site)
}

pub async fn delete_site_impl(data: &DataManager, params: IdParams) -> Result<CallToolResult, McpError> {
    data.delete_site(&params.id).await?;
    json_result(&Deleted { deleted: &params.id })
}
