//! Migration tools: migrate_to_kv, export_from_kv, migration_status and
//! reset_migration.

use marknav_core::{Migrator, StaticFormat};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the export_from_kv tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExportParams {
    /// Output as a static file: "json" or "js". Omit to get the raw snapshot.
    #[serde(default)]
    pub format: Option<String>,
}

pub async fn migrate_to_kv_impl(migrator: &Migrator) -> Result<CallToolResult, McpError> {
    let report = migrator.migrate_to_kv().await?;
    json_result(&report)
}

pub async fn export_from_kv_impl(migrator: &Migrator, params: ExportParams) -> Result<CallToolResult, McpError> {
    let snapshot = migrator.export_from_kv().await?;
    match params.format {
        None => json_result(&snapshot),
        Some(format) => {
            let format: StaticFormat = format.parse()?;
            let code = migrator.generate_static_file_code(&snapshot, format)?;
            Ok(CallToolResult::success(vec![Content::text(code)]))
        }
    }
}

pub async fn migration_status_impl(migrator: &Migrator) -> Result<CallToolResult, McpError> {
    json_result(&migrator.get_status())
}

pub async fn reset_migration_impl(migrator: &Migrator) -> Result<CallToolResult, McpError> {
    migrator.reset()?;
    json_result(&migrator.get_status())
}
