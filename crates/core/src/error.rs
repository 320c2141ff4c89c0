//! Unified error types for marknav.
//!
//! Every variant renders with a stable code prefix so callers (the MCP
//! server, the CLI) can surface them without re-wrapping.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

use crate::validation::FieldError;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error types for the data access layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed, duplicate or dangling-reference input.
    #[error("VALIDATION: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// Remote store unreachable or erroring.
    #[error("NETWORK: {operation} failed for key '{key}': {message}")]
    Network { operation: String, key: String, message: String },

    /// Requested category or site does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Write attempted while serving the bundled dataset.
    #[error("READ_ONLY: {0}")]
    ReadOnly(String),

    /// Stored schema version is not in the compatible set.
    #[error("INCOMPATIBLE_VERSION: {found} is not one of {compatible:?}")]
    IncompatibleVersion { found: String, compatible: Vec<String> },

    /// Data migration aborted.
    #[error("MIGRATION_FAILED: {0}")]
    MigrationFailed(String),

    /// Durable cache database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Durable cache schema migration failed to apply.
    #[error("CACHE_ERROR: schema migration failed: {0}")]
    SchemaMigration(String),

    /// JSON serialization/deserialization failed.
    #[error("SERIALIZATION: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
}

impl Error {
    /// Create a validation error for a single field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Wrap a store failure with the operation and key it happened on.
    pub fn network(operation: &str, key: &str, message: impl std::fmt::Display) -> Self {
        Self::Network { operation: operation.to_string(), key: key.to_string(), message: message.to_string() }
    }

    /// Field-level detail for validation errors, empty for every other kind.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::Validation(_) => -32020,
            Error::Network { .. } => -32021,
            Error::NotFound(_) => -32022,
            Error::ReadOnly(_) => -32023,
            Error::IncompatibleVersion { .. } => -32024,
            Error::MigrationFailed(_) => -32025,
            Error::Database(_) | Error::SchemaMigration(_) => -32002,
            Error::Serialization(_) => -32603,
        };
        let data = match &err {
            Error::Validation(fields) => serde_json::to_value(fields).ok(),
            _ => None,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("site 'gh'".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("gh"));
    }

    #[test]
    fn test_validation_display_joins_messages() {
        let err = Error::Validation(vec![
            FieldError::new("url", "URL already exists"),
            FieldError::new("category", "Category 'x' does not exist"),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("VALIDATION:"));
        assert!(text.contains("URL already exists; Category 'x' does not exist"));
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn test_network_carries_context() {
        let err = Error::network("get", "bookmarks:sites", "connection reset");
        assert_eq!(err.to_string(), "NETWORK: get failed for key 'bookmarks:sites': connection reset");
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::validation("id", "Category ID already exists");
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32020);
        assert!(mcp_err.data.is_some());

        let mcp_err: McpError = Error::ReadOnly("static".into()).into();
        assert_eq!(mcp_err.code.0, -32023);
    }
}
