//! Remote key-value store handle.
//!
//! The hosting environment provides the store; the core only consumes this
//! trait. [`MemoryKv`] is the process-local implementation used in tests and
//! local development, the HTTP implementation lives in `marknav-client`.

pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryKv;

/// Default page size for `list`, matching the Workers KV maximum.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Errors reported by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    /// Credentials were rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Request did not complete in time.
    #[error("timeout")]
    Timeout,

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Options for `put`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PutOptions {
    /// Seconds until the value expires.
    pub expiration_ttl: Option<u64>,
    /// Arbitrary JSON stored alongside the value.
    pub metadata: Option<serde_json::Value>,
}

/// Options for `list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    /// Opaque cursor from a previous incomplete page.
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()), ..Default::default() }
    }
}

/// A key returned by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    #[serde(default)]
    pub expiration: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// One page of `list` results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub keys: Vec<KeyInfo>,
    pub list_complete: bool,
    pub cursor: Option<String>,
}

/// Key-value store handle provided by the hosting environment.
#[async_trait]
pub trait KvNamespace: Send + Sync {
    /// Read a value as text, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), KvError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// List keys in lexicographic order, one page at a time.
    async fn list(&self, options: ListOptions) -> Result<ListResult, KvError>;
}
