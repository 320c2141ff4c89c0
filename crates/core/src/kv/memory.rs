//! Process-local key-value store.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::{DEFAULT_LIST_LIMIT, KeyInfo, KvError, KvNamespace, ListOptions, ListResult, PutOptions};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    metadata: Option<serde_json::Value>,
    /// Unix seconds.
    expiration: Option<i64>,
}

impl StoredValue {
    fn is_expired(&self, now: i64) -> bool {
        self.expiration.is_some_and(|at| at <= now)
    }
}

/// In-memory [`KvNamespace`] with the same semantics as the remote store:
/// expiring values, lexicographic listing and cursor pagination.
#[derive(Debug, Default)]
pub struct MemoryKv {
    values: RwLock<BTreeMap<String, StoredValue>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.values().filter(|v| !v.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw value for assertions, bypassing expiry.
    pub fn raw(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).map(|v| v.value.clone())
    }
}

#[async_trait]
impl KvNamespace for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Utc::now().timestamp();
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        match values.get(key) {
            Some(stored) if stored.is_expired(now) => {
                values.remove(key);
                Ok(None)
            }
            Some(stored) => Ok(Some(stored.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), KvError> {
        if key.is_empty() {
            return Err(KvError::Backend("key must not be empty".into()));
        }
        let expiration = options
            .expiration_ttl
            .map(|ttl| Utc::now().timestamp().saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX)));
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), StoredValue { value: value.to_string(), metadata: options.metadata, expiration });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListResult, KvError> {
        let now = Utc::now().timestamp();
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let prefix = options.prefix.unwrap_or_default();
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);

        let mut keys: Vec<KeyInfo> = values
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .filter(|(name, _)| options.cursor.as_ref().is_none_or(|cursor| name.as_str() > cursor.as_str()))
            .filter(|(_, stored)| !stored.is_expired(now))
            .take(limit + 1)
            .map(|(name, stored)| KeyInfo {
                name: name.clone(),
                expiration: stored.expiration,
                metadata: stored.metadata.clone(),
            })
            .collect();

        let list_complete = keys.len() <= limit;
        keys.truncate(limit);
        let cursor = if list_complete { None } else { keys.last().map(|k| k.name.clone()) };

        Ok(ListResult { keys, list_complete, cursor })
    }
}
