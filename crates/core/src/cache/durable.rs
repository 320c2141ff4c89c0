//! SQLite-backed cache tiers.
//!
//! Both scopes share one table layout. Rows are namespaced with
//! [`KEY_NAMESPACE`] so the table can live in a database file that holds
//! other data, and every statement filters on it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_rusqlite::{params, rusqlite};

use super::{CacheBackend, CacheDb, CacheEntry, now_ms};
use crate::Error;

/// Prefix applied to every stored key.
pub const KEY_NAMESPACE: &str = "marknav_cache:";

/// Next value of the access sequence stored in `accessed_at`.
///
/// Evaluated inside the statement that writes it, so every write or hit gets a
/// strictly larger value than any row already in the table, across reopens too.
const NEXT_ACCESS_SEQ: &str = "(SELECT COALESCE(MAX(accessed_at), 0) + 1 FROM cache_entries)";

/// Lifetime of the durable tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableScope {
    /// Database file on disk, survives restarts.
    Local,
    /// In-memory database, gone when the process exits.
    Session,
}

/// Durable cache over a [`CacheDb`].
///
/// Storage failures are logged and reported as misses.
#[derive(Debug, Clone)]
pub struct DurableCache {
    db: CacheDb,
    scope: DurableScope,
    max_entries: Option<usize>,
    evictions: Arc<AtomicU64>,
}

struct Row {
    data: String,
    created_at: i64,
    ttl_ms: i64,
}

fn namespaced(key: &str) -> String {
    format!("{KEY_NAMESPACE}{key}")
}

impl DurableCache {
    pub fn new(db: CacheDb, scope: DurableScope, max_entries: Option<usize>) -> Self {
        Self { db, scope, max_entries, evictions: Arc::new(AtomicU64::new(0)) }
    }

    /// Open (or create) the file-backed tier at `path`.
    pub async fn local(path: impl AsRef<Path>, max_entries: Option<usize>) -> Result<Self, Error> {
        Ok(Self::new(CacheDb::open(path).await?, DurableScope::Local, max_entries))
    }

    /// Create a process-scoped tier.
    pub async fn session(max_entries: Option<usize>) -> Result<Self, Error> {
        Ok(Self::new(CacheDb::open_in_memory().await?, DurableScope::Session, max_entries))
    }

    pub fn scope(&self) -> DurableScope {
        self.scope
    }

    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let stored_key = namespaced(key);
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<Row>, Error> {
                let result = conn.query_row(
                    "SELECT data, created_at, ttl_ms FROM cache_entries WHERE key = ?1",
                    params![stored_key],
                    |row| Ok(Row { data: row.get(0)?, created_at: row.get(1)?, ttl_ms: row.get(2)? }),
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entry = match serde_json::from_str::<Value>(&row.data) {
            Ok(data) => CacheEntry {
                key: key.to_string(),
                data,
                created_at: row.created_at,
                ttl_ms: u64::try_from(row.ttl_ms).unwrap_or(0),
            },
            Err(e) => {
                tracing::warn!(backend = self.name(), key, error = %e, "corrupt cache row, removing");
                self.remove(key).await?;
                return Ok(None);
            }
        };

        if entry.is_expired() {
            self.remove(key).await?;
            return Ok(None);
        }

        self.mark_accessed(key).await?;
        Ok(Some(entry))
    }

    async fn mark_accessed(&self, key: &str) -> Result<(), Error> {
        let stored_key = namespaced(key);
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    &format!("UPDATE cache_entries SET accessed_at = {NEXT_ACCESS_SEQ} WHERE key = ?1"),
                    params![stored_key],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), Error> {
        let stored_key = namespaced(&entry.key);
        let data = serde_json::to_string(&entry.data)?;
        let ttl_ms = i64::try_from(entry.ttl_ms).unwrap_or(i64::MAX);
        let created_at = entry.created_at;
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    &format!(
                        "INSERT INTO cache_entries (key, data, created_at, ttl_ms, accessed_at)
                         VALUES (?1, ?2, ?3, ?4, {NEXT_ACCESS_SEQ})
                         ON CONFLICT(key) DO UPDATE SET
                            data = excluded.data,
                            created_at = excluded.created_at,
                            ttl_ms = excluded.ttl_ms,
                            accessed_at = excluded.accessed_at"
                    ),
                    params![stored_key, data, created_at, ttl_ms],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        if let Some(max) = self.max_entries {
            let trimmed = self.purge_lru(max).await?;
            if trimmed > 0 {
                self.evictions.fetch_add(trimmed as u64, Ordering::Relaxed);
                tracing::trace!(backend = self.name(), trimmed, "trimmed least recently used rows");
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let stored_key = namespaced(key);
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![stored_key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete rows whose key starts with `KEY_NAMESPACE` + `prefix`.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, Error> {
        let full = namespaced(prefix);
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE substr(key, 1, ?1) = ?2",
                    params![full.chars().count() as i64, full],
                )?;
                Ok(count)
            })
            .await
            .map_err(Error::from)
    }

    async fn purge_expired(&self) -> Result<usize, Error> {
        let now = now_ms();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries
                     WHERE substr(key, 1, ?1) = ?2 AND ?3 - created_at > ttl_ms",
                    params![KEY_NAMESPACE.chars().count() as i64, KEY_NAMESPACE, now],
                )?;
                Ok(count)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop least recently accessed rows until at most `max_entries` remain.
    async fn purge_lru(&self, max_entries: usize) -> Result<usize, Error> {
        let max = max_entries as i64;
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let len = KEY_NAMESPACE.chars().count() as i64;
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE substr(key, 1, ?1) = ?2",
                    params![len, KEY_NAMESPACE],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE key IN (
                        SELECT key FROM cache_entries WHERE substr(key, 1, ?1) = ?2
                        ORDER BY accessed_at ASC LIMIT ?3
                    )",
                    params![len, KEY_NAMESPACE, count - max],
                )?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    async fn count(&self) -> Result<usize, Error> {
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE substr(key, 1, ?1) = ?2",
                    params![KEY_NAMESPACE.chars().count() as i64, KEY_NAMESPACE],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Read that also returns the stored timestamps, for tier promotion.
    pub(crate) async fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        self.fetch(key).await.unwrap_or_else(|e| {
            tracing::warn!(backend = self.name(), key, error = %e, "durable cache read failed");
            None
        })
    }

    /// Write that keeps the entry's timestamps.
    pub(crate) async fn put_entry(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        if let Err(e) = self.store(entry).await {
            tracing::warn!(backend = self.name(), key, error = %e, "durable cache write failed");
        }
    }
}

#[async_trait]
impl CacheBackend for DurableCache {
    fn name(&self) -> &'static str {
        match self.scope {
            DurableScope::Local => "local",
            DurableScope::Session => "session",
        }
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_entry(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.put_entry(CacheEntry::new(key, value, ttl)).await;
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.remove(key).await {
            tracing::warn!(backend = self.name(), key, error = %e, "durable cache delete failed");
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> usize {
        self.remove_prefix(prefix).await.unwrap_or_else(|e| {
            tracing::warn!(backend = self.name(), prefix, error = %e, "durable cache prefix delete failed");
            0
        })
    }

    async fn clear(&self) {
        self.delete_prefix("").await;
    }

    async fn cleanup(&self) -> usize {
        self.purge_expired().await.unwrap_or_else(|e| {
            tracing::warn!(backend = self.name(), error = %e, "durable cache cleanup failed");
            0
        })
    }

    async fn len(&self) -> usize {
        self.count().await.unwrap_or_else(|e| {
            tracing::warn!(backend = self.name(), error = %e, "durable cache count failed");
            0
        })
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
