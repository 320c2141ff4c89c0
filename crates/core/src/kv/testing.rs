//! Failure-injecting store double for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{KvError, KvNamespace, ListOptions, ListResult, MemoryKv, PutOptions};

/// Wraps a [`MemoryKv`] and fails selected operations on demand.
#[derive(Debug, Default)]
pub(crate) struct FlakyKv {
    pub inner: MemoryKv,
    fail_reads: AtomicBool,
    fail_put_keys: Mutex<HashSet<String>>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl FlakyKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts_for(&self, key: &str) {
        self.fail_put_keys.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string());
    }
}

#[async_trait]
impl KvNamespace for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KvError::Backend("injected read failure".into()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), KvError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_put_keys.lock().unwrap_or_else(PoisonError::into_inner).contains(key);
        if fail {
            return Err(KvError::Backend(format!("injected write failure for {key}")));
        }
        self.inner.put(key, value, options).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.inner.delete(key).await
    }

    async fn list(&self, options: ListOptions) -> Result<ListResult, KvError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KvError::Timeout);
        }
        self.inner.list(options).await
    }
}
