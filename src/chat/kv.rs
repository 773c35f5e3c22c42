//! Namespaced key-value storage with expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::errors::SummaryError;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, SummaryError>;

    /// Stores `value`, replacing anything already there. A zero `ttl` never expires.
    async fn set_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), SummaryError>;

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), SummaryError>;
}

fn full_key(namespace: &str, key: &str) -> Result<String, SummaryError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(SummaryError::Store("empty cache key".to_string()));
    }
    Ok(format!("{namespace}:{key}"))
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process [`KvStore`]. Expired entries are removed on read and by [`MemoryKvStore::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, SummaryError> {
        let full = full_key(namespace, key)?;
        let now = Instant::now();

        {
            let entries = self.entries.read().await;
            match entries.get(&full) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(&full).is_some_and(|e| !e.is_live(now)) {
            entries.remove(&full);
        }
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), SummaryError> {
        let full = full_key(namespace, key)?;
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(full, Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), SummaryError> {
        let full = full_key(namespace, key)?;
        self.entries.write().await.remove(&full);
        Ok(())
    }
}
