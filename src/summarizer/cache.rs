use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::chat::KvStore;
use crate::core::clock::Clock;
use crate::core::models::SummaryRecord;
use crate::errors::SummaryError;

const NAMESPACE: &str = "summaries";

/// TTL-bounded store of generated summaries, keyed by the conversation
/// fingerprint.
///
/// Reads are best-effort: anything that can't be decoded or has outlived its
/// `expires_at` is treated as absent. The lifetime of each entry is chosen by
/// the writer, so a TTL change applies from the next write on.
#[derive(Clone)]
pub struct SummaryCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl SummaryCache {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// # Errors
    ///
    /// Propagates store read failures. Callers usually treat these as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<SummaryRecord>, SummaryError> {
        let Some(bytes) = self.store.get(NAMESPACE, key).await? else {
            return Ok(None);
        };

        let mut record: SummaryRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                self.discard(key).await;
                return Ok(None);
            }
        };

        if record.is_expired_at(self.clock.now()) {
            debug!("Cache entry {} expired at {}", key, record.expires_at);
            self.discard(key).await;
            return Ok(None);
        }

        record.served_from_cache = true;
        Ok(Some(record))
    }

    /// # Errors
    ///
    /// Returns [`SummaryError::CacheWriteFailed`] if the record can't be
    /// encoded or stored.
    pub async fn put(&self, record: &SummaryRecord, ttl: Duration) -> Result<(), SummaryError> {
        let stored = SummaryRecord {
            served_from_cache: false,
            ..record.clone()
        };
        let bytes = serde_json::to_vec(&stored)
            .map_err(|e| SummaryError::CacheWriteFailed(format!("encode {}: {e}", record.key)))?;

        self.store
            .set_with_expiry(NAMESPACE, &record.key, bytes, ttl)
            .await
            .map_err(|e| SummaryError::CacheWriteFailed(format!("store {}: {e}", record.key)))
    }

    /// # Errors
    ///
    /// Propagates store delete failures.
    pub async fn invalidate(&self, key: &str) -> Result<(), SummaryError> {
        self.store.delete(NAMESPACE, key).await
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.store.delete(NAMESPACE, key).await {
            debug!("Failed to delete stale cache entry {}: {}", key, e);
        }
    }
}
