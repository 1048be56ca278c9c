//! Two-tier response cache.
//!
//! L1 is an in-process map; the durable tier (a [`DurableStore`], normally the
//! `DuckDB` [`BlobStore`]) sits behind it. Reads try L1 first and promote live
//! durable hits into L1. Writes go through both tiers. Durable failures are
//! logged and behave like misses.
//!
//! Every entry carries the wall-clock time it was stored and its TTL; an entry
//! is present only while `now < stored_at + ttl`. Expired L1 entries are
//! evicted when a read finds them and swept every [`SWEEP_EVERY`] writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fincheck_store::{BlobStore, StoredBlob};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::data_source::QueryKind;
use crate::error::CacheError;
use crate::ProviderId;

/// Synchronous key/blob persistence used as the durable cache tier.
///
/// Calls are made from the blocking pool, never from async tasks directly.
pub trait DurableStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<StoredBlob>, CacheError>;

    fn save(&self, key: &str, blob: &StoredBlob) -> Result<(), CacheError>;

    fn purge_expired(&self, now: OffsetDateTime) -> Result<usize, CacheError>;
}

impl DurableStore for BlobStore {
    fn load(&self, key: &str) -> Result<Option<StoredBlob>, CacheError> {
        Ok(self.get(key)?)
    }

    fn save(&self, key: &str, blob: &StoredBlob) -> Result<(), CacheError> {
        Ok(self.put(key, blob)?)
    }

    fn purge_expired(&self, now: OffsetDateTime) -> Result<usize, CacheError> {
        Ok(BlobStore::purge_expired(self, now)?)
    }
}

/// In-memory durable tier for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("memory store lock is not poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<StoredBlob>, CacheError> {
        Ok(self
            .entries
            .lock()
            .expect("memory store lock is not poisoned")
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, blob: &StoredBlob) -> Result<(), CacheError> {
        self.entries
            .lock()
            .expect("memory store lock is not poisoned")
            .insert(key.to_owned(), blob.clone());
        Ok(())
    }

    fn purge_expired(&self, now: OffsetDateTime) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().expect("memory store lock is not poisoned");
        let before = entries.len();
        entries.retain(|_, blob| blob.is_live_at(now));
        Ok(before - entries.len())
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// L1 entries, expired ones included until the next `clear_expired`.
    pub entries: usize,
    pub live_entries: usize,
    pub durable: bool,
}

/// Writes between two sweeps of expired L1 entries.
pub const SWEEP_EVERY: usize = 64;

/// Cache key for a provider response: SHA-256 of provider, kind and parameters.
pub fn response_key(provider: ProviderId, kind: QueryKind, params: &str) -> String {
    hash_key(&format!("{provider}|{kind}|{params}"))
}

/// Cache key for a resolved ticker, by normalized entity text.
pub fn ticker_match_key(normalized: &str) -> String {
    hash_key(&format!("ticker_match|{normalized}"))
}

fn hash_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Thread-safe two-tier cache. Clones share both tiers.
#[derive(Clone)]
pub struct TieredCache {
    memory: Arc<RwLock<HashMap<String, StoredBlob>>>,
    durable: Option<Arc<dyn DurableStore>>,
    writes: Arc<AtomicUsize>,
}

impl TieredCache {
    pub fn new(durable: Option<Arc<dyn DurableStore>>) -> Self {
        Self {
            memory: Arc::new(RwLock::new(HashMap::new())),
            durable,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn memory_only() -> Self {
        Self::new(None)
    }

    pub fn with_durable(durable: Arc<dyn DurableStore>) -> Self {
        Self::new(Some(durable))
    }

    pub fn has_durable_tier(&self) -> bool {
        self.durable.is_some()
    }

    /// Live value for `key`, from L1 or the durable tier.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = OffsetDateTime::now_utc();
        let expired_in_memory = match self.memory.read().await.get(key) {
            Some(blob) if blob.is_live_at(now) => {
                debug!(key, tier = "memory", "cache hit");
                return Some(blob.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired_in_memory {
            let mut memory = self.memory.write().await;
            // A concurrent writer may have refreshed the entry meanwhile.
            if memory.get(key).is_some_and(|blob| !blob.is_live_at(now)) {
                memory.remove(key);
            }
        }

        let blob = self.durable_load(key).await?;
        if !blob.is_live_at(now) {
            debug!(key, "durable cache entry expired");
            return None;
        }

        debug!(key, tier = "durable", "cache hit");
        let value = blob.value.clone();
        self.memory.write().await.insert(key.to_owned(), blob);
        Some(value)
    }

    /// Typed read. A value that no longer deserializes is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(key, %error, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Writes through both tiers. A zero TTL stores nothing.
    pub async fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let blob = StoredBlob::now(value, ttl);
        {
            let mut memory = self.memory.write().await;
            memory.insert(key.to_owned(), blob.clone());
            if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
                let now = OffsetDateTime::now_utc();
                let before = memory.len();
                memory.retain(|_, entry| entry.is_live_at(now));
                debug!(swept = before - memory.len(), "swept expired cache entries");
            }
        }

        if let Some(store) = self.durable.clone() {
            let owned_key = key.to_owned();
            let result = run_blocking(move || store.save(&owned_key, &blob)).await;
            if let Err(error) = result {
                warn!(key, %error, "durable cache write failed");
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        self.put(key, value, ttl).await;
        Ok(())
    }

    /// Drops expired L1 entries and purges the durable tier. Returns how many
    /// L1 entries were removed.
    pub async fn clear_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let removed = {
            let mut memory = self.memory.write().await;
            let before = memory.len();
            memory.retain(|_, blob| blob.is_live_at(now));
            before - memory.len()
        };

        if let Some(store) = self.durable.clone() {
            match run_blocking(move || store.purge_expired(now)).await {
                Ok(purged) => debug!(purged, "purged expired durable cache entries"),
                Err(error) => warn!(%error, "durable cache purge failed"),
            }
        }
        removed
    }

    /// Empties L1. The durable tier is left as is.
    pub async fn clear(&self) {
        self.memory.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.memory.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let now = OffsetDateTime::now_utc();
        let memory = self.memory.read().await;
        CacheStats {
            entries: memory.len(),
            live_entries: memory.values().filter(|blob| blob.is_live_at(now)).count(),
            durable: self.durable.is_some(),
        }
    }

    async fn durable_load(&self, key: &str) -> Option<StoredBlob> {
        let store = self.durable.clone()?;
        let owned_key = key.to_owned();
        match run_blocking(move || store.load(&owned_key)).await {
            Ok(found) => found,
            Err(error) => {
                warn!(key, %error, "durable cache read failed");
                None
            }
        }
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, CacheError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CacheError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| CacheError::Task(error.to_string()))?
}
