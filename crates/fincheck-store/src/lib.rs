//! # fincheck Store
//!
//! Durable tier of the fincheck response cache, backed by an embedded `DuckDB` file.
//!
//! ## Overview
//!
//! The in-process cache in `fincheck-core` falls back to this store on a miss and writes
//! every successful provider payload through to it. Each row is a `{value, timestamp}`
//! blob keyed by the same request hash the in-process tier uses, plus the TTL the
//! payload was stored with so expiry survives restarts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use fincheck_store::{BlobStore, StoredBlob};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = BlobStore::open_default()?;
//!     let blob = StoredBlob::now(serde_json::json!({"price": 158.2}), Duration::from_secs(300));
//!     store.put("quote:aapl", &blob)?;
//!
//!     if let Some(found) = store.get("quote:aapl")? {
//!         println!("cached at {}", found.stored_at);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `cache_blobs` | Cached payloads with store time and TTL |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::duckdb::ToSql;
use thiserror::Error;
use time::OffsetDateTime;

pub use duckdb::{ConnectionPool, PooledConnection};

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("stored payload is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored timestamp {value} is out of range")]
    InvalidTimestamp { value: i64 },
}

/// Location and pooling settings for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for fincheck data.
    pub fincheck_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Idle connections kept per access mode.
    pub max_idle_connections: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_home(resolve_fincheck_home())
    }
}

impl StoreConfig {
    /// Configuration rooted at `fincheck_home`, with the database under `cache/`.
    pub fn in_home(fincheck_home: impl Into<PathBuf>) -> Self {
        let fincheck_home = fincheck_home.into();
        let db_path = fincheck_home.join("cache").join("blobs.duckdb");
        Self {
            fincheck_home,
            db_path,
            max_idle_connections: 4,
        }
    }
}

/// A cached payload with the wall-clock time it was stored and its TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub value: serde_json::Value,
    pub stored_at: OffsetDateTime,
    pub ttl: Duration,
}

impl StoredBlob {
    pub fn new(value: serde_json::Value, stored_at: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            value,
            stored_at,
            ttl,
        }
    }

    /// Blob stamped with the current UTC time.
    pub fn now(value: serde_json::Value, ttl: Duration) -> Self {
        Self::new(value, OffsetDateTime::now_utc(), ttl)
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.stored_at + self.ttl
    }

    /// A blob is live strictly before `stored_at + ttl`.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at()
    }
}

/// `DuckDB`-backed key/blob store.
#[derive(Clone)]
pub struct BlobStore {
    config: StoreConfig,
    pool: ConnectionPool,
}

impl BlobStore {
    /// Open the store at the default location (`$FINCHECK_HOME` or `~/.fincheck`).
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    /// Open (creating if needed) the store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::new(config.db_path.clone(), config.max_idle_connections);
        let store = Self { config, pool };
        store.initialize()?;
        Ok(store)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Fetch the blob stored under `key`, expired or not.
    ///
    /// Expiry is left to the caller so that the in-process tier applies one clock.
    pub fn get(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            "SELECT value_json, stored_at_ms, ttl_ms FROM cache_blobs WHERE cache_key = ?",
        )?;
        let mut rows = statement.query([key])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let value_json: String = row.get(0)?;
        let stored_at_ms: i64 = row.get(1)?;
        let ttl_ms: i64 = row.get(2)?;

        Ok(Some(StoredBlob {
            value: serde_json::from_str(&value_json)?,
            stored_at: from_unix_ms(stored_at_ms)?,
            ttl: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
        }))
    }

    /// Insert or replace the blob stored under `key`.
    ///
    /// # Security
    /// Keys and payloads are bound as parameters, never interpolated.
    pub fn put(&self, key: &str, blob: &StoredBlob) -> Result<(), StoreError> {
        let value_json = serde_json::to_string(&blob.value)?;
        let stored_at_ms = to_unix_ms(blob.stored_at);
        let ttl_ms = i64::try_from(blob.ttl.as_millis()).unwrap_or(i64::MAX);

        let connection = self.pool.acquire()?;
        let params: [&dyn ToSql; 4] = [&key, &value_json, &stored_at_ms, &ttl_ms];
        connection.execute(
            "INSERT OR REPLACE INTO cache_blobs (cache_key, value_json, stored_at_ms, ttl_ms) \
             VALUES (?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Remove the blob stored under `key`. Returns whether a row was deleted.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let connection = self.pool.acquire()?;
        let deleted = connection.execute("DELETE FROM cache_blobs WHERE cache_key = ?", [key])?;
        Ok(deleted > 0)
    }

    /// Delete every blob that is no longer live at `now`.
    pub fn purge_expired(&self, now: OffsetDateTime) -> Result<usize, StoreError> {
        let now_ms = to_unix_ms(now);
        let connection = self.pool.acquire()?;
        let deleted = connection.execute(
            "DELETE FROM cache_blobs WHERE stored_at_ms + ttl_ms <= ?",
            [now_ms],
        )?;
        Ok(deleted)
    }

    /// Number of stored blobs, including expired ones not yet purged.
    pub fn len(&self) -> Result<usize, StoreError> {
        let connection = self.pool.acquire()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM cache_blobs", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn to_unix_ms(value: OffsetDateTime) -> i64 {
    let millis = value.unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn from_unix_ms(value: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(value) * 1_000_000)
        .map_err(|_| StoreError::InvalidTimestamp { value })
}

fn resolve_fincheck_home() -> PathBuf {
    if let Some(path) = env::var_os("FINCHECK_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".fincheck");
    }

    PathBuf::from(".fincheck")
}
