//! Backend Store Module
//!
//! Minimal persistence contract (get / set / delete / prefix scan) and the
//! stores implementing it. Stores know nothing about TTLs or locking; a
//! missing key is `Ok(None)`, anything else that goes wrong is an error.
//!
//! # Stores
//! - [`MemoryStore`]: heap-resident ordered map, no durability
//! - `RocksStore`: ordered on-disk LSM store, single writer process (`rocksdb` feature)
//! - `LmdbStore`: memory-mapped transactional store (`lmdb` feature)
//! - `SqliteStore`: relational table keyed by a primary column (`sqlite` feature)

mod memory;

#[cfg(feature = "lmdb")]
mod lmdb;
#[cfg(feature = "rocksdb")]
mod rocks;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use tracing::info;

use crate::config::Config;
use crate::error::{CacheError, Result};

pub use memory::MemoryStore;

#[cfg(feature = "lmdb")]
pub use lmdb::LmdbStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

// == Backend Store Contract ==
/// Raw key/value persistence used by the cache engine.
pub trait BackendStore: Send + Sync {
    /// Returns the raw bytes stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Stores raw bytes under `key`.
    ///
    /// `expires_at` is a hint (Unix milliseconds) for stores that keep an
    /// expiry column; it is never enforced by the store.
    fn set(
        &self,
        key: &str,
        raw: Vec<u8>,
        expires_at: Option<u64>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Removes `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Lists every stored key starting with `prefix`, in key order.
    fn keys_with_prefix(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

// == Backend Kind ==
/// Backend selected once at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    RocksDb,
    Lmdb,
    Sqlite,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "rocksdb" | "rocks" => Ok(BackendKind::RocksDb),
            "lmdb" => Ok(BackendKind::Lmdb),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(CacheError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::RocksDb => "rocksdb",
            BackendKind::Lmdb => "lmdb",
            BackendKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

// == Backend ==
/// The concrete store behind a cache engine.
///
/// This is the single substitution point between stores; everything above it
/// talks to a `Backend`.
#[derive(Clone)]
pub enum Backend {
    Memory(MemoryStore),
    #[cfg(feature = "rocksdb")]
    RocksDb(RocksStore),
    #[cfg(feature = "lmdb")]
    Lmdb(LmdbStore),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteStore),
}

impl Backend {
    /// Creates an empty heap-resident backend.
    pub fn memory() -> Self {
        Backend::Memory(MemoryStore::new())
    }

    /// Opens the backend selected by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = match config.backend {
            BackendKind::Memory => Backend::memory(),
            #[cfg(feature = "rocksdb")]
            BackendKind::RocksDb => Backend::RocksDb(RocksStore::open(&config.cache_path)?),
            #[cfg(feature = "lmdb")]
            BackendKind::Lmdb => {
                Backend::Lmdb(LmdbStore::open(&config.cache_path, config.lmdb_map_size)?)
            }
            #[cfg(feature = "sqlite")]
            BackendKind::Sqlite => Backend::Sqlite(SqliteStore::open(&config.cache_path)?),
            #[allow(unreachable_patterns)]
            other => {
                return Err(CacheError::Config(format!(
                    "backend '{}' is not compiled into this build",
                    other
                )))
            }
        };

        info!(
            "Opened {} backend at {}",
            backend.kind(),
            config.cache_path.display()
        );
        Ok(backend)
    }

    /// Returns which kind of store this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Memory(_) => BackendKind::Memory,
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb(_) => BackendKind::RocksDb,
            #[cfg(feature = "lmdb")]
            Backend::Lmdb(_) => BackendKind::Lmdb,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(_) => BackendKind::Sqlite,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.kind()).finish()
    }
}

impl BackendStore for Backend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self {
            Backend::Memory(store) => store.get(key).await,
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb(store) => store.get(key).await,
            #[cfg(feature = "lmdb")]
            Backend::Lmdb(store) => store.get(key).await,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, raw: Vec<u8>, expires_at: Option<u64>) -> Result<()> {
        match self {
            Backend::Memory(store) => store.set(key, raw, expires_at).await,
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb(store) => store.set(key, raw, expires_at).await,
            #[cfg(feature = "lmdb")]
            Backend::Lmdb(store) => store.set(key, raw, expires_at).await,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(store) => store.set(key, raw, expires_at).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Backend::Memory(store) => store.delete(key).await,
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb(store) => store.delete(key).await,
            #[cfg(feature = "lmdb")]
            Backend::Lmdb(store) => store.delete(key).await,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(store) => store.delete(key).await,
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        match self {
            Backend::Memory(store) => store.keys_with_prefix(prefix).await,
            #[cfg(feature = "rocksdb")]
            Backend::RocksDb(store) => store.keys_with_prefix(prefix).await,
            #[cfg(feature = "lmdb")]
            Backend::Lmdb(store) => store.keys_with_prefix(prefix).await,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(store) => store.keys_with_prefix(prefix).await,
        }
    }
}

/// Runs a blocking store call on tokio's blocking pool.
#[allow(dead_code)]
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
