//! Ordered on-disk backend store (RocksDB).
//!
//! Log-structured and sorted, so prefix scans are a seek plus a forward walk.
//! Assumes a single writer process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{Direction, IteratorMode, Options, DB};

use super::{run_blocking, BackendStore};
use crate::error::{CacheError, Result};

// == RocksDB Store ==
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
    path: PathBuf,
}

impl RocksStore {
    /// Opens (or creates) the database directory at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| {
            CacheError::Backend(format!(
                "failed to open database at '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackendStore for RocksStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (db, key) = (self.db.clone(), key.to_string());
        run_blocking(move || Ok(db.get(key.as_bytes())?)).await
    }

    async fn set(&self, key: &str, raw: Vec<u8>, _expires_at: Option<u64>) -> Result<()> {
        let (db, key) = (self.db.clone(), key.to_string());
        run_blocking(move || Ok(db.put(key.as_bytes(), raw)?)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let (db, key) = (self.db.clone(), key.to_string());
        run_blocking(move || Ok(db.delete(key.as_bytes())?)).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let (db, prefix) = (self.db.clone(), prefix.to_string());
        run_blocking(move || {
            let mut keys = Vec::new();
            let iter = db.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
            for item in iter {
                let (key, _) = item?;
                if !key.starts_with(prefix.as_bytes()) {
                    break;
                }
                keys.push(String::from_utf8_lossy(&key).into_owned());
            }
            Ok(keys)
        })
        .await
    }
}
