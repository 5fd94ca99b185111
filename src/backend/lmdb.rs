//! Memory-mapped transactional backend store (LMDB).
//!
//! Readers never block each other; writes are serialized by LMDB's single
//! write transaction. Every call runs on the blocking pool.

use std::path::{Path, PathBuf};

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::{run_blocking, BackendStore};
use crate::error::{CacheError, Result};

const DB_NAME: &str = "cache_entries";

// == LMDB Store ==
#[derive(Clone)]
pub struct LmdbStore {
    env: Env,
    db: Database<Str, Bytes>,
    path: PathBuf,
}

impl LmdbStore {
    /// Opens (or creates) an environment in the directory `path`.
    ///
    /// `map_size` bounds the total size of the database in bytes.
    pub fn open<P: AsRef<Path>>(path: P, map_size: usize) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        // SAFETY: one environment per directory per process; the engine owns it.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path)
        }
        .map_err(|e| {
            CacheError::Backend(format!(
                "failed to open LMDB environment at '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut wtxn = env.write_txn()?;
        let db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some(DB_NAME))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db,
            path: path.to_path_buf(),
        })
    }

    /// Environment directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackendStore for LmdbStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (env, db, key) = (self.env.clone(), self.db, key.to_string());
        run_blocking(move || {
            let rtxn = env.read_txn()?;
            let raw = db.get(&rtxn, key.as_str())?.map(|bytes| bytes.to_vec());
            Ok(raw)
        })
        .await
    }

    async fn set(&self, key: &str, raw: Vec<u8>, _expires_at: Option<u64>) -> Result<()> {
        let (env, db, key) = (self.env.clone(), self.db, key.to_string());
        run_blocking(move || {
            let mut wtxn = env.write_txn()?;
            db.put(&mut wtxn, key.as_str(), raw.as_slice())?;
            wtxn.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let (env, db, key) = (self.env.clone(), self.db, key.to_string());
        run_blocking(move || {
            let mut wtxn = env.write_txn()?;
            db.delete(&mut wtxn, key.as_str())?;
            wtxn.commit()?;
            Ok(())
        })
        .await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let (env, db, prefix) = (self.env.clone(), self.db, prefix.to_string());
        run_blocking(move || {
            let rtxn = env.read_txn()?;
            let mut keys = Vec::new();
            for item in db.prefix_iter(&rtxn, prefix.as_str())? {
                let (key, _) = item?;
                keys.push(key.to_string());
            }
            Ok(keys)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAP_SIZE: usize = 16 * 1024 * 1024;

    #[tokio::test]
    async fn test_lmdb_roundtrip_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(dir.path(), MAP_SIZE).unwrap();

        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lmdb_prefix_scan() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(dir.path(), MAP_SIZE).unwrap();
        for key in ["parks_b", "parks_a", "parks2_a", "rides_a"] {
            store.set(key, Vec::new(), None).await.unwrap();
        }

        let keys = store.keys_with_prefix("parks_").await.unwrap();
        assert_eq!(keys, vec!["parks_a".to_string(), "parks_b".to_string()]);
    }
}
