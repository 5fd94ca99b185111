//! Scoped Cache Module
//!
//! Namespacing and version-based invalidation over a shared `CacheEngine`.
//!
//! Every key is stored as `<prefix>_<key>`. The running version is persisted
//! under `scope-version:<prefix>`; when a scope starts with a version that
//! differs from the persisted one, everything under the prefix is deleted
//! once before the first read or write.
//!
//! Prefixes may not contain `_`, otherwise scope `parks` would also own the
//! keys of a scope named `parks_east`.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheEngine, KeyRewriter, Transaction, Ttl};
use crate::error::{CacheError, Result};
use crate::reuse::{ReuseMode, ReuseRegistry};

// == Scoped Cache ==
#[derive(Clone)]
pub struct ScopedCache {
    engine: CacheEngine,
    prefix: String,
    version: String,
    init: ReuseRegistry<()>,
}

impl ScopedCache {
    /// Creates a scope over `engine`.
    ///
    /// Scopes sharing `init` collapse their version checks into one run per
    /// (engine, prefix, version).
    ///
    /// # Errors
    /// Returns `CacheError::InvalidRequest` if `prefix` is empty or contains
    /// the `_` separator.
    pub fn new(
        engine: CacheEngine,
        prefix: impl Into<String>,
        version: impl ToString,
        init: ReuseRegistry<()>,
    ) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.contains('_') {
            return Err(CacheError::InvalidRequest(format!(
                "scope prefix '{}' must be non-empty and free of '_'",
                prefix
            )));
        }

        Ok(Self {
            engine,
            prefix,
            version: version.to_string(),
            init,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    /// Key the persisted version lives under.
    pub fn version_key(&self) -> String {
        format!("scope-version:{}", self.prefix)
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key)
    }

    // == Initialization ==
    /// Runs the version check once; concurrent and later callers share it.
    pub async fn init_cache(&self) -> Result<()> {
        let identity = format!(
            "scope:{}:{}:{}",
            self.engine.id(),
            self.prefix,
            self.version
        );
        let scope = self.clone();
        self.init
            .run(&identity, ReuseMode::Forever, move || async move {
                scope.check_version().await
            })
            .await
    }

    async fn check_version(&self) -> Result<()> {
        let version_key = self.version_key();
        let current = Value::String(self.version.clone());

        match self.engine.get::<Value>(&version_key).await? {
            Some(stored) if stored == current => {
                debug!("Scope '{}' is at version {}", self.prefix, self.version);
                return Ok(());
            }
            Some(stored) => {
                let removed = self.invalidate().await?;
                info!(
                    "Scope '{}' moved from version {} to {}, removed {} keys",
                    self.prefix, stored, self.version, removed
                );
            }
            None => {
                debug!("Scope '{}' has no stored version", self.prefix);
            }
        }

        self.engine
            .set(&version_key, &current, Some(Ttl::Forever))
            .await
    }

    async fn invalidate(&self) -> Result<usize> {
        let keys = self.engine.get_keys(&self.scoped_key("")).await?;
        let deletes = keys.iter().map(|key| async move {
            if let Err(e) = self.engine.delete(key).await {
                warn!("Could not delete '{}' during invalidation: {}", key, e);
                false
            } else {
                true
            }
        });
        let removed = join_all(deletes).await.into_iter().filter(|ok| *ok).count();
        Ok(removed)
    }

    // == Scoped Operations ==
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.init_cache().await?;
        self.engine.get(&self.scoped_key(key)).await
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Ttl>,
    ) -> Result<()> {
        self.init_cache().await?;
        self.engine.set(&self.scoped_key(key), value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.init_cache().await?;
        self.engine.delete(&self.scoped_key(key)).await
    }

    pub async fn wrap<T, F, Fut>(&self, key: &str, fetch: F, ttl: Option<Ttl>) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.init_cache().await?;
        self.engine.wrap(&self.scoped_key(key), fetch, ttl).await
    }

    /// Keys stored under this scope, with the prefix stripped.
    pub async fn get_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.init_cache().await?;
        let namespace = self.scoped_key("");
        let keys = self
            .engine
            .get_keys(&format!("{}{}", namespace, prefix))
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&namespace).map(str::to_string))
            .collect())
    }

    /// Runs `body` as an engine transaction with every key scoped.
    pub async fn run_transaction<R, F, Fut>(&self, body: F) -> Result<R>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.init_cache().await?;
        let prefix = self.prefix.clone();
        let rewrite: KeyRewriter = Arc::new(move |key: &str| format!("{}_{}", prefix, key));
        self.engine.run_transaction_with(rewrite, body).await
    }

    // == Global Operations ==
    // Unprefixed keys, shared by every scope on the engine.

    pub async fn get_global<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.engine.get(key).await
    }

    pub async fn set_global<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Ttl>,
    ) -> Result<()> {
        self.engine.set(key, value, ttl).await
    }

    pub async fn wrap_global<T, F, Fut>(&self, key: &str, fetch: F, ttl: Option<Ttl>) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.engine.wrap(key, fetch, ttl).await
    }
}

impl std::fmt::Debug for ScopedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCache")
            .field("prefix", &self.prefix)
            .field("version", &self.version)
            .field("engine", &self.engine.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(engine: &CacheEngine, prefix: &str, version: u32) -> ScopedCache {
        ScopedCache::new(engine.clone(), prefix, version, ReuseRegistry::new()).unwrap()
    }

    #[test]
    fn test_prefix_with_separator_is_rejected() {
        let engine = CacheEngine::in_memory();

        for prefix in ["parks_east", "_", ""] {
            let result = ScopedCache::new(engine.clone(), prefix, 1, ReuseRegistry::new());
            assert!(
                matches!(result, Err(CacheError::InvalidRequest(_))),
                "prefix {:?}",
                prefix
            );
        }
        assert!(ScopedCache::new(engine, "parks-east", 1, ReuseRegistry::new()).is_ok());
    }

    #[tokio::test]
    async fn test_scoped_keys_are_prefixed() {
        let engine = CacheEngine::in_memory();
        let parks = scope(&engine, "parks", 1);

        parks.set("list", &vec![1, 2], None).await.unwrap();

        assert_eq!(
            engine.get::<Vec<i32>>("parks_list").await.unwrap(),
            Some(vec![1, 2])
        );
        assert_eq!(parks.get::<Vec<i32>>("list").await.unwrap(), Some(vec![1, 2]));
        assert_eq!(parks.get_keys("").await.unwrap(), vec!["list".to_string()]);
    }

    #[tokio::test]
    async fn test_scopes_do_not_collide() {
        let engine = CacheEngine::in_memory();
        let a = scope(&engine, "a", 1);
        let b = scope(&engine, "b", 1);

        a.set("k", &"from a", None).await.unwrap();
        b.set("k", &"from b", None).await.unwrap();

        assert_eq!(a.get::<String>("k").await.unwrap().unwrap(), "from a");
        assert_eq!(b.get::<String>("k").await.unwrap().unwrap(), "from b");
    }

    #[tokio::test]
    async fn test_version_bump_invalidates_prefix_only() {
        let engine = CacheEngine::in_memory();
        let v1 = scope(&engine, "rides", 1);
        v1.set("one", &1, None).await.unwrap();
        v1.set("two", &2, None).await.unwrap();
        v1.set_global("token", &"shared", None).await.unwrap();
        engine.set("other_key", &3, None).await.unwrap();

        let v2 = scope(&engine, "rides", 2);
        assert!(v2.get::<i32>("one").await.unwrap().is_none());
        assert!(engine.get_keys("rides_").await.unwrap().is_empty());

        assert_eq!(
            engine.get::<String>("scope-version:rides").await.unwrap(),
            Some("2".to_string())
        );
        assert_eq!(engine.get::<i32>("other_key").await.unwrap(), Some(3));
        assert_eq!(
            v2.get_global::<String>("token").await.unwrap(),
            Some("shared".to_string())
        );
    }

    #[tokio::test]
    async fn test_same_version_keeps_data() {
        let engine = CacheEngine::in_memory();
        scope(&engine, "s", 3).set("k", &1, None).await.unwrap();

        let again = scope(&engine, "s", 3);
        assert_eq!(again.get::<i32>("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_scoped_transaction_and_wrap() {
        let engine = CacheEngine::in_memory();
        let s = scope(&engine, "t", 1);

        s.run_transaction(|tx| async move { tx.set("counter", &5, None).await })
            .await
            .unwrap();
        assert_eq!(engine.get::<i32>("t_counter").await.unwrap(), Some(5));

        let fetched: i32 = s.wrap("w", || async { Ok(8) }, None).await.unwrap();
        assert_eq!(fetched, 8);
        assert_eq!(engine.get::<i32>("t_w").await.unwrap(), Some(8));

        s.delete("w").await.unwrap();
        assert!(engine.get::<i32>("t_w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_first_use_invalidates_once() {
        let engine = CacheEngine::in_memory();
        let old = scope(&engine, "parks", 1);
        old.set("stale", &1, None).await.unwrap();

        let init = ReuseRegistry::new();
        let writer = ScopedCache::new(engine.clone(), "parks", 2, init.clone()).unwrap();
        let reader = ScopedCache::new(engine.clone(), "parks", 2, init.clone()).unwrap();

        let (written, read) = tokio::join!(
            writer.set("fresh", &2, None),
            reader.get::<i32>("stale"),
        );
        written.unwrap();
        assert_eq!(read.unwrap(), None);

        // A second invalidation would have removed the fresh key
        assert_eq!(reader.get::<i32>("fresh").await.unwrap(), Some(2));
        assert_eq!(engine.get_keys("parks_").await.unwrap(), vec!["parks_fresh".to_string()]);
        assert_eq!(init.len(), 1);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_invalidation_tolerates_failed_deletes() {
        use crate::backend::{Backend, SqliteStore};
        use crate::cache::EngineSettings;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        let store = SqliteStore::open(&path).unwrap();
        let engine = CacheEngine::new(Backend::Sqlite(store), EngineSettings::default());

        let v1 = scope(&engine, "parks", 1);
        for key in ["a", "b", "locked"] {
            v1.set(key, &key, None).await.unwrap();
        }

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER keep_locked BEFORE DELETE ON cache_entries
                 WHEN OLD.key = 'parks_locked'
                 BEGIN SELECT RAISE(ABORT, 'row is locked'); END;",
            )
            .unwrap();

        let v2 = scope(&engine, "parks", 2);
        v2.init_cache().await.unwrap();

        assert_eq!(
            engine.get_keys("parks_").await.unwrap(),
            vec!["parks_locked".to_string()]
        );
        assert_eq!(
            engine.get::<String>("scope-version:parks").await.unwrap(),
            Some("2".to_string())
        );
    }
}
