//! Wrap Module
//!
//! Single-flight read-through caching. At most one fetch runs per
//! (engine, key); every caller arriving while it runs shares its outcome.
//!
//! Failure policy: a failed fetch re-stores the previous value for the stale
//! window and returns it, until the key has failed more than
//! `max_consecutive_failures` times in a row. With no previous value the
//! error is returned straight away.

use std::future::Future;
use std::path::Path;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::engine::decode;
use super::{CacheEngine, CacheEntry, Ttl};
use crate::error::{CacheError, Result};

/// Outcome of the one in-flight fetch for a key.
pub(crate) type PendingWrap = Shared<BoxFuture<'static, Result<Value>>>;

/// Removes the pending record once the resolver task ends, even on panic.
struct PendingGuard {
    engine: CacheEngine,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.engine.inner.pending.lock().remove(&self.key);
    }
}

impl CacheEngine {
    // == Wrap ==
    /// Returns the live value for `key`, calling `fetch` to produce it when
    /// there is none.
    ///
    /// Concurrent calls for the same key share a single `fetch` execution and
    /// receive the same value or error. `ttl` applies to the fetched value
    /// (default TTL if None); a computed TTL is evaluated after `fetch` settles.
    pub async fn wrap<T, F, Fut>(&self, key: &str, fetch: F, ttl: Option<Ttl>) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let joined = self.inner.pending.lock().get(key).cloned();
        if let Some(pending) = joined {
            return decode(pending.await?);
        }

        if let Some(entry) = self.get_entry(key).await? {
            if !entry.is_expired() {
                self.inner.stats.lock().record_hit();
                return decode(entry.value);
            }
        }

        let pending = {
            let mut pending = self.inner.pending.lock();
            match pending.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let resolver = self.spawn_resolver(key.to_string(), fetch, ttl);
                    pending.insert(key.to_string(), resolver.clone());
                    resolver
                }
            }
        };

        decode(pending.await?)
    }

    /// Returns a function that routes every call through [`wrap`](Self::wrap),
    /// with the cache key derived from the call's arguments.
    pub fn cached_fn<A, T, K, F, Fut>(
        &self,
        key_fn: K,
        fetch: F,
        ttl: Option<Ttl>,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T>>
    where
        A: Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let engine = self.clone();
        move |args: A| {
            let key = key_fn(&args);
            let engine = engine.clone();
            let fetch = fetch.clone();
            let ttl = ttl.clone();
            async move { engine.wrap(&key, move || fetch(args), ttl).await }.boxed()
        }
    }

    fn spawn_resolver<T, F, Fut>(&self, key: String, fetch: F, ttl: Option<Ttl>) -> PendingWrap
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = PendingGuard {
                engine: engine.clone(),
                key: key.clone(),
            };
            let outcome = engine.resolve(&key, fetch, ttl).await;
            engine.dump_outcome(&key, &outcome).await;
            outcome
        });

        async move { handle.await? }.boxed().shared()
    }

    async fn resolve<T, F, Fut>(&self, key: &str, fetch: F, ttl: Option<Ttl>) -> Result<Value>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // A resolver that settled just before this one was registered may
        // already have refreshed the key.
        let previous = self.get_entry(key).await?;
        if let Some(entry) = &previous {
            if !entry.is_expired() {
                return Ok(entry.value.clone());
            }
        }

        self.inner.stats.lock().record_fetch();
        debug!("Fetching '{}'", key);

        match fetch().await {
            Ok(fetched) => {
                let value = serde_json::to_value(fetched)?;
                self.set(key, &value, ttl).await?;
                self.inner.failures.lock().remove(key);
                Ok(value)
            }
            Err(e) => self.recover(key, format!("{:#}", e), previous).await,
        }
    }

    async fn recover(
        &self,
        key: &str,
        message: String,
        previous: Option<CacheEntry>,
    ) -> Result<Value> {
        let failures = {
            let mut failures = self.inner.failures.lock();
            let count = failures.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let max = self.inner.settings.max_consecutive_failures;

        let Some(previous) = previous else {
            self.inner.stats.lock().record_fetch_failure(true);
            error!(
                "Fetch for '{}' failed with nothing cached (failure {}): {}",
                key, failures, message
            );
            return Err(CacheError::Fetch(message));
        };

        if failures > max {
            self.inner.stats.lock().record_fetch_failure(true);
            error!(
                "Fetch for '{}' failed {} times in a row: {}",
                key, failures, message
            );
            return Err(CacheError::Fetch(message));
        }

        self.inner.stats.lock().record_fetch_failure(false);
        warn!(
            "Fetch for '{}' failed ({}/{}), serving previous value: {}",
            key, failures, max, message
        );
        let stale_ttl = Ttl::For(self.inner.settings.stale_ttl);
        self.set(key, &previous.value, Some(stale_ttl)).await?;
        Ok(previous.value)
    }

    /// Consecutive failed fetches recorded for `key`.
    pub fn failure_count(&self, key: &str) -> u32 {
        self.inner.failures.lock().get(key).copied().unwrap_or(0)
    }

    /// Returns true while a fetch for `key` is in flight.
    pub fn is_resolving(&self, key: &str) -> bool {
        self.inner.pending.lock().contains_key(key)
    }

    // == Debug Dump ==
    async fn dump_outcome(&self, key: &str, outcome: &Result<Value>) {
        let Some(dir) = &self.inner.settings.debug_dir else {
            return;
        };

        let record = match outcome {
            Ok(value) => json!({
                "key": key,
                "ok": true,
                "value": value,
                "settled_at": chrono::Utc::now().to_rfc3339(),
            }),
            Err(e) => json!({
                "key": key,
                "ok": false,
                "error": e.to_string(),
                "settled_at": chrono::Utc::now().to_rfc3339(),
            }),
        };

        if let Err(e) = write_dump(dir, key, &record).await {
            warn!("Could not write debug dump for '{}': {}", key, e);
        }
    }
}

async fn write_dump(dir: &Path, key: &str, record: &Value) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.json", sanitize_key(key)));
    tokio::fs::write(path, serde_json::to_vec_pretty(record)?).await?;
    Ok(())
}

/// File-name-safe version of a cache key.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EngineSettings;
    use crate::backend::Backend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine_with_stale(stale_ms: u64) -> CacheEngine {
        CacheEngine::new(
            Backend::memory(),
            EngineSettings {
                stale_ttl: Duration::from_millis(stale_ms),
                ..EngineSettings::default()
            },
        )
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("parks/42:waits?x=1"), "parks_42_waits_x_1");
        assert_eq!(sanitize_key("plain-key_1"), "plain-key_1");
    }

    #[tokio::test]
    async fn test_wrap_fetches_once_then_serves_cache() {
        let engine = CacheEngine::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: u32 = engine
                .wrap(
                    "k",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    },
                    None,
                )
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!engine.is_resolving("k"));
    }

    #[tokio::test]
    async fn test_wrap_first_failure_escalates_immediately() {
        let engine = CacheEngine::in_memory();

        let result: Result<u32> = engine
            .wrap("k", || async { Err(anyhow::anyhow!("upstream down")) }, None)
            .await;

        assert!(matches!(result, Err(CacheError::Fetch(msg)) if msg.contains("upstream down")));
        assert_eq!(engine.failure_count("k"), 1);
        assert_eq!(engine.stats().escalations, 1);
    }

    #[tokio::test]
    async fn test_wrap_failure_serves_previous_with_stale_ttl() {
        let engine = engine_with_stale(60_000);
        engine.set("k", &"old", Some(Ttl::millis(0))).await.unwrap();

        let value: String = engine
            .wrap("k", || async { Err(anyhow::anyhow!("boom")) }, None)
            .await
            .unwrap();
        assert_eq!(value, "old");

        let entry = engine.get_entry("k").await.unwrap().unwrap();
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining_ms().unwrap() <= 60_000);

        // Inside the stale window the fetch is not invoked again
        let value: String = engine
            .wrap("k", || async { Ok("new".to_string()) }, None)
            .await
            .unwrap();
        assert_eq!(value, "old");
    }

    #[tokio::test]
    async fn test_wrap_success_resets_failure_count() {
        let engine = engine_with_stale(0);
        engine.set("k", &1, Some(Ttl::millis(0))).await.unwrap();

        let _: i32 = engine
            .wrap("k", || async { Err(anyhow::anyhow!("boom")) }, None)
            .await
            .unwrap();
        assert_eq!(engine.failure_count("k"), 1);

        let value: i32 = engine
            .wrap("k", || async { Ok(2) }, Some(Ttl::millis(0)))
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(engine.failure_count("k"), 0);
    }

    #[tokio::test]
    async fn test_wrap_computed_ttl_sees_fetched_data() {
        let engine = CacheEngine::in_memory();
        let expires_in = Arc::new(AtomicUsize::new(0));

        let source = expires_in.clone();
        let ttl = Ttl::computed(move || Ttl::secs(source.load(Ordering::SeqCst) as u64));
        let sink = expires_in.clone();
        let _: u32 = engine
            .wrap(
                "token",
                move || async move {
                    sink.store(120, Ordering::SeqCst);
                    Ok(1)
                },
                Some(ttl),
            )
            .await
            .unwrap();

        let remaining = engine
            .get_entry("token")
            .await
            .unwrap()
            .unwrap()
            .ttl_remaining_ms()
            .unwrap();
        assert!(remaining > 100_000 && remaining <= 120_000);
    }

    #[tokio::test]
    async fn test_wrap_panicking_fetch_releases_key() {
        let engine = CacheEngine::in_memory();

        let result: Result<u32> = engine
            .wrap("k", || async { panic!("fetch exploded") }, None)
            .await;
        assert!(matches!(result, Err(CacheError::Internal(_))));
        assert!(!engine.is_resolving("k"));

        let value: u32 = engine.wrap("k", || async { Ok(3) }, None).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_cached_fn_derives_keys_from_arguments() {
        let engine = CacheEngine::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let waits = engine.cached_fn(
            |park: &u32| format!("waits_{}", park),
            move |park: u32| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(park * 10)
                }
            },
            None,
        );

        assert_eq!(waits(1).await.unwrap(), 10);
        assert_eq!(waits(1).await.unwrap(), 10);
        assert_eq!(waits(2).await.unwrap(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.get::<u32>("waits_2").await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_debug_dump_written_per_outcome() {
        let dir = TempDir::new().unwrap();
        let engine = CacheEngine::new(
            Backend::memory(),
            EngineSettings {
                debug_dir: Some(dir.path().to_path_buf()),
                ..EngineSettings::default()
            },
        );

        let _: u32 = engine.wrap("parks/1", || async { Ok(5) }, None).await.unwrap();
        let _: Result<u32> = engine
            .wrap("parks/2", || async { Err(anyhow::anyhow!("nope")) }, None)
            .await;

        let ok: Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("parks_1.json")).unwrap())
                .unwrap();
        assert_eq!(ok["ok"], json!(true));
        assert_eq!(ok["value"], json!(5));

        let failed: Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("parks_2.json")).unwrap())
                .unwrap();
        assert_eq!(failed["ok"], json!(false));
        assert!(failed["error"].as_str().unwrap().contains("nope"));
    }
}
