//! Cache Engine Module
//!
//! TTL-aware layer over one backend store. Values are kept in a JSON envelope
//! with an expiry; an optional hot layer keeps recently used envelopes in
//! process. Single-flight `wrap` lives in `wrap.rs`, transactions in
//! `transaction.rs`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::current_timestamp_ms;
use super::transaction::TransactionQueue;
use super::ttl::Lifetime;
use super::wrap::PendingWrap;
use super::{CacheEntry, CacheStats, EntryInfo, HotLayer, Ttl};
use crate::backend::{Backend, BackendStore};
use crate::error::Result;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

// == Engine Settings ==
/// Tunable engine behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// TTL applied when a caller passes none
    pub default_ttl: Duration,
    /// How long a previous value is re-stored for after a failed fetch
    pub stale_ttl: Duration,
    /// Failed fetches per key masked before the error reaches callers
    pub max_consecutive_failures: u32,
    /// Hot layer capacity, 0 disables the layer
    pub hot_layer_capacity: usize,
    /// Directory receiving one JSON file per settled wrap
    pub debug_dir: Option<PathBuf>,
    /// How long past expiry an entry is kept as a wrap fallback before
    /// `cleanup_expired` may reclaim it
    pub cleanup_grace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            stale_ttl: Duration::from_secs(30),
            max_consecutive_failures: 5,
            hot_layer_capacity: 0,
            debug_dir: None,
            cleanup_grace: Duration::from_secs(3600),
        }
    }
}

// == Cache Engine ==
/// Handle to a cache engine. Cloning is cheap and every clone shares the
/// same store, pending wraps, failure counters and transaction queue.
#[derive(Clone)]
pub struct CacheEngine {
    pub(super) inner: Arc<EngineInner>,
}

pub(super) struct EngineInner {
    pub(super) id: u64,
    pub(super) backend: Backend,
    pub(super) settings: EngineSettings,
    pub(super) hot: Option<Mutex<HotLayer>>,
    pub(super) pending: Mutex<HashMap<String, PendingWrap>>,
    pub(super) failures: Mutex<HashMap<String, u32>>,
    pub(super) transactions: TransactionQueue,
    pub(super) stats: Mutex<CacheStats>,
    pub(super) last_access: Mutex<HashMap<String, u64>>,
}

impl CacheEngine {
    // == Constructors ==
    pub fn new(backend: Backend, settings: EngineSettings) -> Self {
        let hot = (settings.hot_layer_capacity > 0)
            .then(|| Mutex::new(HotLayer::new(settings.hot_layer_capacity)));

        Self {
            inner: Arc::new(EngineInner {
                id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
                backend,
                settings,
                hot,
                pending: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                transactions: TransactionQueue::new(),
                stats: Mutex::new(CacheStats::new()),
                last_access: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Engine over a fresh heap-resident store with default settings.
    pub fn in_memory() -> Self {
        Self::new(Backend::memory(), EngineSettings::default())
    }

    /// Process-unique engine identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.lock().clone()
    }

    // == Get ==
    /// Returns the live value for `key`, or None if it is missing or expired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.block_on_pending_transactions().await;
        self.read_live_now(key).await
    }

    /// Returns the full envelope for `key`, including an expired one.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.block_on_pending_transactions().await;
        self.read_entry_now(key).await
    }

    // == Set ==
    /// Stores `value` under `key`.
    ///
    /// `ttl` defaults to the configured default TTL. `Ttl::Expire` (or a
    /// negative `Ttl::from_millis`) deletes the key instead.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Ttl>,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.block_on_pending_transactions().await;
        self.write_value_now(key, value, ttl).await
    }

    /// Deletes `key`.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.set(key, &Value::Null, Some(Ttl::Expire)).await
    }

    // == Enumeration ==
    /// Lists stored keys starting with `prefix`. Expired entries are included.
    pub async fn get_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.backend.keys_with_prefix(prefix).await
    }

    /// Describes every stored entry under `prefix`, expired ones included.
    ///
    /// Entries whose envelope cannot be parsed are skipped.
    pub async fn entries(&self, prefix: &str) -> Result<Vec<EntryInfo>> {
        self.block_on_pending_transactions().await;

        let keys = self.inner.backend.keys_with_prefix(prefix).await?;
        let mut infos = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(info) = self.describe_now(&key).await? {
                infos.push(info);
            }
        }
        Ok(infos)
    }

    /// Describes a single entry, expired or not.
    pub async fn entry(&self, key: &str) -> Result<Option<EntryInfo>> {
        self.block_on_pending_transactions().await;
        self.describe_now(key).await
    }

    // == Maintenance ==
    /// Deletes every key under `prefix`. Returns the number deleted.
    pub async fn clear(&self, prefix: &str) -> Result<usize> {
        let keys = self.get_keys(prefix).await?;
        for key in &keys {
            self.delete(key).await?;
        }
        debug!("Cleared {} keys under prefix '{}'", keys.len(), prefix);
        Ok(keys.len())
    }

    /// Deletes entries that expired more than `cleanup_grace` ago. Returns
    /// the number deleted.
    ///
    /// Recently expired envelopes are kept since `wrap` falls back on them
    /// when a refetch fails. Each key is re-checked inside a transaction, so
    /// a value refreshed after the scan started is never deleted.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let grace_ms = u64::try_from(self.inner.settings.cleanup_grace.as_millis())
            .unwrap_or(u64::MAX);

        let mut removed = 0;
        for key in self.get_keys("").await? {
            let reclaimed = self
                .run_transaction(|tx| async move {
                    let reclaimable = tx.get_entry(&key).await?.is_some_and(|entry| {
                        entry.is_reclaimable_at(current_timestamp_ms(), grace_ms)
                    });
                    if reclaimable {
                        tx.set(&key, &Value::Null, Some(Ttl::Expire)).await?;
                    }
                    Ok(reclaimable)
                })
                .await?;
            if reclaimed {
                removed += 1;
            }
        }

        self.prune_bookkeeping().await?;
        Ok(removed)
    }

    /// Drops access times and failure counters of keys no longer stored.
    async fn prune_bookkeeping(&self) -> Result<()> {
        let stored: HashSet<String> = self.get_keys("").await?.into_iter().collect();

        self.inner
            .last_access
            .lock()
            .retain(|key, _| stored.contains(key));

        let pending = self.inner.pending.lock();
        self.inner
            .failures
            .lock()
            .retain(|key, _| stored.contains(key) || pending.contains_key(key));
        Ok(())
    }

    // == Unqueued Access ==
    // Used after the transaction queue has been waited on, and directly by
    // transaction bodies which already hold the queue.

    pub(super) async fn read_live_now<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let live = self
            .read_entry_now(key)
            .await?
            .filter(|entry| !entry.is_expired());

        match live {
            Some(entry) => {
                self.record_access(key);
                self.inner.stats.lock().record_hit();
                Ok(Some(decode(entry.value)?))
            }
            None => {
                self.inner.stats.lock().record_miss();
                Ok(None)
            }
        }
    }

    pub(super) async fn read_entry_now(&self, key: &str) -> Result<Option<CacheEntry>> {
        if let Some(hot) = &self.inner.hot {
            let cached = hot.lock().get(key);
            if cached.is_some() {
                return Ok(cached);
            }
        }

        let Some(raw) = self.inner.backend.get(key).await? else {
            return Ok(None);
        };

        let entry = match CacheEntry::from_bytes(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring unreadable cache entry '{}': {}", key, e);
                return Ok(None);
            }
        };

        self.remember_hot(key, &entry);
        Ok(Some(entry))
    }

    pub(super) async fn write_value_now(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Ttl>,
    ) -> Result<()> {
        let ttl = ttl.unwrap_or(Ttl::For(self.inner.settings.default_ttl));

        match ttl.resolve(current_timestamp_ms()) {
            Lifetime::Delete => {
                if let Some(hot) = &self.inner.hot {
                    hot.lock().remove(key);
                }
                self.inner.last_access.lock().remove(key);
                self.inner.failures.lock().remove(key);
                self.inner.backend.delete(key).await
            }
            Lifetime::Until(expires_at) => {
                let entry = CacheEntry::new(value, expires_at);
                let raw = entry.to_bytes()?;
                self.inner.backend.set(key, raw, expires_at).await?;
                self.remember_hot(key, &entry);
                Ok(())
            }
        }
    }

    async fn describe_now(&self, key: &str) -> Result<Option<EntryInfo>> {
        let Some(raw) = self.inner.backend.get(key).await? else {
            return Ok(None);
        };

        match CacheEntry::from_bytes(&raw) {
            Ok(entry) => {
                let last_access = self.inner.last_access.lock().get(key).copied();
                Ok(Some(EntryInfo::new(key.to_string(), entry, raw.len(), last_access)))
            }
            Err(e) => {
                warn!("Ignoring unreadable cache entry '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    fn remember_hot(&self, key: &str, entry: &CacheEntry) {
        if let Some(hot) = &self.inner.hot {
            let evicted = hot.lock().insert(key, entry.clone());
            if evicted > 0 {
                let mut stats = self.inner.stats.lock();
                for _ in 0..evicted {
                    stats.record_hot_eviction();
                }
            }
        }
    }

    fn record_access(&self, key: &str) {
        self.inner
            .last_access
            .lock()
            .insert(key.to_string(), current_timestamp_ms());
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("id", &self.inner.id)
            .field("backend", &self.inner.backend)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// Converts a stored JSON value into the caller's type.
pub(super) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
