//! TTL Cleanup Task
//!
//! Background task that periodically deletes expired cache entries. Reads
//! never need it (expired values are already reported absent); it only
//! reclaims storage.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheEngine;

/// Spawns a background task that deletes expired entries every
/// `cleanup_interval` seconds.
///
/// # Arguments
/// * `cache` - Engine to clean; clones share its store
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
pub fn spawn_cleanup_task(cache: CacheEngine, cleanup_interval_secs: u64) -> JoinHandle<()> {
    spawn_cleanup_every(cache, Duration::from_secs(cleanup_interval_secs))
}

fn spawn_cleanup_every(cache: CacheEngine, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting TTL cleanup task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            match cache.cleanup_expired().await {
                Ok(0) => debug!("TTL cleanup: no expired entries found"),
                Ok(removed) => info!("TTL cleanup: removed {} expired entries", removed),
                // Backend errors are retried on the next tick
                Err(e) => warn!("TTL cleanup failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryStore};
    use crate::cache::{EngineSettings, Ttl};

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let store = MemoryStore::new();
        let settings = EngineSettings {
            cleanup_grace: Duration::ZERO,
            ..EngineSettings::default()
        };
        let cache = CacheEngine::new(Backend::Memory(store.clone()), settings);
        cache
            .set("expire_soon", &"value", Some(Ttl::millis(10)))
            .await
            .unwrap();
        cache.set("long_lived", &"value", None).await.unwrap();

        let handle = spawn_cleanup_every(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert_eq!(store.len(), 1);
        assert_eq!(
            cache.get::<String>("long_lived").await.unwrap(),
            Some("value".to_string())
        );
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let handle = spawn_cleanup_task(CacheEngine::in_memory(), 1);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
