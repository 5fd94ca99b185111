//! Transaction Module
//!
//! Serializes read/modify/write sequences on one engine. Transaction bodies
//! run one at a time in submission order (the turn lock is a fair FIFO
//! mutex). Plain reads and writes wait until no transaction is queued or
//! running, so they never observe a body halfway through.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::{CacheEngine, CacheEntry, Ttl};
use crate::error::Result;

/// Maps a caller key to the key actually stored.
pub type KeyRewriter = Arc<dyn Fn(&str) -> String + Send + Sync>;

// == Transaction Queue ==
pub(super) struct TransactionQueue {
    turn: Mutex<()>,
    outstanding: AtomicUsize,
    drained: Notify,
}

impl TransactionQueue {
    pub(super) fn new() -> Self {
        Self {
            turn: Mutex::new(()),
            outstanding: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Registers a transaction as queued until the returned slot drops.
    fn enter(&self) -> QueueSlot<'_> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        QueueSlot { queue: self }
    }

    pub(super) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

/// Leaves the queue on drop, including when the body panics or is cancelled.
struct QueueSlot<'a> {
    queue: &'a TransactionQueue,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        if self.queue.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.queue.drained.notify_waiters();
        }
    }
}

// == Transaction ==
/// Restricted get/set surface handed to a transaction body.
///
/// Operations skip the transaction wait since the body already holds the
/// queue. Calling the engine's own `get`/`set` from inside a body would wait
/// on itself and never finish.
#[derive(Clone)]
pub struct Transaction {
    engine: CacheEngine,
    rewrite: KeyRewriter,
}

impl Transaction {
    /// Live value for `key`, or None if missing or expired.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.engine.read_live_now(&(self.rewrite)(key)).await
    }

    /// Full envelope for `key`, expired or not.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.engine.read_entry_now(&(self.rewrite)(key)).await
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Ttl>,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.engine
            .write_value_now(&(self.rewrite)(key), value, ttl)
            .await
    }
}

impl CacheEngine {
    /// Runs `body` once every previously submitted transaction has finished.
    pub async fn run_transaction<R, F, Fut>(&self, body: F) -> Result<R>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.run_transaction_with(Arc::new(|key: &str| key.to_string()), body)
            .await
    }

    /// Like [`run_transaction`](Self::run_transaction), with every key the
    /// body touches passed through `rewrite`.
    pub async fn run_transaction_with<R, F, Fut>(&self, rewrite: KeyRewriter, body: F) -> Result<R>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let queue = &self.inner.transactions;
        let _slot = queue.enter();
        let _turn = queue.turn.lock().await;

        debug!(
            "Running transaction on engine {} ({} queued)",
            self.inner.id,
            queue.outstanding()
        );

        body(Transaction {
            engine: self.clone(),
            rewrite,
        })
        .await
    }

    /// Waits until no transaction is queued or running on this engine.
    ///
    /// Returns at the next moment the queue is empty; a transaction submitted
    /// right after that moment does not hold this caller back.
    pub async fn block_on_pending_transactions(&self) {
        let queue = &self.inner.transactions;
        let drained = queue.drained.notified();
        tokio::pin!(drained);
        drained.as_mut().enable();

        if queue.outstanding() == 0 {
            return;
        }
        drained.await;
    }
}
