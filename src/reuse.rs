//! Reuse Module
//!
//! Collapses concurrent calls that share an identity into one execution.
//! Independent of the cache engine and of any expiry.
//!
//! - `ReuseMode::InFlight`: callers arriving while an execution for their
//!   identity is outstanding share its outcome; once it settles the record is
//!   dropped and the next call starts fresh.
//! - `ReuseMode::Forever`: a success is kept and returned to every later
//!   call; a failure is still dropped so the operation can be retried.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinError;
use tracing::debug;

use crate::error::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReuseMode {
    #[default]
    InFlight,
    Forever,
}

type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct ReuseRecord<T, E> {
    outcome: SharedOutcome<T, E>,
    forever: bool,
}

type Records<T, E> = Arc<Mutex<HashMap<String, ReuseRecord<T, E>>>>;

// == Reuse Registry ==
/// Identity-keyed registry of shared outcomes.
///
/// Clones share the same records. The registry is explicit: whoever owns it
/// decides which callers can collapse into each other.
pub struct ReuseRegistry<T, E = CacheError> {
    records: Records<T, E>,
}

impl<T, E> Clone for ReuseRegistry<T, E> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<T, E> Default for ReuseRegistry<T, E> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T, E> std::fmt::Debug for ReuseRegistry<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReuseRegistry")
            .field("records", &self.records.lock().len())
            .finish()
    }
}

/// Drops the record when the execution ends, unless it is a kept success.
struct SettleGuard<T, E> {
    records: Records<T, E>,
    identity: String,
    keep: bool,
}

impl<T, E> Drop for SettleGuard<T, E> {
    fn drop(&mut self) {
        if !self.keep {
            self.records.lock().remove(&self.identity);
        }
    }
}

impl<T, E> ReuseRegistry<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op` for `identity`, or joins the execution already registered
    /// for it.
    ///
    /// `op` is called without the registry locked, so it may use the registry
    /// itself. When two callers race past the first check, the one that
    /// registers first wins and the other's future is dropped unpolled. The
    /// winning future is driven on its own task, so it settles even if every
    /// caller goes away.
    pub async fn run<F, Fut>(&self, identity: &str, mode: ReuseMode, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let existing = self
            .records
            .lock()
            .get(identity)
            .map(|record| record.outcome.clone());
        if let Some(outcome) = existing {
            return outcome.await;
        }

        let fut = op();

        let outcome = {
            let mut records = self.records.lock();
            match records.get(identity) {
                Some(record) => record.outcome.clone(),
                None => {
                    debug!("Starting execution for '{}' ({:?})", identity, mode);
                    let outcome = self.settle(identity.to_string(), mode, fut);
                    records.insert(
                        identity.to_string(),
                        ReuseRecord {
                            outcome: outcome.clone(),
                            forever: mode == ReuseMode::Forever,
                        },
                    );
                    outcome
                }
            }
        };

        outcome.await
    }

    fn settle<Fut>(&self, identity: String, mode: ReuseMode, fut: Fut) -> SharedOutcome<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let records = self.records.clone();
        let handle = tokio::spawn(async move {
            let mut guard = SettleGuard {
                records,
                identity,
                keep: false,
            };
            let result = fut.await;
            guard.keep = mode == ReuseMode::Forever && result.is_ok();
            result
        });

        async move { handle.await.map_err(E::from)? }.boxed().shared()
    }

    /// Returns true if a successful forever-mode outcome is memoized for
    /// `identity`.
    pub fn is_memoized(&self, identity: &str) -> bool {
        self.records.lock().get(identity).is_some_and(|record| {
            record.forever && matches!(record.outcome.peek(), Some(Ok(_)))
        })
    }

    /// Returns true if `identity` has an outstanding or memoized execution.
    pub fn is_tracked(&self, identity: &str) -> bool {
        self.records.lock().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Wraps `op` so every call goes through this registry, keyed by the
    /// identity `identity_fn` derives from the call's arguments.
    pub fn wrap_fn<A, I, F, Fut>(
        &self,
        identity_fn: I,
        mode: ReuseMode,
        op: F,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>>
    where
        A: Send + 'static,
        I: Fn(&A) -> String,
        F: Fn(A) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let registry = self.clone();
        move |args: A| {
            let identity = identity_fn(&args);
            let registry = registry.clone();
            let op = op.clone();
            async move { registry.run(&identity, mode, move || op(args)).await }.boxed()
        }
    }
}
