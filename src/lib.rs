//! Feed Cache - caching and request coordination for live data feeds
//!
//! A TTL cache engine over interchangeable local backends (memory, RocksDB,
//! LMDB, SQLite) with single-flight fetches, stale fallback on upstream
//! failure, serialized transactions, versioned scopes and an in-flight reuse
//! coordinator.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod reuse;
pub mod scoped;
pub mod tasks;

pub use api::AppState;
pub use backend::{Backend, BackendKind, BackendStore};
pub use cache::{CacheEngine, EngineSettings, Transaction, Ttl};
pub use config::Config;
pub use context::CacheContext;
pub use error::{CacheError, Result};
pub use reuse::{ReuseMode, ReuseRegistry};
pub use scoped::ScopedCache;
pub use tasks::spawn_cleanup_task;
