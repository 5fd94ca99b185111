//! Cache Module
//!
//! TTL cache engine over a pluggable backend, with single-flight `wrap`,
//! serialized transactions and an optional in-process hot layer.

mod engine;
mod entry;
mod hot;
mod stats;
mod transaction;
mod ttl;
mod wrap;


// Re-export public types
pub use engine::{CacheEngine, EngineSettings};
pub use entry::{current_timestamp_ms, CacheEntry, EntryInfo};
pub use hot::HotLayer;
pub use stats::CacheStats;
pub use transaction::{KeyRewriter, Transaction};
pub use ttl::Ttl;
pub use wrap::sanitize_key;
