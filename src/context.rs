//! Cache Context
//!
//! Owns the process's cache engine. Built once at startup and passed to
//! whatever needs caching.

use crate::backend::Backend;
use crate::cache::{CacheEngine, EngineSettings};
use crate::config::Config;
use crate::error::Result;
use crate::reuse::ReuseRegistry;
use crate::scoped::ScopedCache;

#[derive(Clone, Debug)]
pub struct CacheContext {
    engine: CacheEngine,
    scopes: ReuseRegistry<()>,
}

impl CacheContext {
    pub fn new(engine: CacheEngine) -> Self {
        Self {
            engine,
            scopes: ReuseRegistry::new(),
        }
    }

    /// Opens the configured backend and builds the engine over it.
    ///
    /// # Errors
    /// Returns `CacheError::Config` if the backend was not compiled in, or
    /// `CacheError::Backend` if it cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = Backend::from_config(config)?;
        Ok(Self::new(CacheEngine::new(backend, config.engine_settings())))
    }

    /// Context over a fresh in-memory engine.
    pub fn in_memory(settings: EngineSettings) -> Self {
        Self::new(CacheEngine::new(Backend::memory(), settings))
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    /// Scoped cache over this context's engine. Scopes built from the same
    /// context share their one-time version check.
    ///
    /// # Errors
    /// Returns `CacheError::InvalidRequest` for an empty prefix or one
    /// containing `_`.
    pub fn scoped(&self, prefix: &str, version: impl ToString) -> Result<ScopedCache> {
        ScopedCache::new(self.engine.clone(), prefix, version, self.scopes.clone())
    }

    /// Registry shared by this context's scopes.
    pub fn reuse_registry(&self) -> &ReuseRegistry<()> {
        &self.scopes
    }
}
