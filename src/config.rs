//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::backend::BackendKind;
use crate::cache::EngineSettings;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which backend store to open at startup
    pub backend: BackendKind,
    /// Directory or file used by durable backends
    pub cache_path: PathBuf,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Seconds a previous value is re-stored for after a failed fetch
    pub stale_ttl: u64,
    /// Consecutive fetch failures masked before the error is surfaced
    pub max_consecutive_failures: u32,
    /// Capacity of the in-process hot layer, 0 disables it
    pub hot_layer_capacity: usize,
    /// LMDB map size in bytes
    pub lmdb_map_size: usize,
    /// Directory receiving wrap outcome dumps, None disables dumping
    pub debug_dir: Option<PathBuf>,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Seconds an expired entry is kept for wrap fallback before cleanup removes it
    pub cleanup_grace: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - memory, rocksdb, lmdb or sqlite (default: memory)
    /// - `CACHE_PATH` - Storage location (default: ./data/feed-cache)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `STALE_TTL` - Stale-serving window in seconds (default: 30)
    /// - `MAX_CONSECUTIVE_FAILURES` - Masked failures per key (default: 5)
    /// - `HOT_LAYER_CAPACITY` - Hot layer entries (default: 0, disabled)
    /// - `LMDB_MAP_SIZE` - LMDB map size in bytes (default: 1 GiB)
    /// - `CACHE_DEBUG_DIR` - Wrap outcome dump directory (default: unset)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `CLEANUP_GRACE` - Seconds past expiry before cleanup removes an entry (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backend = match env::var("CACHE_BACKEND") {
            Ok(raw) => BackendKind::from_str(&raw).unwrap_or_else(|e| {
                warn!("{}, falling back to {}", e, defaults.backend);
                defaults.backend
            }),
            Err(_) => defaults.backend,
        };

        Self {
            backend,
            cache_path: env::var("CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            stale_ttl: parse_var("STALE_TTL").unwrap_or(defaults.stale_ttl),
            max_consecutive_failures: parse_var("MAX_CONSECUTIVE_FAILURES")
                .unwrap_or(defaults.max_consecutive_failures),
            hot_layer_capacity: parse_var("HOT_LAYER_CAPACITY")
                .unwrap_or(defaults.hot_layer_capacity),
            lmdb_map_size: parse_var("LMDB_MAP_SIZE").unwrap_or(defaults.lmdb_map_size),
            debug_dir: env::var("CACHE_DEBUG_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            cleanup_grace: parse_var("CLEANUP_GRACE").unwrap_or(defaults.cleanup_grace),
        }
    }

    /// Projects the engine knobs out of the full configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_ttl: Duration::from_secs(self.default_ttl),
            stale_ttl: Duration::from_secs(self.stale_ttl),
            max_consecutive_failures: self.max_consecutive_failures,
            hot_layer_capacity: self.hot_layer_capacity,
            debug_dir: self.debug_dir.clone(),
            cleanup_grace: Duration::from_secs(self.cleanup_grace),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            cache_path: PathBuf::from("./data/feed-cache"),
            default_ttl: 3600,
            stale_ttl: 30,
            max_consecutive_failures: 5,
            hot_layer_capacity: 0,
            lmdb_map_size: 1 << 30,
            debug_dir: None,
            server_port: 3000,
            cleanup_interval: 60,
            cleanup_grace: 3600,
        }
    }
}
