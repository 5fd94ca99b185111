//! Response DTOs for the operational API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, EntryInfo};

/// Response body for entry listings (GET /entries)
#[derive(Debug, Clone, Serialize)]
pub struct EntriesResponse {
    /// Number of entries returned
    pub count: usize,
    /// Entries, expired ones included
    pub entries: Vec<EntryInfo>,
}

impl EntriesResponse {
    pub fn new(entries: Vec<EntryInfo>) -> Self {
        Self {
            count: entries.len(),
            entries,
        }
    }
}

/// Response body for single-key deletes (DELETE /entries/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted", key),
            key,
        }
    }
}

/// Response body for bulk clears (DELETE /entries)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Number of keys deleted
    pub removed: usize,
}

impl ClearResponse {
    pub fn new(prefix: &str, removed: usize) -> Self {
        let message = if prefix.is_empty() {
            format!("Cleared {} keys", removed)
        } else {
            format!("Cleared {} keys under '{}'", removed, prefix)
        };
        Self { message, removed }
    }
}

/// Response body for expired-entry cleanup (POST /cleanup)
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    /// Number of expired entries deleted
    pub removed: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Backend the engine was opened over
    pub backend: String,
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    /// Creates a new StatsResponse from engine counters
    pub fn new(backend: impl ToString, stats: CacheStats) -> Self {
        Self {
            backend: backend.to_string(),
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use serde_json::json;

    #[test]
    fn test_entries_response_counts() {
        let entry = CacheEntry::new(json!({"wait": 15}), None);
        let info = EntryInfo::new("parks_1".to_string(), entry, 40, None);
        let resp = EntriesResponse::new(vec![info]);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["count"], json!(1));
        assert_eq!(json["entries"][0]["key"], json!("parks_1"));
        assert_eq!(json["entries"][0]["value"], json!({"wait": 15}));
    }

    #[test]
    fn test_clear_response_message() {
        assert_eq!(ClearResponse::new("", 3).message, "Cleared 3 keys");
        assert_eq!(
            ClearResponse::new("parks_", 2).message,
            "Cleared 2 keys under 'parks_'"
        );
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_fetch_failure(false);

        let json = serde_json::to_value(StatsResponse::new("memory", stats)).unwrap();
        assert_eq!(json["backend"], json!("memory"));
        assert_eq!(json["hits"], json!(1));
        assert_eq!(json["stale_served"], json!(1));
        assert_eq!(json["hit_rate"], json!(0.5));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
