//! Cache Entry Module
//!
//! Defines the TTL envelope persisted for every key and the read-only view
//! handed to operational tooling.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// == Cache Entry ==
/// TTL envelope stored in the backend for every key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an envelope expiring at `expires_at` (Unix milliseconds).
    pub fn new(value: Value, expires_at: Option<u64>) -> Self {
        Self {
            value,
            created_at: current_timestamp_ms(),
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Checks expiry against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    /// True once the entry has been expired for at least `grace_ms`.
    pub fn is_reclaimable_at(&self, now_ms: u64, grace_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires.saturating_add(grace_ms),
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }

    // == Encoding ==
    /// Serializes the envelope into the self-describing stored form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a stored envelope.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

// == Entry Info ==
/// Read-only description of a stored entry for listing and maintenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub value: Value,
    /// Unix milliseconds, None = never expires
    pub expires_at: Option<u64>,
    /// Last successful read by this process (Unix milliseconds)
    pub last_access: Option<u64>,
    /// Size of the stored envelope in bytes
    pub size: usize,
    pub expired: bool,
}

impl EntryInfo {
    pub(crate) fn new(key: String, entry: CacheEntry, size: usize, last_access: Option<u64>) -> Self {
        let expired = entry.is_expired();
        Self {
            key,
            value: entry.value,
            expires_at: entry.expires_at,
            last_access,
            size,
            expired,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
