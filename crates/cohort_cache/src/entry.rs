//! Cache entry with lazy expiration.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// What a cached request produced: status plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct CachedResponse {
    status: u16,
    data: JsonValue,
}

impl CachedResponse {
    /// Create a cached payload.
    pub fn new(status: u16, data: JsonValue) -> Self {
        Self { status, data }
    }

    /// Whether the cached status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Stored payload with its write time and optional lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct CacheEntry {
    payload: CachedResponse,
    stored_at: DateTime<Utc>,
    expiration_seconds: Option<u64>,
}

impl CacheEntry {
    /// Entry stored now.
    pub fn new(payload: CachedResponse, expiration_seconds: Option<u64>) -> Self {
        Self::written_at(payload, Utc::now(), expiration_seconds)
    }

    /// Entry with an explicit write time.
    pub fn written_at(
        payload: CachedResponse,
        stored_at: DateTime<Utc>,
        expiration_seconds: Option<u64>,
    ) -> Self {
        Self {
            payload,
            stored_at,
            expiration_seconds,
        }
    }

    /// Expired iff a lifetime is set and strictly more than it has elapsed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiration_seconds {
            None => false,
            Some(seconds) => {
                let elapsed_ms = (now - self.stored_at).num_milliseconds();
                elapsed_ms > (seconds as i64).saturating_mul(1000)
            }
        }
    }

    /// Check if this entry is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Take the payload out of the entry.
    pub fn into_payload(self) -> CachedResponse {
        self.payload
    }
}
