//! TTL response cache keyed by query fingerprint.
//!
//! Expiry is TTL-only; entries past their TTL read as absent and are purged
//! lazily on access. Mutating CRM operations clear the whole cache rather
//! than tracking dependencies per entry. The map mutex is never held across
//! I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

/// Default entry lifetime. Pinned here so the surrounding deployment has a
/// single place to override it via [`ResponseCache::with_ttl`].
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Thread-safe TTL cache for CRM read results.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    /// Create a cache with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create a cache with a custom default TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Look up a payload. Expired entries read as absent and are removed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a payload under the cache's default TTL.
    pub fn put(&self, key: &str, payload: Value) {
        self.put_with_ttl(key, payload, self.ttl);
    }

    /// Store a payload with an explicit TTL.
    pub fn put_with_ttl(&self, key: &str, payload: Value, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop every entry. Called after any mutation that could affect donor
    /// records, since a single write can change many cached segment results.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock().unwrap();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "response cache invalidated");
    }

    /// Number of stored entries, including any not yet lazily purged.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns true when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
