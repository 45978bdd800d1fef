use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// Longest lifetime an entry can have; larger TTLs are clamped to it.
pub(crate) const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// A stored value together with the instant after which it is stale.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) value: Value,
    pub(crate) expires_at: Instant,
}

impl CacheEntry {
    pub(crate) fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl.min(MAX_TTL),
        }
    }

    /// An entry is still valid at its exact expiry instant.
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}
