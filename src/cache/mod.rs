//! In-memory TTL cache with pattern invalidation and response caching.
//!
//! [`CacheManager`] is a process-local map from string keys to JSON values,
//! each stored with an expiry instant. Expiry is enforced on read: a lookup
//! that finds a stale entry evicts it and reports a miss, so a reader never
//! observes a stale value. A [`CacheSweeper`] removes stale entries that are
//! never read again.
//!
//! The manager is an explicit object, cloned into whatever needs it (the
//! [`ResponseCache`] middleware, route handlers that invalidate after a
//! write). Clones share the same entries.
//!
//! Each instance caches only for its own process; several server instances
//! do not see each other's entries.

mod entry;
mod middleware;
mod stats;
mod sweeper;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::CacheSettings;
use entry::CacheEntry;
use stats::CacheMetrics;

pub use middleware::{ResponseCache, X_CACHE};
pub use stats::{CacheStats, MetricsSnapshot};
pub use sweeper::CacheSweeper;

/// TTL used by [`CacheManager::set`] unless configured otherwise (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// How often the sweeper runs unless configured otherwise (5 minutes).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Errors returned by cache operations.
///
/// Looking up a missing or expired key is not an error; it yields `None`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache invalidation pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cached value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

struct Shared {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    metrics: CacheMetrics,
}

/// Shared handle to an in-memory TTL cache.
///
/// Every operation takes one internal lock for the duration of its map access
/// and does no I/O while holding it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use storefront::cache::CacheManager;
///
/// let cache = CacheManager::new();
/// cache.set("/api/products", &serde_json::json!([{"id": 1}])).unwrap();
///
/// assert_eq!(cache.get("/api/products"), Some(serde_json::json!([{"id": 1}])));
/// assert!(cache.delete("/api/products"));
/// assert_eq!(cache.get("/api/products"), None);
/// ```
#[derive(Clone)]
pub struct CacheManager {
    shared: Arc<Shared>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("entries", &self.size())
            .field("default_ttl", &self.shared.default_ttl)
            .finish()
    }
}

impl CacheManager {
    /// Creates an empty cache whose default TTL is [`DEFAULT_TTL`].
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Creates an empty cache with a custom default TTL.
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                default_ttl,
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Creates an empty cache configured from `settings`.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::with_default_ttl(settings.default_ttl())
    }

    /// The TTL applied by [`set`](Self::set).
    pub fn default_ttl(&self) -> Duration {
        self.shared.default_ttl
    }

    // A panic while the lock was held cannot leave the map half-updated, so a
    // poisoned lock is safe to keep using.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.shared
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key` for the default TTL, replacing any entry
    /// already stored under that key.
    ///
    /// # Errors
    ///
    /// [`CacheError::Serialization`] if `value` cannot be represented as JSON.
    pub fn set<T>(&self, key: impl Into<String>, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        self.set_with_ttl(key, value, self.shared.default_ttl)
    }

    /// Stores `value` under `key` for `ttl`, replacing any existing entry.
    ///
    /// A zero `ttl` stores an entry that is valid only until the clock moves.
    /// TTLs longer than thirty years are clamped to thirty years.
    ///
    /// # Errors
    ///
    /// [`CacheError::Serialization`] if `value` cannot be represented as JSON.
    pub fn set_with_ttl<T>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value, ttl);
        Ok(())
    }

    /// Stores an already-built JSON value under `key` for `ttl`.
    pub fn set_value(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        trace!(%key, ?ttl, "cache set");
        self.entries().insert(key, CacheEntry::new(value, ttl));
        self.shared.metrics.record_store();
    }

    /// Returns the value stored under `key` if it has not expired.
    ///
    /// A stale entry found here is removed before returning `None`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                let value = entry.value.clone();
                drop(entries);
                self.shared.metrics.record_hit();
                trace!(key, "cache hit");
                return Some(value);
            }
            Some(_) => entries.remove(key).is_some(),
            None => false,
        };
        drop(entries);

        if expired {
            self.shared.metrics.record_evictions(1);
            debug!(key, "evicted expired cache entry on read");
        }
        self.shared.metrics.record_miss();
        trace!(key, "cache miss");
        None
    }

    /// Like [`get`](Self::get), deserializing the stored JSON into `T`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Serialization`] if the stored value does not fit `T`.
    pub fn get_as<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        self.get(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(CacheError::from)
    }

    /// Returns `true` if `key` holds a live entry. Evicts it if stale.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(key);
                drop(entries);
                self.shared.metrics.record_evictions(1);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Removes the entry for `key`. Returns whether anything was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Removes every entry and returns how many there were.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.entries();
            let count = entries.len();
            entries.clear();
            count
        };
        info!(removed, "cache cleared");
        removed
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            before - entries.len()
        };

        if removed > 0 {
            self.shared.metrics.record_evictions(removed);
            info!(removed, "cache cleanup removed expired entries");
        } else {
            debug!("cache cleanup found nothing to remove");
        }
        removed
    }

    /// Removes every entry whose key matches the regular expression `pattern`
    /// and returns how many were removed.
    ///
    /// ```
    /// use storefront::cache::CacheManager;
    ///
    /// let cache = CacheManager::new();
    /// for key in ["/orders?x=1", "/orders/5", "/products"] {
    ///     cache.set(key, &1).unwrap();
    /// }
    /// assert_eq!(cache.invalidate("^/orders").unwrap(), 2);
    /// assert_eq!(cache.keys(), vec!["/products".to_string()]);
    /// ```
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidPattern`] if `pattern` is not a valid regular
    /// expression; nothing is removed in that case.
    pub fn invalidate(&self, pattern: &str) -> Result<usize, CacheError> {
        let regex = Regex::new(pattern).map_err(|source| CacheError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;

        let removed = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|key, _| !regex.is_match(key));
            before - entries.len()
        };

        self.shared.metrics.record_invalidations(removed);
        debug!(pattern, removed, "cache invalidated by pattern");
        Ok(removed)
    }

    /// Fire-and-forget form of [`invalidate`](Self::invalidate) for handlers
    /// whose own operation must succeed regardless: a bad pattern is logged
    /// and counts as zero removals.
    pub fn invalidate_quietly(&self, pattern: &str) -> usize {
        self.invalidate(pattern).unwrap_or_else(|e| {
            warn!(error = %e, "cache invalidation skipped");
            0
        })
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn size(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Splits the stored entries into valid and expired without removing any.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries();
        let expired = entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .count();
        CacheStats {
            total: entries.len(),
            valid: entries.len() - expired,
            expired,
        }
    }

    /// Snapshot of the stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Counters accumulated since this cache was created.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Starts removing expired entries every `interval` on the current Tokio
    /// runtime. Keep the returned handle and call
    /// [`CacheSweeper::shutdown`] during graceful shutdown.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, or if `interval` is zero.
    pub fn start_sweeper(&self, interval: Duration) -> CacheSweeper {
        CacheSweeper::start(self.clone(), interval)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::time::advance;

    use super::*;

    const EPSILON: Duration = Duration::from_millis(1);

    #[tokio::test(start_paused = true)]
    async fn value_visible_until_ttl_then_absent() {
        let cache = CacheManager::new();
        for ttl in [1, 5, 60, 300] {
            let key = format!("k{ttl}");
            let ttl = Duration::from_secs(ttl);
            cache.set_with_ttl(&key, &json!({"ttl": ttl.as_secs()}), ttl).unwrap();
            assert_eq!(cache.get(&key), Some(json!({"ttl": ttl.as_secs()})));

            advance(ttl).await;
            assert!(cache.get(&key).is_some(), "valid at the expiry instant");

            advance(EPSILON).await;
            assert_eq!(cache.get(&key), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_read_evicts_entry() {
        let cache = CacheManager::new();
        cache.set_with_ttl("a", &1, Duration::from_secs(2)).unwrap();
        cache.set_with_ttl("b", &2, Duration::from_secs(60)).unwrap();

        advance(Duration::from_secs(3)).await;
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn contains_also_evicts_stale_entry() {
        let cache = CacheManager::new();
        cache.set_with_ttl("a", &1, Duration::from_secs(1)).unwrap();
        assert!(cache.contains("a"));
        advance(Duration::from_secs(2)).await;
        assert!(!cache.contains("a"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_ttl_never_panics() {
        let cache = CacheManager::with_default_ttl(Duration::from_secs(u64::MAX));
        cache.set("k", &1).unwrap();
        cache.set_with_ttl("max", &2, Duration::MAX).unwrap();

        advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
        assert_eq!(cache.get("k"), Some(json!(1)));
        assert_eq!(cache.get("max"), Some(json!(2)));
    }

    #[test]
    fn overwrite_replaces_value() {
        let cache = CacheManager::new();
        cache.set("k", &"v1").unwrap();
        cache.set("k", &"v2").unwrap();
        assert_eq!(cache.get("k"), Some(json!("v2")));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_resets_expiry() {
        let cache = CacheManager::new();
        cache.set_with_ttl("k", &1, Duration::from_secs(5)).unwrap();
        advance(Duration::from_secs(4)).await;
        cache.set_with_ttl("k", &2, Duration::from_secs(5)).unwrap();
        advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get("k"), Some(json!(2)));
    }

    #[test]
    fn invalidate_removes_only_matching_keys() {
        let cache = CacheManager::new();
        cache.set("/orders?x=1", &1).unwrap();
        cache.set("/orders/5", &2).unwrap();
        cache.set("/products", &3).unwrap();

        assert_eq!(cache.invalidate("^/orders").unwrap(), 2);
        assert_eq!(cache.keys(), vec!["/products".to_string()]);
        assert_eq!(cache.metrics().invalidations, 2);
    }

    #[test]
    fn invalidate_rejects_malformed_pattern() {
        let cache = CacheManager::new();
        cache.set("/orders", &1).unwrap();

        let err = cache.invalidate("^/orders(").unwrap_err();
        assert!(matches!(err, CacheError::InvalidPattern { ref pattern, .. } if pattern == "^/orders("));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.invalidate_quietly("[unclosed"), 0);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_cleanup_removes_nothing() {
        let cache = CacheManager::new();
        cache.set_with_ttl("a", &1, Duration::from_secs(1)).unwrap();
        cache.set_with_ttl("b", &2, Duration::from_secs(1)).unwrap();
        cache.set_with_ttl("c", &3, Duration::from_secs(100)).unwrap();

        advance(Duration::from_secs(2)).await;
        assert_eq!(cache.cleanup(), 2);
        assert_eq!(cache.cleanup(), 0);
        assert_eq!(cache.keys(), vec!["c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_partition_without_mutating() {
        let cache = CacheManager::new();
        cache.set_with_ttl("short", &1, Duration::from_secs(1)).unwrap();
        cache.set_with_ttl("long", &2, Duration::from_secs(100)).unwrap();
        advance(Duration::from_secs(2)).await;

        let stats = cache.stats();
        assert_eq!(
            stats,
            CacheStats {
                total: 2,
                valid: 1,
                expired: 1
            }
        );
        assert_eq!(cache.size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn product_listing_expires_after_five_seconds() {
        let cache = CacheManager::new();
        cache
            .set_with_ttl("/api/products", &json!([{"id": 1}]), Duration::from_secs(5))
            .unwrap();
        assert_eq!(cache.get("/api/products"), Some(json!([{"id": 1}])));

        advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("/api/products"), None);
        assert_eq!(cache.stats().total, 0);
    }

    #[test]
    fn delete_and_clear_report_removals() {
        let cache = CacheManager::new();
        assert!(!cache.delete("missing"));
        cache.set("a", &1).unwrap();
        cache.set("b", &2).unwrap();
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.clear(), 0);
    }

    #[test]
    fn typed_reads() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Plan {
            id: u32,
            name: String,
        }

        let cache = CacheManager::new();
        let plan = Plan {
            id: 3,
            name: "pro".into(),
        };
        cache.set("plan:3", &plan).unwrap();
        assert_eq!(cache.get_as::<Plan>("plan:3").unwrap(), Some(plan));
        assert_eq!(cache.get_as::<Plan>("plan:4").unwrap(), None);
        assert!(matches!(
            cache.get_as::<u64>("plan:3"),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn clones_share_entries() {
        let cache = CacheManager::with_default_ttl(Duration::from_secs(10));
        let other = cache.clone();
        other.set("shared", &true).unwrap();
        assert_eq!(cache.get("shared"), Some(json!(true)));
        assert_eq!(cache.default_ttl(), Duration::from_secs(10));
    }

    #[test]
    fn metrics_track_hits_and_misses() {
        let cache = CacheManager::new();
        cache.set("k", &1).unwrap();
        cache.get("k");
        cache.get("k");
        cache.get("nope");
        let m = cache.metrics();
        assert_eq!((m.hits, m.misses, m.stores), (2, 1, 1));
    }
}
