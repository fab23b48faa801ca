//! TTL cache for API responses
//!
//! Values are stored as JSON so one cache serves every response type.
//! Entries expire by wall-clock comparison and are removed lazily on the
//! next read. There is no size bound or LRU eviction.

use crate::core::{duration_ms, SharedClock};
use crate::middleware::logger::Logger;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live when callers don't pass one
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheItem {
    value: Value,
    /// Epoch millis
    expiry: u64,
}

enum ReadOutcome<T> {
    Hit(T),
    Expired,
    Missing,
    Undecodable(serde_json::Error),
}

#[derive(Debug, Default)]
struct CacheState {
    items: HashMap<String, CacheItem>,
    hits: u64,
    misses: u64,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Stored entries, including expired ones not yet read
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

pub struct Cache {
    clock: SharedClock,
    logger: Arc<Logger>,
    default_ttl: Duration,
    state: Mutex<CacheState>,
}

impl Cache {
    pub fn new(clock: SharedClock, logger: Arc<Logger>) -> Self {
        Self::with_default_ttl(clock, logger, DEFAULT_TTL)
    }

    pub fn with_default_ttl(clock: SharedClock, logger: Arc<Logger>, default_ttl: Duration) -> Self {
        Self {
            clock,
            logger,
            default_ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    #[inline]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry
    ///
    /// A value that cannot be encoded as JSON is logged and not stored.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                self.logger.error_with(
                    format!("Cache write failed for {}", key),
                    json!({ "key": key, "error": e.to_string() }),
                );
                return;
            }
        };
        self.set_value(key, value, ttl);
    }

    /// `set` with the configured default TTL
    pub fn set_default<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.set(key, value, self.default_ttl);
    }

    /// Store an already encoded value
    pub fn set_value(&self, key: &str, value: Value, ttl: Duration) {
        let expiry = self.clock.now_ms().saturating_add(duration_ms(ttl));
        self.state
            .lock()
            .items
            .insert(key.to_string(), CacheItem { value, expiry });

        self.logger.debug_with(
            format!("Cache set: {}", key),
            json!({ "key": key, "ttl": ttl.as_secs_f64() }),
        );
    }

    /// Live value for `key`, if any
    ///
    /// Counts a hit or a miss. An expired entry is deleted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read(key, |value| Ok(value.clone()))
    }

    /// `get` decoded into `T`
    ///
    /// A stored value that no longer decodes as `T` is logged, removed and
    /// counted as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read(key, |value| T::deserialize(value))
    }

    /// Look up `key` and decode it while the store is locked, so the hit or
    /// miss count and any removal apply to the same entry
    fn read<T>(&self, key: &str, decode: impl FnOnce(&Value) -> serde_json::Result<T>) -> Option<T> {
        let now = self.clock.now_ms();
        let outcome = {
            let mut state = self.state.lock();
            let outcome = match state.items.get(key) {
                Some(item) if now < item.expiry => match decode(&item.value) {
                    Ok(decoded) => ReadOutcome::Hit(decoded),
                    Err(e) => ReadOutcome::Undecodable(e),
                },
                Some(_) => ReadOutcome::Expired,
                None => ReadOutcome::Missing,
            };
            match outcome {
                ReadOutcome::Hit(_) => state.hits += 1,
                ReadOutcome::Expired | ReadOutcome::Undecodable(_) => {
                    state.items.remove(key);
                    state.misses += 1;
                }
                ReadOutcome::Missing => state.misses += 1,
            }
            outcome
        };

        match outcome {
            ReadOutcome::Hit(decoded) => {
                self.logger.debug(format!("Cache hit: {}", key));
                Some(decoded)
            }
            ReadOutcome::Expired => {
                self.logger.debug(format!("Cache expired: {}", key));
                None
            }
            ReadOutcome::Missing => {
                self.logger.debug(format!("Cache miss: {}", key));
                None
            }
            ReadOutcome::Undecodable(e) => {
                self.logger.error_with(
                    format!("Cache read failed for {}", key),
                    json!({ "key": key, "error": e.to_string() }),
                );
                None
            }
        }
    }

    /// Delete every key containing `pattern`, returning how many were removed
    pub fn invalidate(&self, pattern: &str) -> usize {
        let removed = {
            let mut state = self.state.lock();
            let before = state.items.len();
            state.items.retain(|key, _| !key.contains(pattern));
            before - state.items.len()
        };

        self.logger.info_with(
            format!("Cache invalidated {} entries matching '{}'", removed, pattern),
            json!({ "pattern": pattern, "removed": removed }),
        );
        removed
    }

    /// Empty the store and reset counters
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.items.clear();
            state.hits = 0;
            state.misses = 0;
        }
        self.logger.info("Cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        let hit_ratio = if total == 0 {
            0.0
        } else {
            state.hits as f64 / total as f64
        };

        CacheStats {
            size: state.items.len(),
            hits: state.hits,
            misses: state.misses,
            hit_ratio,
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("default_ttl", &self.default_ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use proptest::prelude::*;

    fn cache() -> (Arc<ManualClock>, Cache) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let logger = Arc::new(Logger::new(clock.clone()));
        let cache = Cache::new(clock.clone(), logger);
        (clock, cache)
    }

    #[test]
    fn test_set_then_get() {
        let (_, cache) = cache();
        cache.set("ideas:1", &"Solar kites", Duration::from_secs(5));
        assert_eq!(cache.get("ideas:1"), Some(Value::from("Solar kites")));
    }

    #[test]
    fn test_expiry_removes_entry() {
        let (clock, cache) = cache();
        cache.set("ideas:1", &42, Duration::from_secs(5));
        assert_eq!(cache.stats().size, 1);

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("ideas:1"), None);

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_set_overwrites() {
        let (clock, cache) = cache();
        cache.set("k", &1, Duration::from_secs(1));
        cache.set("k", &2, Duration::from_secs(10));
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get_as::<i32>("k"), Some(2));
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn test_default_ttl() {
        let (clock, cache) = cache();
        cache.set_default("k", &true);
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get_as::<bool>("k"), Some(true));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get_as::<bool>("k"), None);
    }

    #[test]
    fn test_hit_ratio() {
        let (_, cache) = cache();
        assert_eq!(cache.stats().hit_ratio, 0.0);

        cache.set("a", &1, DEFAULT_TTL);
        cache.get("a");
        cache.get("a");
        cache.get("b");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalidate_by_substring() {
        let (_, cache) = cache();
        cache.set("ideas:list", &1, DEFAULT_TTL);
        cache.set("ideas:7", &2, DEFAULT_TTL);
        cache.set("documents:list", &3, DEFAULT_TTL);

        assert_eq!(cache.invalidate("ideas"), 2);
        assert_eq!(cache.stats().size, 1);
        assert!(cache.get("documents:list").is_some());
    }

    #[test]
    fn test_clear_resets_counters() {
        let (_, cache) = cache();
        cache.set("a", &1, DEFAULT_TTL);
        cache.get("a");
        cache.get("missing");
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_ratio, 0.0);
    }

    #[test]
    fn test_undecodable_value_is_a_miss() {
        let (_, cache) = cache();
        cache.set("k", &"not a number", DEFAULT_TTL);
        assert_eq!(cache.get_as::<u32>("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio, 0.0);
    }

    #[test]
    fn test_rewrite_after_undecodable_read_survives() {
        let (_, cache) = cache();
        cache.set("k", &"not a number", DEFAULT_TTL);
        assert_eq!(cache.get_as::<u32>("k"), None);

        cache.set("k", &7u32, DEFAULT_TTL);
        assert_eq!(cache.get_as::<u32>("k"), Some(7));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_operations_are_logged() {
        let clock = Arc::new(ManualClock::new(0));
        let logger = Arc::new(Logger::new(clock.clone()));
        let cache = Cache::new(clock, logger.clone());

        cache.set("k", &1, DEFAULT_TTL);
        cache.get("k");
        cache.invalidate("k");

        let messages: Vec<String> = logger.logs().into_iter().map(|e| e.message).collect();
        assert_eq!(messages[0], "Cache invalidated 1 entries matching 'k'");
        assert_eq!(messages[1], "Cache hit: k");
        assert_eq!(messages[2], "Cache set: k");
    }

    proptest! {
        #[test]
        fn prop_hit_ratio_matches_counts(ops in proptest::collection::vec(0u8..4, 0..64)) {
            let (_, cache) = cache();
            cache.set("present", &1, DEFAULT_TTL);

            let mut hits = 0u64;
            let mut misses = 0u64;
            for op in ops {
                if op == 0 {
                    cache.get("absent");
                    misses += 1;
                } else {
                    cache.get("present");
                    hits += 1;
                }
            }

            let stats = cache.stats();
            prop_assert_eq!(stats.hits, hits);
            prop_assert_eq!(stats.misses, misses);
            if hits + misses == 0 {
                prop_assert_eq!(stats.hit_ratio, 0.0);
            } else {
                prop_assert!((stats.hit_ratio - hits as f64 / (hits + misses) as f64).abs() < 1e-12);
            }
        }
    }
}
