//! Cache storage.
//!
//! `CacheStore` is the key/value port the facade and the dispatcher write
//! through. `MemoryStore` is the bundled in-process implementation.

use std::sync::RwLock;

use lru::LruCache;
use metrics::counter;
use serde_json::Value;

use super::config::CacheConfig;
use super::lock::RecoverRwLock;

const SOURCE: &str = "cache::store";

const METRIC_STORE_HIT: &str = "kettle_store_hit_total";
const METRIC_STORE_MISS: &str = "kettle_store_miss_total";
const METRIC_STORE_EVICT: &str = "kettle_store_evict_total";

/// Key/value store holding built values.
///
/// `set` must replace a value atomically: a concurrent `get` sees either the
/// previous or the new value.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    /// Returns true if an entry was removed.
    fn delete(&self, key: &str) -> bool;
    fn clear(&self);
}

/// LRU-bounded in-memory store.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, Value>>,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.store_limit_non_zero())),
        }
    }

    /// Get the number of cached values.
    pub fn len(&self) -> usize {
        self.entries.read_recover(SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is cached, without touching recency or metrics.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read_recover(SOURCE, "contains").contains(key)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        // LRU lookups update recency, hence the write guard.
        let value = self
            .entries
            .write_recover(SOURCE, "get")
            .get(key)
            .cloned();

        match value {
            Some(_) => counter!(METRIC_STORE_HIT).increment(1),
            None => counter!(METRIC_STORE_MISS).increment(1),
        }
        value
    }

    fn set(&self, key: &str, value: Value) {
        let displaced = self
            .entries
            .write_recover(SOURCE, "set")
            .push(key.to_string(), value);

        if let Some((displaced_key, _)) = displaced
            && displaced_key != key
        {
            counter!(METRIC_STORE_EVICT).increment(1);
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.entries
            .write_recover(SOURCE, "delete")
            .pop(key)
            .is_some()
    }

    fn clear(&self) {
        self.entries.write_recover(SOURCE, "clear").clear();
    }
}
