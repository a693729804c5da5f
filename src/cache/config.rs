//! Cache configuration.
//!
//! Controls the bundled store, the change-event queue and the background
//! consumer via the `[cache]` table of `kettle.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_STORE_LIMIT: usize = 10_000;
const DEFAULT_EVENT_QUEUE_LIMIT: usize = 4_096;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, commits are not queued and `drink` builds without storing.
    pub enabled: bool,
    /// Maximum entries held by `MemoryStore` before LRU eviction.
    pub store_limit: usize,
    /// Pending change events before repeat changes to one entity are coalesced.
    pub event_queue_limit: usize,
    /// Maximum events resolved per consumption batch.
    pub consume_batch_limit: usize,
    /// Fallback wake-up interval (ms) for the background worker.
    pub auto_consume_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_limit: DEFAULT_STORE_LIMIT,
            event_queue_limit: DEFAULT_EVENT_QUEUE_LIMIT,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            store_limit: settings.store_limit.get(),
            event_queue_limit: settings.event_queue_limit.get(),
            consume_batch_limit: settings.consume_batch_limit.get(),
            auto_consume_interval_ms: settings.auto_consume_interval.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    /// Store limit as NonZeroUsize, clamping to 1 if zero.
    pub fn store_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.store_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Event queue limit, clamped to at least 1.
    pub fn event_queue_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.event_queue_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Batch limit, clamped to at least 1.
    pub fn consume_batch_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.consume_batch_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn auto_consume_interval(&self) -> Duration {
        Duration::from_millis(self.auto_consume_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.store_limit, 10_000);
        assert_eq!(config.event_queue_limit, 4_096);
        assert_eq!(config.consume_batch_limit, 100);
        assert_eq!(config.auto_consume_interval_ms, 1_000);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            store_limit: 0,
            event_queue_limit: 0,
            consume_batch_limit: 0,
            auto_consume_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.store_limit_non_zero().get(), 1);
        assert_eq!(config.event_queue_limit_non_zero().get(), 1);
        assert_eq!(config.consume_batch_limit_non_zero().get(), 1);
        assert_eq!(config.auto_consume_interval(), Duration::from_millis(1));
    }

    #[test]
    fn deserializes_partial_table() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "store_limit": 12, "enabled": false }"#)
                .expect("valid cache config");
        assert!(!config.enabled);
        assert_eq!(config.store_limit, 12);
        assert_eq!(config.consume_batch_limit, DEFAULT_CONSUME_BATCH_LIMIT);
    }
}
