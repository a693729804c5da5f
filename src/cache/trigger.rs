//! Cache trigger service.
//!
//! Receives commit notifications and turns them into queued change events.
//! Resolution and rebuilding happen later on the consumer side, never inline
//! with the write that caused them.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::application::commit::{ChangeNotice, CommitListener};

use super::config::CacheConfig;
use super::events::EventQueue;

/// Cache trigger for publishing change events.
///
/// # Usage
///
/// ```ignore
/// graph.subscribe(kettle.trigger());
/// ```
pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    wake: Arc<Notify>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, wake: Arc<Notify>) -> Self {
        Self {
            config,
            queue,
            wake,
        }
    }

    /// Queue a change event and wake the worker.
    ///
    /// Returns the event id, or `None` when caching is disabled.
    pub fn trigger(&self, notice: ChangeNotice) -> Option<Uuid> {
        if !self.config.enabled {
            debug!(
                entity_type = %notice.entity_type,
                entity_id = %notice.entity_id,
                "Cache trigger skipped: cache disabled"
            );
            return None;
        }

        let id = self.queue.publish(notice);
        self.wake.notify_one();
        Some(id)
    }

    /// Handle the background worker waits on.
    pub fn wake(&self) -> &Arc<Notify> {
        &self.wake
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the underlying event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

impl CommitListener for CacheTrigger {
    fn on_commit(&self, notice: &ChangeNotice) {
        self.trigger(notice.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::commit::ChangeKind;

    fn create_trigger(config: CacheConfig) -> CacheTrigger {
        let queue = Arc::new(EventQueue::new(config.event_queue_limit_non_zero()));
        CacheTrigger::new(config, queue, Arc::new(Notify::new()))
    }

    fn created(id: i64) -> ChangeNotice {
        ChangeNotice::new("Category", id, ChangeKind::Created)
    }

    #[test]
    fn trigger_publishes_event() {
        let trigger = create_trigger(CacheConfig::default());
        assert!(trigger.queue().is_empty());

        assert!(trigger.trigger(created(1)).is_some());
        assert_eq!(trigger.queue().len(), 1);
    }

    #[test]
    fn trigger_respects_disabled_config() {
        let trigger = create_trigger(CacheConfig {
            enabled: false,
            ..Default::default()
        });

        trigger.on_commit(&created(1));
        assert!(trigger.queue().is_empty());
    }

    #[tokio::test]
    async fn trigger_wakes_waiting_worker() {
        let trigger = create_trigger(CacheConfig::default());
        let wake = trigger.wake().clone();

        trigger.on_commit(&created(1));

        tokio::time::timeout(Duration::from_secs(1), wake.notified())
            .await
            .expect("worker should be woken");
    }
}
