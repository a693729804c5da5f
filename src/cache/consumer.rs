//! Cache consumer for executing rebuild plans.
//!
//! Drains change events from the queue, resolves them to cache keys and
//! rebuilds those keys through the dispatcher.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::config::CacheConfig;
use super::dispatcher::{DispatchReport, RebuildDispatcher};
use super::events::EventQueue;
use super::planner::ChangeResolver;

const METRIC_CONSUME_MS: &str = "kettle_consume_ms";

/// Cache consumer that keeps stored values consistent with committed state.
///
/// The consumer:
/// 1. Drains a batch of events from the queue
/// 2. Resolves the batch into a deduplicated rebuild plan
/// 3. Dispatches the plan, one build per key, on the blocking pool
pub struct CacheConsumer {
    config: CacheConfig,
    resolver: ChangeResolver,
    dispatcher: RebuildDispatcher,
    queue: Arc<EventQueue>,
}

impl CacheConsumer {
    pub fn new(
        config: CacheConfig,
        resolver: ChangeResolver,
        dispatcher: RebuildDispatcher,
        queue: Arc<EventQueue>,
    ) -> Self {
        Self {
            config,
            resolver,
            dispatcher,
            queue,
        }
    }

    /// Consume one batch of pending events.
    ///
    /// Returns `None` if the queue was empty.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> Option<DispatchReport> {
        let consume_started_at = Instant::now();
        let events = self
            .queue
            .drain(self.config.consume_batch_limit_non_zero().get());
        if events.is_empty() {
            return None;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = self.resolver.resolve_batch(&events).await;

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        // Build functions are synchronous and may be slow.
        let dispatcher = self.dispatcher.clone();
        let report = match tokio::task::spawn_blocking(move || dispatcher.dispatch(&plan)).await
        {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    event_count,
                    error = %err,
                    "Rebuild dispatch task failed; requeueing events"
                );
                for event in events {
                    self.queue.push(event);
                }
                return Some(DispatchReport::default());
            }
        };

        info!(
            event_count,
            rebuilt = report.rebuilt.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Cache consumption complete"
        );

        histogram!(METRIC_CONSUME_MS).record(consume_started_at.elapsed().as_secs_f64() * 1000.0);

        Some(report)
    }

    /// Consume batches until the queue is empty, merging the reports.
    #[instrument(skip(self))]
    pub async fn run_until_idle(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        while let Some(batch) = self.consume().await {
            report.merge(batch);
        }
        report
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get reference to the event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn resolver(&self) -> &ChangeResolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::commit::{ChangeKind, ChangeNotice};
    use crate::cache::definition::Recipe;
    use crate::cache::registry::DefinitionRegistry;
    use crate::cache::store::{CacheStore, MemoryStore};
    use crate::domain::entities::Entity;
    use crate::domain::schema::{EntityDecl, Schema};
    use crate::infra::memory::MemoryGraph;

    struct Fixture {
        consumer: CacheConsumer,
        store: Arc<MemoryStore>,
        queue: Arc<EventQueue>,
    }

    fn create_consumer(config: CacheConfig) -> Fixture {
        let schema = Schema::new().with(EntityDecl::new("Category"));
        let graph = Arc::new(MemoryGraph::new(schema.clone()));
        for id in 1..=5_i64 {
            graph.insert_row(Entity::new("Category", id));
        }

        let registry = Arc::new(DefinitionRegistry::new());
        registry.register(Arc::new(
            Recipe::new("label")
                .primary("Category")
                .build(|identity| Ok(format!("category {identity}")))
                .prepare(&schema)
                .expect("valid recipe"),
        ));

        let store = Arc::new(MemoryStore::new(&config));
        let queue = Arc::new(EventQueue::new(config.event_queue_limit_non_zero()));
        let consumer = CacheConsumer::new(
            config,
            ChangeResolver::new(registry.clone(), graph),
            RebuildDispatcher::new(registry, store.clone()),
            queue.clone(),
        );

        Fixture {
            consumer,
            store,
            queue,
        }
    }

    fn updated(id: i64) -> ChangeNotice {
        ChangeNotice::new("Category", id, ChangeKind::Updated)
    }

    #[tokio::test]
    async fn consume_empty_queue_returns_none() {
        let fixture = create_consumer(CacheConfig::default());
        assert!(fixture.consumer.consume().await.is_none());
    }

    #[tokio::test]
    async fn consume_rebuilds_affected_keys() {
        let fixture = create_consumer(CacheConfig::default());

        fixture.queue.publish(updated(1));
        fixture.queue.publish(updated(1));
        fixture.queue.publish(updated(2));

        let report = fixture.consumer.consume().await.expect("events consumed");
        assert_eq!(report.rebuilt.len(), 2);
        assert!(fixture.queue.is_empty());
        assert_eq!(fixture.store.get("label/1"), Some(json!("category 1")));
    }

    #[tokio::test]
    async fn builds_run_off_the_async_executor() {
        let schema = Schema::new().with(EntityDecl::new("Category"));
        let graph = Arc::new(MemoryGraph::new(schema.clone()));
        graph.insert_row(Entity::new("Category", 1_i64));

        let registry = Arc::new(DefinitionRegistry::new());
        registry.register(Arc::new(
            Recipe::new("blocking")
                .primary("Category")
                .build(|_| {
                    // Panics if called from an async worker thread.
                    tokio::runtime::Handle::current().block_on(async { Ok(1) })
                })
                .prepare(&schema)
                .expect("valid recipe"),
        ));

        let config = CacheConfig::default();
        let store = Arc::new(MemoryStore::new(&config));
        let queue = Arc::new(EventQueue::new(config.event_queue_limit_non_zero()));
        let consumer = CacheConsumer::new(
            config,
            ChangeResolver::new(registry.clone(), graph),
            RebuildDispatcher::new(registry, store.clone()),
            queue.clone(),
        );

        queue.publish(updated(1));
        let report = consumer.consume().await.expect("events consumed");
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert_eq!(store.get("blocking/1"), Some(json!(1)));
    }

    #[tokio::test]
    async fn consume_respects_batch_limit() {
        let config = CacheConfig {
            consume_batch_limit: 2,
            ..Default::default()
        };
        let fixture = create_consumer(config);

        for id in 1..=5 {
            fixture.queue.publish(updated(id));
        }

        assert_eq!(fixture.queue.len(), 5);
        fixture.consumer.consume().await;
        assert_eq!(fixture.queue.len(), 3);

        let report = fixture.consumer.run_until_idle().await;
        assert_eq!(report.rebuilt.len(), 3);
        assert!(fixture.queue.is_empty());
    }
}
