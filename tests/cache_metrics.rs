use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use kettle::application::commit::{ChangeKind, ChangeNotice};
use kettle::cache::{CacheConfig, CacheStore, EventQueue, Kettle, MemoryStore, Recipe};
use kettle::domain::entities::Entity;
use kettle::domain::schema::{EntityDecl, Schema};
use kettle::infra::memory::MemoryGraph;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Store hit/miss/evict
    let store = MemoryStore::new(&CacheConfig {
        store_limit: 1,
        ..Default::default()
    });
    assert!(store.get("a/1").is_none());
    store.set("a/1", json!(1));
    assert!(store.get("a/1").is_some());
    store.set("a/2", json!(2));

    // Event queue length + coalesce metrics
    let queue = EventQueue::new(NonZeroUsize::MIN);
    queue.publish(ChangeNotice::new("Category", 1_i64, ChangeKind::Updated));
    queue.publish(ChangeNotice::new("Category", 1_i64, ChangeKind::Updated));
    let _ = queue.drain(1);

    // Consumer latency + rebuild outcomes
    let graph = Arc::new(MemoryGraph::new(
        Schema::new().with(EntityDecl::new("Category")),
    ));
    let kettle = Kettle::with_memory_store(CacheConfig::default(), graph.clone());
    graph.subscribe(kettle.trigger());
    kettle
        .fill(Recipe::new("card").primary("Category").build(|_| Ok(1)))
        .expect("fill");
    graph
        .create(Entity::new("Category", 1_i64))
        .expect("create category");
    let report = kettle.consumer().run_until_idle().await;
    assert_eq!(report.rebuilt.len(), 1);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "kettle_store_hit_total",
        "kettle_store_miss_total",
        "kettle_store_evict_total",
        "kettle_event_queue_len",
        "kettle_event_coalesced_total",
        "kettle_rebuild_total",
        "kettle_consume_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
