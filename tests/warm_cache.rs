use std::sync::Arc;

use kettle::cache::{self, CacheConfig, Kettle, KettleError, Recipe};
use kettle::domain::entities::Entity;
use kettle::domain::schema::{EntityDecl, Schema};
use kettle::infra::memory::MemoryGraph;
use serde::Deserialize;
use serde_json::json;
use serial_test::serial;

#[derive(Debug, Deserialize, PartialEq)]
struct Card {
    title: String,
    store: Option<String>,
}

fn graph() -> Arc<MemoryGraph> {
    let graph = Arc::new(MemoryGraph::new(
        Schema::new()
            .with(EntityDecl::new("Category").belongs_to("store", "Store", "store_id")),
    ));
    graph.insert_row(Entity::new("Store", 1_i64).with("name", "north"));
    graph.insert_row(
        Entity::new("Category", 1_i64)
            .with("title", "Green tea")
            .with("store_id", 1),
    );
    graph
}

fn card_recipe(graph: Arc<MemoryGraph>) -> Recipe {
    Recipe::new("card")
        .primary("Category")
        .depends_on(["store"])
        .build(move |identity| {
            let category = graph
                .get(&"Category".into(), &identity.as_str().into())
                .ok_or("category not found")?;
            let store = category
                .reference("store_id")
                .and_then(|id| graph.get(&"Store".into(), &id));
            Ok(json!({
                "title": category.get("title"),
                "store": store.and_then(|store| store.get("name").cloned()),
            }))
        })
}

#[test]
fn drink_as_decodes_typed_values() {
    let graph = graph();
    let kettle = Kettle::with_memory_store(CacheConfig::default(), graph.clone());
    kettle.fill(card_recipe(graph)).expect("fill");

    let card: Card = kettle.drink_as("card", 1_i64).expect("card");
    assert_eq!(
        card,
        Card {
            title: "Green tea".to_string(),
            store: Some("north".to_string()),
        }
    );
}

#[test]
fn missing_primary_surfaces_build_error() {
    let graph = graph();
    let kettle = Kettle::with_memory_store(CacheConfig::default(), graph.clone());
    kettle.fill(card_recipe(graph)).expect("fill");

    let err = kettle.drink("card", 99_i64).expect_err("no category 99");
    match err {
        KettleError::Build { key, message } => {
            assert_eq!(key.to_string(), "card/99");
            assert!(message.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fill_rejects_undeclared_relationship() {
    let graph = graph();
    let kettle = Kettle::with_memory_store(CacheConfig::default(), graph.clone());

    let err = kettle
        .fill(card_recipe(graph).depends_on(["warehouse"]))
        .expect_err("warehouse is not declared");
    assert!(err.is_undeclared_relationship());
    assert!(kettle.registry().is_empty());
}

#[test]
fn keep_warm_then_reset() {
    let graph = graph();
    let kettle = Kettle::with_memory_store(CacheConfig::default(), graph.clone());

    let primed = kettle
        .keep_warm(card_recipe(graph), 1_i64)
        .expect("keep warm");
    assert_eq!(primed["title"], json!("Green tea"));
    assert!(kettle.store().get("card/1").is_some());

    kettle.reset();
    assert!(kettle.store().get("card/1").is_none());
    assert!(matches!(
        kettle.drink("card", 1_i64),
        Err(KettleError::UnknownDefinition { .. })
    ));
}

#[test]
#[serial]
fn process_wide_kettle_installs_once() {
    let graph = graph();
    let first = Kettle::with_memory_store(CacheConfig::default(), graph.clone());
    let second = Kettle::with_memory_store(CacheConfig::default(), graph.clone());

    let installed = cache::install(first).expect("first install");
    installed.fill(card_recipe(graph)).expect("fill");

    let global = cache::global().expect("installed kettle");
    assert!(Arc::ptr_eq(&installed, &global));
    assert!(global.drink("card", 1_i64).is_ok());

    assert!(matches!(
        cache::install(second),
        Err(KettleError::AlreadyInstalled)
    ));
    global.reset();
}

#[test]
fn names_with_key_separator_cannot_alias_entries() {
    let graph = graph();
    let kettle = Kettle::with_memory_store(CacheConfig::default(), graph);
    kettle
        .fill(Recipe::new("a").primary("Category").build(|_| Ok("from a")))
        .expect("fill a");

    let err = kettle
        .fill(Recipe::new("a/b").primary("Category").build(|_| Ok("from a/b")))
        .expect_err("separator in name");
    assert!(matches!(err, KettleError::InvalidDefinition { .. }));
    assert_eq!(kettle.registry().len(), 1);

    assert_eq!(kettle.drink("a", "b/c").expect("drink"), json!("from a"));
    assert!(matches!(
        kettle.drink("a/b", "c"),
        Err(KettleError::UnknownDefinition { .. })
    ));
}
