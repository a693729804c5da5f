use std::{process, sync::Arc};

use kettle::{
    application::error::AppError,
    cache::{BuildError, CacheConfig, Kettle, Recipe},
    config::{self, DemoArgs},
    domain::{
        entities::{Entity, EntityId, EntityType},
        schema::{EntityDecl, Schema},
    },
    infra::{memory::MemoryGraph, telemetry},
};
use serde_json::{Value, json};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const CARD: &str = "category_card";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?error.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?error.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Demo(DemoArgs::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Demo(args) => run_demo(&settings, args).await,
        config::Command::ShowConfig => {
            println!("{settings:#?}");
            Ok(())
        }
    }
}

fn shop_schema() -> Schema {
    Schema::new()
        .with(EntityDecl::new("Store").has_many("categories", "Category", "store_id"))
        .with(EntityDecl::new("Category").belongs_to("store", "Store", "store_id"))
}

async fn run_demo(settings: &config::Settings, args: DemoArgs) -> Result<(), AppError> {
    let graph = Arc::new(MemoryGraph::new(shop_schema()));
    let kettle = Kettle::with_memory_store(CacheConfig::from(&settings.cache), graph.clone());
    graph.subscribe(kettle.trigger());
    let worker = kettle.spawn_worker();

    graph.create(Entity::new("Store", 1_i64).with("name", "Harbour Street"))?;
    for id in 1..=i64::from(args.categories) {
        graph.create(
            Entity::new("Category", id)
                .with("name", format!("Category {id}"))
                .with("store_id", 1),
        )?;
    }

    let source = graph.clone();
    kettle.fill(
        Recipe::new(CARD)
            .primary("Category")
            .depends_on(["store"])
            .build(move |identity| category_card(&source, &EntityId::new(identity.as_str()))),
    )?;

    for id in 1..=i64::from(args.categories) {
        let card = kettle.drink(CARD, id)?;
        info!(category = id, card = %card, "Served card");
    }

    graph.save(Entity::new("Store", 1_i64).with("name", "Quay Road"))?;
    let report = kettle.consumer().run_until_idle().await;
    info!(
        rebuilt = report.rebuilt.len(),
        failed = report.failed.len(),
        "Store rename settled"
    );

    for id in 1..=i64::from(args.categories) {
        let card = kettle.drink(CARD, id)?;
        info!(category = id, card = %card, "Served card after rename");
    }

    worker.abort();
    let _ = worker.await;

    Ok(())
}

fn category_card(graph: &MemoryGraph, id: &EntityId) -> Result<Value, BuildError> {
    let category = graph
        .get(&EntityType::from("Category"), id)
        .ok_or_else(|| format!("category {id} not found"))?;
    let store = category
        .reference("store_id")
        .and_then(|store_id| graph.get(&EntityType::from("Store"), &store_id));

    Ok(json!({
        "category": category.get("name"),
        "store": store.as_ref().and_then(|store| store.get("name")),
    }))
}
