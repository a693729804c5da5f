//! The caller-facing cache facade.
//!
//! `Kettle` owns the definition registry, the store, the event queue and the
//! consumer, and wires them to one entity graph.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::graph::EntityGraph;
use crate::domain::entities::Identity;

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::definition::{Beverage, Recipe};
use super::dispatcher::{RebuildDispatcher, brew, brew_into};
use super::error::KettleError;
use super::events::EventQueue;
use super::keys::CacheKey;
use super::planner::ChangeResolver;
use super::registry::DefinitionRegistry;
use super::store::{CacheStore, MemoryStore};
use super::trigger::CacheTrigger;
use super::worker;

static GLOBAL: OnceCell<Arc<Kettle>> = OnceCell::new();

/// Install the process-wide kettle. Fails if one is already installed.
pub fn install(kettle: Kettle) -> Result<Arc<Kettle>, KettleError> {
    let kettle = Arc::new(kettle);
    GLOBAL
        .set(kettle.clone())
        .map_err(|_| KettleError::AlreadyInstalled)?;
    Ok(kettle)
}

/// The process-wide kettle, if installed.
pub fn global() -> Option<Arc<Kettle>> {
    GLOBAL.get().cloned()
}

pub struct Kettle {
    config: CacheConfig,
    graph: Arc<dyn EntityGraph>,
    registry: Arc<DefinitionRegistry>,
    store: Arc<dyn CacheStore>,
    queue: Arc<EventQueue>,
    wake: Arc<Notify>,
    trigger: Arc<CacheTrigger>,
    consumer: Arc<CacheConsumer>,
}

impl Kettle {
    pub fn new(
        config: CacheConfig,
        graph: Arc<dyn EntityGraph>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let registry = Arc::new(DefinitionRegistry::new());
        let queue = Arc::new(EventQueue::new(config.event_queue_limit_non_zero()));
        let wake = Arc::new(Notify::new());

        let trigger = Arc::new(CacheTrigger::new(
            config.clone(),
            queue.clone(),
            wake.clone(),
        ));
        let consumer = Arc::new(CacheConsumer::new(
            config.clone(),
            ChangeResolver::new(registry.clone(), graph.clone()),
            RebuildDispatcher::new(registry.clone(), store.clone()),
            queue.clone(),
        ));

        Self {
            config,
            graph,
            registry,
            store,
            queue,
            wake,
            trigger,
            consumer,
        }
    }

    /// Kettle backed by a bounded in-process [`MemoryStore`].
    pub fn with_memory_store(config: CacheConfig, graph: Arc<dyn EntityGraph>) -> Self {
        let store = Arc::new(MemoryStore::new(&config));
        Self::new(config, graph, store)
    }

    /// Register a cache definition, replacing any with the same name.
    ///
    /// Existing stored values are left untouched.
    pub fn fill(&self, recipe: Recipe) -> Result<Arc<Beverage>, KettleError> {
        let definition = Arc::new(recipe.prepare(self.graph.schema())?);

        info!(
            definition = definition.name(),
            primary_type = %definition.primary_type(),
            paths = definition.paths().len(),
            "Cache definition filled"
        );

        if self.registry.register(definition.clone()).is_some() {
            debug!(
                definition = definition.name(),
                "Cache definition replaced an earlier registration"
            );
        }

        Ok(definition)
    }

    /// Stored value for `(name, identity)`, building and storing it on a miss.
    pub fn drink(&self, name: &str, identity: impl Into<Identity>) -> Result<Value, KettleError> {
        let definition = self.definition(name)?;
        let key = definition.key(identity);

        if !self.config.enabled {
            return brew(&definition, &key);
        }

        if let Some(value) = self.store.get(&key.storage_key()) {
            return Ok(value);
        }

        debug!(key = %key, "Cache miss; building");
        brew_into(self.store.as_ref(), &definition, &key)
    }

    /// [`Kettle::drink`] decoded into `T`.
    pub fn drink_as<T>(&self, name: &str, identity: impl Into<Identity>) -> Result<T, KettleError>
    where
        T: DeserializeOwned,
    {
        let identity = identity.into();
        let value = self.drink(name, identity.clone())?;
        serde_json::from_value(value).map_err(|source| KettleError::Decode {
            key: CacheKey::new(name, identity),
            source,
        })
    }

    /// `fill` followed by `drink`, priming the entry.
    pub fn keep_warm(
        &self,
        recipe: Recipe,
        identity: impl Into<Identity>,
    ) -> Result<Value, KettleError> {
        let definition = self.fill(recipe)?;
        self.drink(definition.name(), identity)
    }

    /// Remove one stored value. Returns whether an entry was present.
    pub fn evict(&self, name: &str, identity: impl Into<Identity>) -> Result<bool, KettleError> {
        let definition = self.definition(name)?;
        let key = definition.key(identity);
        Ok(self.store.delete(&key.storage_key()))
    }

    /// Drop every registration, stored value and pending event.
    pub fn reset(&self) {
        self.registry.clear();
        self.store.clear();
        self.queue.clear();
        info!("Kettle reset");
    }

    /// Start the background consumer on the current tokio runtime.
    pub fn spawn_worker(&self) -> JoinHandle<()> {
        worker::spawn_worker(
            self.consumer.clone(),
            self.wake.clone(),
            self.config.auto_consume_interval(),
        )
    }

    /// Commit listener to subscribe to the persistence layer.
    pub fn trigger(&self) -> Arc<CacheTrigger> {
        self.trigger.clone()
    }

    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn definition(&self, name: &str) -> Result<Arc<Beverage>, KettleError> {
        self.registry
            .get(name)
            .ok_or_else(|| KettleError::unknown_definition(name))
    }
}
