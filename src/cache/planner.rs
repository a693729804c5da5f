//! Change resolution.
//!
//! Turns committed change events into the set of cache keys to rebuild by
//! matching the changed type against every definition's primary type and
//! the terminal type of every declared dependency path, then walking those
//! paths backward to primary instances.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::application::graph::{EntityGraph, GraphError, fetch_existing};
use crate::domain::entities::{Entity, EntityId, EntityType};
use crate::domain::schema::DependencyPath;

use super::definition::Beverage;
use super::events::ChangeEvent;
use super::keys::CacheKey;
use super::registry::DefinitionRegistry;

/// Deduplicated cache keys to rebuild, in key order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    keys: BTreeSet<CacheKey>,
}

impl RebuildPlan {
    /// Returns false if the key was already planned.
    pub fn insert(&mut self, key: CacheKey) -> bool {
        self.keys.insert(key)
    }

    pub fn merge(&mut self, other: RebuildPlan) {
        self.keys.extend(other.keys);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys planned under one definition name.
    pub fn keys_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CacheKey> + 'a {
        self.keys.iter().filter(move |key| key.name == name)
    }
}

impl fmt::Display for RebuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.keys.iter().map(|key| key.name.as_str()).collect();
        names.dedup();
        write!(
            f,
            "RebuildPlan {{ keys: {}, definitions: {} }}",
            self.keys.len(),
            names.len()
        )
    }
}

impl IntoIterator for RebuildPlan {
    type Item = CacheKey;
    type IntoIter = std::collections::btree_set::IntoIter<CacheKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

impl FromIterator<CacheKey> for RebuildPlan {
    fn from_iter<I: IntoIterator<Item = CacheKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Resolves change events against the registered definitions.
pub struct ChangeResolver {
    registry: Arc<DefinitionRegistry>,
    graph: Arc<dyn EntityGraph>,
}

impl ChangeResolver {
    pub fn new(registry: Arc<DefinitionRegistry>, graph: Arc<dyn EntityGraph>) -> Self {
        Self { registry, graph }
    }

    pub async fn resolve(&self, event: &ChangeEvent) -> RebuildPlan {
        self.resolve_change(&event.entity_type, &event.entity_id)
            .await
    }

    /// Resolve a batch, skipping redelivered events with an already-seen id.
    pub async fn resolve_batch(&self, events: &[ChangeEvent]) -> RebuildPlan {
        let mut seen = HashSet::new();
        let mut plan = RebuildPlan::default();
        for event in events {
            if !seen.insert(event.id) {
                debug!(event_id = %event.id, "Skipping duplicate change event");
                continue;
            }
            plan.merge(self.resolve(event).await);
        }
        plan
    }

    /// Keys affected by a change to `(entity_type, entity_id)`.
    ///
    /// The entity is re-read in its committed state. A destroyed entity
    /// contributes nothing: its own entry is left in place and there is no
    /// state to walk backward from.
    pub async fn resolve_change(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> RebuildPlan {
        let mut plan = RebuildPlan::default();

        let changed = match fetch_existing(self.graph.as_ref(), entity_type, entity_id).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                debug!(%entity_type, %entity_id, "Changed entity no longer exists");
                return plan;
            }
            Err(err) => {
                warn!(%entity_type, %entity_id, error = %err, "Failed to load changed entity");
                return plan;
            }
        };

        for definition in self.registry.snapshot() {
            if definition.primary_type() == entity_type {
                emit(&definition, &changed, &mut plan);
            }

            for path in definition.paths() {
                if path.terminal_type() != entity_type {
                    continue;
                }

                match self.walk_backward(path, &changed).await {
                    Ok(primaries) => {
                        for primary in &primaries {
                            emit(&definition, primary, &mut plan);
                        }
                    }
                    Err(err) => warn!(
                        definition = definition.name(),
                        path = %path,
                        %entity_type,
                        %entity_id,
                        error = %err,
                        "Dependency path walk failed"
                    ),
                }
            }
        }

        plan
    }

    /// Walk `path` from its terminal instance back to primary instances.
    async fn walk_backward(
        &self,
        path: &DependencyPath,
        changed: &Entity,
    ) -> Result<Vec<Entity>, GraphError> {
        let mut frontier = vec![changed.clone()];
        for step in path.steps().iter().rev() {
            if frontier.is_empty() {
                break;
            }
            frontier = self.graph.resolve_backward(step, &frontier).await?;
        }
        Ok(frontier)
    }
}

fn emit(definition: &Beverage, primary: &Entity, plan: &mut RebuildPlan) {
    if !definition.admits(primary) {
        debug!(
            definition = definition.name(),
            entity_id = %primary.id,
            "Primary instance rejected by filter"
        );
        return;
    }

    match definition.key_for(primary) {
        Some(key) => {
            plan.insert(key);
        }
        None => debug!(
            definition = definition.name(),
            entity_id = %primary.id,
            identity_field = definition.identity_field(),
            "Primary instance has no identity value"
        ),
    }
}
