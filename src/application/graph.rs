//! Persistence adapter trait consumed by the change resolver.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{Entity, EntityId, EntityType};
use crate::domain::schema::{Relation, RelationStep, Schema};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("`{entity_type}` with id `{id}` not found")]
    NotFound { entity_type: EntityType, id: EntityId },
}

impl GraphError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn not_found(entity_type: &EntityType, id: &EntityId) -> Self {
        Self::NotFound {
            entity_type: entity_type.clone(),
            id: id.clone(),
        }
    }
}

/// Queryable object graph backing the cached entities.
///
/// Implementors supply point lookups; backward traversal of declared
/// relations is derived from them unless overridden with a native join.
#[async_trait]
pub trait EntityGraph: Send + Sync {
    /// Relationship declarations used to validate and resolve dependency paths.
    fn schema(&self) -> &Schema;

    /// Current state of one entity, `None` if it does not exist.
    async fn fetch(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
    ) -> Result<Option<Entity>, GraphError>;

    /// All entities of `entity_type` whose `attribute` equals `value`.
    async fn find_by(
        &self,
        entity_type: &EntityType,
        attribute: &str,
        value: &EntityId,
    ) -> Result<Vec<Entity>, GraphError>;

    /// Instances of `step.owner` related through `step.relation` to any of `targets`.
    ///
    /// Missing rows along the way contribute nothing. The result holds each
    /// owner once.
    async fn resolve_backward(
        &self,
        step: &RelationStep,
        targets: &[Entity],
    ) -> Result<Vec<Entity>, GraphError> {
        let mut seen = HashSet::new();
        let mut owners = Vec::new();

        for target in targets {
            let related = match &step.relation {
                Relation::HasMany { foreign_key, .. } | Relation::HasOne { foreign_key, .. } => {
                    match target.reference(foreign_key) {
                        Some(owner_id) => fetch_existing(self, &step.owner, &owner_id)
                            .await?
                            .into_iter()
                            .collect(),
                        None => Vec::new(),
                    }
                }
                Relation::BelongsTo { foreign_key, .. } => {
                    self.find_by(&step.owner, foreign_key, &target.id).await?
                }
                Relation::HasManyThrough {
                    through,
                    owner_key,
                    target_key,
                    ..
                } => {
                    let joins = self.find_by(through, target_key, &target.id).await?;
                    let mut found = Vec::with_capacity(joins.len());
                    for join in joins {
                        if let Some(owner_id) = join.reference(owner_key)
                            && let Some(owner) =
                                fetch_existing(self, &step.owner, &owner_id).await?
                        {
                            found.push(owner);
                        }
                    }
                    found
                }
            };

            for owner in related {
                if seen.insert(owner.id.clone()) {
                    owners.push(owner);
                }
            }
        }

        Ok(owners)
    }
}

/// `fetch` that folds `NotFound` into `None`.
pub async fn fetch_existing<G>(
    graph: &G,
    entity_type: &EntityType,
    id: &EntityId,
) -> Result<Option<Entity>, GraphError>
where
    G: EntityGraph + ?Sized,
{
    match graph.fetch(entity_type, id).await {
        Ok(entity) => Ok(entity),
        Err(GraphError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}
