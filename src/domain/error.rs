use thiserror::Error;

use super::entities::EntityType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("entity type `{entity_type}` is not declared in the schema")]
    UnknownEntityType { entity_type: EntityType },
    #[error("`{entity_type}` declares no relationship named `{relation}`")]
    UndeclaredRelationship {
        entity_type: EntityType,
        relation: String,
    },
    #[error("dependency path must name at least one relationship")]
    EmptyPath,
}

impl DomainError {
    pub fn unknown_entity_type(entity_type: &EntityType) -> Self {
        Self::UnknownEntityType {
            entity_type: entity_type.clone(),
        }
    }

    pub fn undeclared_relationship(entity_type: &EntityType, relation: impl Into<String>) -> Self {
        Self::UndeclaredRelationship {
            entity_type: entity_type.clone(),
            relation: relation.into(),
        }
    }
}
