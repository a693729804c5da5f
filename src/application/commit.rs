//! Commit notifications emitted by persistence layers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::entities::{EntityId, EntityType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Destroyed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durably committed change to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub kind: ChangeKind,
}

impl ChangeNotice {
    pub fn new(
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        kind: ChangeKind,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            kind,
        }
    }
}

/// Capability of receiving post-commit notifications.
///
/// Persistence layers call `on_commit` once per committed create, update or
/// destroy, after the write is durable, and never for rolled-back work.
/// Implementations must not block on the work they schedule.
pub trait CommitListener: Send + Sync {
    fn on_commit(&self, notice: &ChangeNotice);
}
