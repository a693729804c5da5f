//! Declared relationships between entity types.
//!
//! A [`Schema`] lists, per owner type, the named associations a cache
//! definition may walk. Dependency paths are written as association names and
//! resolved here into typed [`Relation`] steps, each of which knows how it is
//! stored and therefore how to be walked backward.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::entities::EntityType;
use super::error::DomainError;

/// One declared association from an owner type to a target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// `target.foreign_key` holds the owner's id.
    HasMany {
        name: String,
        target: EntityType,
        foreign_key: String,
    },
    /// Stored like `HasMany`, at most one target per owner.
    HasOne {
        name: String,
        target: EntityType,
        foreign_key: String,
    },
    /// `owner.foreign_key` holds the target's id.
    BelongsTo {
        name: String,
        target: EntityType,
        foreign_key: String,
    },
    /// Join rows of type `through` carry both `owner_key` and `target_key`.
    HasManyThrough {
        name: String,
        target: EntityType,
        through: EntityType,
        owner_key: String,
        target_key: String,
    },
}

impl Relation {
    pub fn name(&self) -> &str {
        match self {
            Self::HasMany { name, .. }
            | Self::HasOne { name, .. }
            | Self::BelongsTo { name, .. }
            | Self::HasManyThrough { name, .. } => name,
        }
    }

    pub fn target(&self) -> &EntityType {
        match self {
            Self::HasMany { target, .. }
            | Self::HasOne { target, .. }
            | Self::BelongsTo { target, .. }
            | Self::HasManyThrough { target, .. } => target,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::HasMany { .. } => "has_many",
            Self::HasOne { .. } => "has_one",
            Self::BelongsTo { .. } => "belongs_to",
            Self::HasManyThrough { .. } => "has_many_through",
        }
    }
}

/// A relation together with the type that declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationStep {
    pub owner: EntityType,
    pub relation: Relation,
}

/// A resolved chain of relations walked forward from a primary type.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyPath {
    steps: Vec<RelationStep>,
}

impl DependencyPath {
    pub fn steps(&self) -> &[RelationStep] {
        &self.steps
    }

    /// The type whose changes this path reacts to.
    pub fn terminal_type(&self) -> &EntityType {
        // `Schema::resolve_path` rejects empty paths.
        self.steps[self.steps.len() - 1].relation.target()
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for DependencyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            f.write_str(step.relation.name())?;
        }
        Ok(())
    }
}

/// Associations declared by a single owner type.
#[derive(Debug, Clone)]
pub struct EntityDecl {
    entity_type: EntityType,
    relations: BTreeMap<String, Relation>,
}

impl EntityDecl {
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            relations: BTreeMap::new(),
        }
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<EntityType>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.declare(Relation::HasMany {
            name,
            target: target.into(),
            foreign_key: foreign_key.into(),
        })
    }

    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<EntityType>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.declare(Relation::HasOne {
            name,
            target: target.into(),
            foreign_key: foreign_key.into(),
        })
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<EntityType>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.declare(Relation::BelongsTo {
            name,
            target: target.into(),
            foreign_key: foreign_key.into(),
        })
    }

    pub fn has_many_through(
        self,
        name: impl Into<String>,
        target: impl Into<EntityType>,
        through: impl Into<EntityType>,
        owner_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.declare(Relation::HasManyThrough {
            name,
            target: target.into(),
            through: through.into(),
            owner_key: owner_key.into(),
            target_key: target_key.into(),
        })
    }

    fn declare(mut self, relation: Relation) -> Self {
        self.relations.insert(relation.name().to_string(), relation);
        self
    }
}

/// Relationship declarations for every entity type the cache may see.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    declarations: BTreeMap<EntityType, BTreeMap<String, Relation>>,
    known: BTreeSet<EntityType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Schema::declare`].
    pub fn with(mut self, decl: EntityDecl) -> Self {
        self.declare(decl);
        self
    }

    /// Add or extend the associations of one owner type.
    pub fn declare(&mut self, decl: EntityDecl) {
        let EntityDecl {
            entity_type,
            relations,
        } = decl;

        self.known.insert(entity_type.clone());
        for relation in relations.values() {
            self.known.insert(relation.target().clone());
            if let Relation::HasManyThrough { through, .. } = relation {
                self.known.insert(through.clone());
            }
        }

        self.declarations
            .entry(entity_type)
            .or_default()
            .extend(relations);
    }

    /// Whether the type is declared or referenced by any association.
    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.known.contains(entity_type)
    }

    pub fn relation(&self, owner: &EntityType, name: &str) -> Option<&Relation> {
        self.declarations
            .get(owner)
            .and_then(|relations| relations.get(name))
    }

    pub fn relations(&self, owner: &EntityType) -> impl Iterator<Item = &Relation> {
        self.declarations
            .get(owner)
            .into_iter()
            .flat_map(|relations| relations.values())
    }

    /// Resolve association names, walked forward from `primary`, into a path.
    pub fn resolve_path<S: AsRef<str>>(
        &self,
        primary: &EntityType,
        names: &[S],
    ) -> Result<DependencyPath, DomainError> {
        if names.is_empty() {
            return Err(DomainError::EmptyPath);
        }

        let mut owner = primary.clone();
        let mut steps = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let relation = self
                .relation(&owner, name)
                .ok_or_else(|| DomainError::undeclared_relationship(&owner, name))?
                .clone();
            let next = relation.target().clone();
            steps.push(RelationStep { owner, relation });
            owner = next;
        }

        Ok(DependencyPath { steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop_schema() -> Schema {
        Schema::new()
            .with(
                EntityDecl::new("Category")
                    .belongs_to("store", "Store", "store_id")
                    .has_many("products", "Product", "category_id")
                    .has_many_through("tags", "Tag", "Tagging", "category_id", "tag_id"),
            )
            .with(EntityDecl::new("Product").has_many("variants", "Variant", "product_id"))
    }

    #[test]
    fn resolves_direct_path() {
        let schema = shop_schema();
        let path = schema
            .resolve_path(&EntityType::from("Category"), &["store"])
            .expect("declared relation");

        assert_eq!(path.depth(), 1);
        assert_eq!(path.terminal_type(), &EntityType::from("Store"));
        assert_eq!(path.steps()[0].owner, EntityType::from("Category"));
        assert_eq!(path.steps()[0].relation.kind(), "belongs_to");
        assert_eq!(path.to_string(), "store");
    }

    #[test]
    fn resolves_nested_path_hop_by_hop() {
        let schema = shop_schema();
        let path = schema
            .resolve_path(&EntityType::from("Category"), &["products", "variants"])
            .expect("declared nested relation");

        assert_eq!(path.depth(), 2);
        assert_eq!(path.steps()[1].owner, EntityType::from("Product"));
        assert_eq!(path.terminal_type(), &EntityType::from("Variant"));
        assert_eq!(path.to_string(), "products.variants");
    }

    #[test]
    fn rejects_relation_declared_on_another_type() {
        let schema = shop_schema();
        let err = schema
            .resolve_path(&EntityType::from("Category"), &["variants"])
            .expect_err("variants belong to Product");

        assert_eq!(
            err,
            DomainError::undeclared_relationship(&EntityType::from("Category"), "variants")
        );
    }

    #[test]
    fn rejects_empty_path() {
        let schema = shop_schema();
        let names: [&str; 0] = [];
        let err = schema
            .resolve_path(&EntityType::from("Category"), &names)
            .expect_err("empty path");
        assert_eq!(err, DomainError::EmptyPath);
    }

    #[test]
    fn referenced_types_are_known() {
        let schema = shop_schema();
        for name in ["Category", "Store", "Product", "Variant", "Tag", "Tagging"] {
            assert!(schema.contains(&EntityType::from(name)), "{name}");
        }
        assert!(!schema.contains(&EntityType::from("Invoice")));
    }

    #[test]
    fn declaring_twice_extends_relations() {
        let schema = Schema::new()
            .with(EntityDecl::new("Store").has_many("categories", "Category", "store_id"))
            .with(EntityDecl::new("Store").has_one("owner", "User", "store_id"));

        let names: Vec<_> = schema
            .relations(&EntityType::from("Store"))
            .map(Relation::name)
            .collect();
        assert_eq!(names, vec!["categories", "owner"]);
    }
}
