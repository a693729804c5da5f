//! Cache definitions.
//!
//! A [`Recipe`] is the caller-facing declaration of one cache family. `fill`
//! validates it against the graph's schema and turns it into an immutable
//! [`Beverage`] that the registry, resolver and dispatcher share.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::domain::entities::{Entity, EntityType, ID_FIELD, Identity};
use crate::domain::error::DomainError;
use crate::domain::schema::{DependencyPath, Schema};

use super::error::KettleError;
use super::keys::{CacheKey, KEY_SEPARATOR};

/// Error returned by a build function.
pub type BuildError = Box<dyn std::error::Error + Send + Sync>;

/// Computes the cached value for one identity.
pub type BuildFn = Arc<dyn Fn(&Identity) -> Result<Value, BuildError> + Send + Sync>;

/// Decides whether a primary instance participates in caching.
pub type Filter = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

/// Declaration of a cache family, validated by `Kettle::fill`.
#[derive(Clone)]
pub struct Recipe {
    name: String,
    primary_type: Option<EntityType>,
    identity_field: Option<String>,
    filter: Option<Filter>,
    dependencies: Vec<Vec<String>>,
    build: Option<BuildFn>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_type: None,
            identity_field: None,
            filter: None,
            dependencies: Vec::new(),
            build: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity type this cache is about.
    pub fn primary(mut self, entity_type: impl Into<EntityType>) -> Self {
        self.primary_type = Some(entity_type.into());
        self
    }

    /// Attribute the cache identity is read from. Defaults to `id`.
    pub fn identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = Some(field.into());
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Entity) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Declare a dependency path as association names walked from the primary type.
    ///
    /// `["store"]` is a direct path; `["products", "variants"]` reacts to
    /// changes of variants of the primary's products.
    pub fn depends_on<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .push(path.into_iter().map(Into::into).collect());
        self
    }

    /// Build function; any serializable output is stored as JSON.
    pub fn build<F, T>(mut self, build: F) -> Self
    where
        F: Fn(&Identity) -> Result<T, BuildError> + Send + Sync + 'static,
        T: Serialize,
    {
        self.build = Some(Arc::new(move |identity: &Identity| {
            let value = build(identity)?;
            serde_json::to_value(value).map_err(BuildError::from)
        }));
        self
    }

    /// Replace only the build function, keeping the rest of the declaration.
    pub fn with_build_fn(mut self, build: BuildFn) -> Self {
        self.build = Some(build);
        self
    }

    /// Validate against `schema` and freeze into a definition.
    pub fn prepare(self, schema: &Schema) -> Result<Beverage, KettleError> {
        let Self {
            name,
            primary_type,
            identity_field,
            filter,
            dependencies,
            build,
        } = self;

        if name.trim().is_empty() {
            return Err(KettleError::invalid_definition(
                name,
                "name must not be blank",
            ));
        }

        if name.contains(KEY_SEPARATOR) {
            return Err(KettleError::invalid_definition(
                name,
                format!("name must not contain `{KEY_SEPARATOR}`"),
            ));
        }

        let primary_type = match primary_type {
            Some(primary_type) if !primary_type.is_empty() => primary_type,
            _ => {
                return Err(KettleError::invalid_definition(
                    name,
                    "primary entity type is required",
                ));
            }
        };

        let Some(build) = build else {
            return Err(KettleError::invalid_definition(
                name,
                "build function is required",
            ));
        };

        let identity_field = identity_field.unwrap_or_else(|| ID_FIELD.to_string());
        if identity_field.trim().is_empty() {
            return Err(KettleError::invalid_definition(
                name,
                "identity field must not be blank",
            ));
        }

        if !schema.contains(&primary_type) {
            return Err(KettleError::Schema {
                name,
                source: DomainError::unknown_entity_type(&primary_type),
            });
        }

        let mut paths = Vec::with_capacity(dependencies.len());
        for names in &dependencies {
            match schema.resolve_path(&primary_type, names) {
                Ok(path) => paths.push(path),
                Err(source) => return Err(KettleError::Schema { name, source }),
            }
        }

        Ok(Beverage {
            name,
            primary_type,
            identity_field,
            filter,
            paths,
            build,
        })
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("primary_type", &self.primary_type)
            .field("identity_field", &self.identity_field)
            .field("filter", &self.filter.is_some())
            .field("dependencies", &self.dependencies)
            .field("build", &self.build.is_some())
            .finish()
    }
}

/// A registered cache family.
pub struct Beverage {
    name: String,
    primary_type: EntityType,
    identity_field: String,
    filter: Option<Filter>,
    paths: Vec<DependencyPath>,
    build: BuildFn,
}

impl Beverage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_type(&self) -> &EntityType {
        &self.primary_type
    }

    pub fn identity_field(&self) -> &str {
        &self.identity_field
    }

    pub fn paths(&self) -> &[DependencyPath] {
        &self.paths
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Filter verdict for `instance`; no filter admits everything.
    pub fn admits(&self, instance: &Entity) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(instance))
    }

    /// Cache key for a primary instance, if its identity field is readable.
    pub fn key_for(&self, instance: &Entity) -> Option<CacheKey> {
        instance
            .identity(&self.identity_field)
            .map(|identity| CacheKey::new(self.name.clone(), identity))
    }

    pub fn key(&self, identity: impl Into<Identity>) -> CacheKey {
        CacheKey::new(self.name.clone(), identity)
    }

    /// Run the build function.
    pub fn brew(&self, identity: &Identity) -> Result<Value, BuildError> {
        (self.build)(identity)
    }
}

impl fmt::Debug for Beverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<String> = self.paths.iter().map(ToString::to_string).collect();
        f.debug_struct("Beverage")
            .field("name", &self.name)
            .field("primary_type", &self.primary_type)
            .field("identity_field", &self.identity_field)
            .field("filter", &self.filter.is_some())
            .field("paths", &paths)
            .finish_non_exhaustive()
    }
}
