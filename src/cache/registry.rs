//! Process-wide definition registry.
//!
//! Readers (resolution, `drink`) share the lock; `fill`, `unregister` and
//! `clear` take it exclusively, so a definition is never observed half-built.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::definition::Beverage;
use super::lock::RecoverRwLock;

const SOURCE: &str = "cache::registry";

/// Registered cache definitions keyed by name.
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<String, Arc<Beverage>>>,
}

impl DefinitionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a definition, replacing any previous one with the same name.
    ///
    /// Returns the replaced definition.
    pub fn register(&self, definition: Arc<Beverage>) -> Option<Arc<Beverage>> {
        self.definitions
            .write_recover(SOURCE, "register")
            .insert(definition.name().to_string(), definition)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Beverage>> {
        self.definitions
            .read_recover(SOURCE, "get")
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions
            .read_recover(SOURCE, "contains")
            .contains_key(name)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Beverage>> {
        self.definitions
            .write_recover(SOURCE, "unregister")
            .remove(name)
    }

    /// Consistent view of every definition, taken under a single read guard.
    pub fn snapshot(&self) -> Vec<Arc<Beverage>> {
        self.definitions
            .read_recover(SOURCE, "snapshot")
            .values()
            .cloned()
            .collect()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .read_recover(SOURCE, "names")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Clear all definitions.
    pub fn clear(&self) {
        self.definitions.write_recover(SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        self.definitions.read_recover(SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::cache::definition::Recipe;
    use crate::domain::entities::Identity;
    use crate::domain::schema::{EntityDecl, Schema};

    fn beverage(name: &str, output: i64) -> Arc<Beverage> {
        let schema = Schema::new().with(EntityDecl::new("Category"));
        Arc::new(
            Recipe::new(name)
                .primary("Category")
                .build(move |_| Ok(output))
                .prepare(&schema)
                .expect("valid recipe"),
        )
    }

    #[test]
    fn register_and_lookup() {
        let registry = DefinitionRegistry::new();
        assert!(registry.register(beverage("summary", 1)).is_none());

        let found = registry.get("summary").expect("registered");
        assert_eq!(found.name(), "summary");
        assert!(registry.contains("summary"));
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn re_registration_overwrites() {
        let registry = DefinitionRegistry::new();
        registry.register(beverage("summary", 1));
        let previous = registry.register(beverage("summary", 2));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);

        let current = registry.get("summary").expect("registered");
        let value = current.brew(&Identity::from("1")).expect("build");
        assert_eq!(value, serde_json::json!(2));
    }

    #[test]
    fn snapshot_and_names() {
        let registry = DefinitionRegistry::new();
        registry.register(beverage("b", 1));
        registry.register(beverage("a", 1));

        assert_eq!(registry.snapshot().len(), 2);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unregister_and_clear() {
        let registry = DefinitionRegistry::new();
        registry.register(beverage("a", 1));
        registry.register(beverage("b", 1));

        assert!(registry.unregister("a").is_some());
        assert!(registry.unregister("a").is_none());
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_recovers_from_poisoned_lock() {
        let registry = DefinitionRegistry::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = registry
                .definitions
                .write()
                .expect("definitions lock should be acquired");
            panic!("poison definitions lock");
        }));

        registry.register(beverage("a", 1));
        assert!(registry.contains("a"));
    }
}
