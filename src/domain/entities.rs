//! Entity instances as seen by the cache engine.
//!
//! The engine never knows concrete record types. An entity is a type name, a
//! primary key and a bag of JSON attributes; foreign keys and alternate
//! identity fields are read from the attributes by name.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Attribute name that always resolves to the entity's primary key.
pub const ID_FIELD: &str = "id";

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&String> for $name {
            fn from(value: &String) -> Self {
                Self(value.clone())
            }
        }
    };
}

string_newtype!(
    /// Name of an entity type, e.g. `Category`.
    EntityType
);

string_newtype!(
    /// Primary key of a persisted entity, in its textual form.
    EntityId
);

string_newtype!(
    /// Cache identity derived from a primary instance's identity field.
    Identity
);

macro_rules! numeric_conversions {
    ($name:ident: $($num:ty),+) => {
        $(
            impl From<$num> for $name {
                fn from(value: $num) -> Self {
                    Self(value.to_string())
                }
            }
        )+
    };
}

numeric_conversions!(EntityId: i32, i64, u32, u64, usize);
numeric_conversions!(Identity: i32, i64, u32, u64, usize);

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

impl From<Uuid> for Identity {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

impl From<EntityId> for Identity {
    fn from(value: EntityId) -> Self {
        Self(value.0)
    }
}

impl From<&EntityId> for Identity {
    fn from(value: &EntityId) -> Self {
        Self(value.0.clone())
    }
}

/// A persisted entity in its current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub id: EntityId,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(entity_type: impl Into<EntityType>, id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute assignment.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(attribute.into(), value.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Cache identity read from `field`; `id` maps to the primary key.
    ///
    /// Returns `None` when the attribute is absent or not a scalar.
    pub fn identity(&self, field: &str) -> Option<Identity> {
        if field == ID_FIELD {
            return Some(Identity::from(&self.id));
        }
        self.attributes
            .get(field)
            .and_then(scalar_text)
            .map(Identity::new)
    }

    /// Foreign key stored in `field`, if set.
    pub fn reference(&self, field: &str) -> Option<EntityId> {
        if field == ID_FIELD {
            return Some(self.id.clone());
        }
        self.attributes
            .get(field)
            .and_then(scalar_text)
            .map(EntityId::new)
    }

    /// Whether `field` holds a scalar equal to `id`.
    pub fn references(&self, field: &str, id: &EntityId) -> bool {
        self.reference(field).is_some_and(|value| &value == id)
    }
}

/// Textual form of a scalar JSON value, as used in keys and foreign-key comparison.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn identity_defaults_to_primary_key() {
        let entity = Entity::new("Category", 7_i64).with("name", "tea");
        assert_eq!(entity.identity(ID_FIELD), Some(Identity::from("7")));
        assert_eq!(entity.identity("name"), Some(Identity::from("tea")));
    }

    #[test]
    fn identity_ignores_missing_and_structured_values() {
        let entity = Entity::new("Category", 1_i64)
            .with("tags", json!(["a", "b"]))
            .with("meta", json!({ "k": 1 }))
            .with("gone", Value::Null);

        assert!(entity.identity("tags").is_none());
        assert!(entity.identity("meta").is_none());
        assert!(entity.identity("gone").is_none());
        assert!(entity.identity("missing").is_none());
    }

    #[test]
    fn numeric_and_string_foreign_keys_compare_equal() {
        let by_number = Entity::new("Category", 1_i64).with("store_id", 42);
        let by_text = Entity::new("Category", 2_i64).with("store_id", "42");
        let store = EntityId::from(42_i64);

        assert!(by_number.references("store_id", &store));
        assert!(by_text.references("store_id", &store));
        assert!(!by_number.references("owner_id", &store));
    }

    #[test]
    fn blank_names_are_empty() {
        assert!(EntityType::from("  ").is_empty());
        assert!(!EntityType::from("Store").is_empty());
    }
}
