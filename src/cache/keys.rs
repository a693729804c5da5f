//! Cache key definitions.

use std::fmt;

use crate::domain::entities::Identity;

/// Separates the definition name from the identity in store keys.
///
/// Definition names may not contain it, so the first separator in a store
/// key always ends the name.
pub const KEY_SEPARATOR: char = '/';

/// Address of one cached value: a definition name plus a primary identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub name: String,
    pub identity: Identity,
}

impl CacheKey {
    pub fn new(name: impl Into<String>, identity: impl Into<Identity>) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
        }
    }

    /// String key handed to the `CacheStore`.
    pub fn storage_key(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.name, self.identity)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.name, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_joins_name_and_identity() {
        let key = CacheKey::new("category_summary", 12_i64);
        assert_eq!(key.storage_key(), "category_summary/12");
        assert_eq!(key.to_string(), key.storage_key());
    }

    #[test]
    fn identity_may_contain_the_separator() {
        let key = CacheKey::new("a", "b/c");
        assert_eq!(key.storage_key(), "a/b/c");
        let (name, identity) = key
            .storage_key()
            .split_once(KEY_SEPARATOR)
            .map(|(name, identity)| (name.to_string(), identity.to_string()))
            .expect("separator present");
        assert_eq!(name, "a");
        assert_eq!(identity, "b/c");
    }

    #[test]
    fn keys_with_same_identity_under_different_names_differ() {
        assert_ne!(CacheKey::new("a", "1"), CacheKey::new("b", "1"));
        assert_ne!(
            CacheKey::new("a", "1").storage_key(),
            CacheKey::new("b", "1").storage_key()
        );
    }
}
