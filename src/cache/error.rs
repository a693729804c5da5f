use thiserror::Error;

use crate::domain::error::DomainError;

use super::keys::CacheKey;

#[derive(Debug, Error)]
pub enum KettleError {
    #[error("cache definition `{name}` is not registered")]
    UnknownDefinition { name: String },
    #[error("invalid cache definition `{name}`: {reason}")]
    InvalidDefinition { name: String, reason: String },
    #[error("invalid cache definition `{name}`: {source}")]
    Schema {
        name: String,
        #[source]
        source: DomainError,
    },
    #[error("failed to build `{key}`: {message}")]
    Build { key: CacheKey, message: String },
    #[error("cached value for `{key}` has an unexpected shape: {source}")]
    Decode {
        key: CacheKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("a kettle is already installed for this process")]
    AlreadyInstalled,
}

impl KettleError {
    pub fn unknown_definition(name: impl Into<String>) -> Self {
        Self::UnknownDefinition { name: name.into() }
    }

    pub fn invalid_definition(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn build(key: &CacheKey, message: impl Into<String>) -> Self {
        Self::Build {
            key: key.clone(),
            message: message.into(),
        }
    }

    /// True when registration failed because a path names an undeclared relationship.
    pub fn is_undeclared_relationship(&self) -> bool {
        matches!(
            self,
            Self::Schema {
                source: DomainError::UndeclaredRelationship { .. },
                ..
            }
        )
    }
}
