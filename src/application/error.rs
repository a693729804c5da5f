use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::graph::GraphError, cache::KettleError, config::LoadError,
    domain::error::DomainError, infra::error::InfraError,
};

/// Top-level error for the binary and embedding applications.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Cache(#[from] KettleError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Messages of this error and every source below it, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = StdError::source(self);
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_includes_sources() {
        let error = AppError::from(KettleError::Schema {
            name: "summary".to_string(),
            source: DomainError::EmptyPath,
        });

        let chain = error.chain();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].contains("summary"));
        assert_eq!(chain[1], DomainError::EmptyPath.to_string());
    }
}
