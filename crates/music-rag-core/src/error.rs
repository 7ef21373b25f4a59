//! Crate Error Type
//!
//! Each layer has its own error enum; `RagError` unifies the ones that can
//! surface from a mandatory stage.

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::embeddings::EmbeddingError;
use crate::store::StoreError;

/// Errors surfaced by indexing and retrieval
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Malformed input, surfaced before any work is done
    #[error("Validation error: {0}")]
    Validation(String),
    /// Text embedding failed
    #[error("Embedding provider error: {0}")]
    Provider(#[from] EmbeddingError),
    /// Vector store failure; fatal for the call
    #[error("Vector store error: {0}")]
    Store(StoreError),
    /// Item catalog failure
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<StoreError> for RagError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BatchLengthMismatch { .. } => RagError::Validation(err.to_string()),
            other => RagError::Store(other),
        }
    }
}

impl RagError {
    /// True for errors caused by the caller's input
    pub fn is_validation(&self) -> bool {
        matches!(self, RagError::Validation(_))
    }
}

/// Result alias for fallible core operations
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_mismatch_is_validation() {
        let err: RagError = StoreError::BatchLengthMismatch {
            field: "text_embeddings",
            expected: 3,
            got: 2,
        }
        .into();
        assert!(err.is_validation());
    }

    #[test]
    fn test_other_store_errors_stay_store() {
        let err: RagError = StoreError::InvalidDimensions {
            expected: 4,
            got: 3,
        }
        .into();
        assert!(matches!(err, RagError::Store(_)));
        assert!(!err.is_validation());
    }
}
