//! Error types for the policy knowledge base.
//!
//! A single error enum covers configuration, storage, embedding and
//! knowledge-base invariant failures.

use thiserror::Error;

/// Unified error type for the policy knowledge base.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors are represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document store could not be opened, read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// The embedding provider did not produce a vector
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Knowledge base invariant violations
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// True when the error came from the embedding seam.
    pub fn is_embedding_failure(&self) -> bool {
        matches!(self, AppError::Embedding(_))
    }

    /// True when the error came from the persistent store.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, AppError::Storage(_) | AppError::Io(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
