//! Storage error types.

use cyper_core::{Classify, ErrorClass};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// Connection to the storage backend failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The namespace or key is invalid.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl Classify for StorageError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidKey(_) => ErrorClass::Validation,
            Self::Internal(_) | Self::Connection(_) | Self::Serialization(_) => {
                ErrorClass::TransientInfrastructure
            },
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
