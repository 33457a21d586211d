//! Error types for session and pulse handling.

use cyper_core::{Classify, CoreError, ErrorClass, SessionId};
use cyper_storage::StorageError;

/// Errors from the authorization pulse and its stores.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// Invalid input, including an out-of-order or regressing pulse record.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown session id.
    #[error("session not found: {id}")]
    SessionNotFound {
        /// The id that was looked up.
        id: SessionId,
    },

    /// The external authorization authority could not be reached.
    #[error("authorization authority unreachable: {0}")]
    AuthorityUnreachable(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CoreError> for PulseError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
        }
    }
}

impl Classify for PulseError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::SessionNotFound { .. } => ErrorClass::NotFound,
            Self::AuthorityUnreachable(_) => ErrorClass::TransientInfrastructure,
            Self::Storage(e) => e.class(),
        }
    }
}

/// Result type for pulse operations.
pub type PulseResult<T> = Result<T, PulseError>;
