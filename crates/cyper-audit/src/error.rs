//! Audit-related error types.

use cyper_core::{Classify, ErrorClass};
use thiserror::Error;

use crate::entry::AuditEntryId;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Malformed write or query input.
    #[error("invalid audit input: {0}")]
    Validation(String),

    /// Entry not found.
    #[error("audit entry not found: {id}")]
    EntryNotFound {
        /// The entry ID that was not found.
        id: AuditEntryId,
    },

    /// The id counter pointed at an entry that already exists.
    #[error("audit entry {id} already exists; refusing to overwrite")]
    IdConflict {
        /// The id that is already taken.
        id: AuditEntryId,
    },

    /// The signable projection could not be encoded.
    #[error("canonical encoding failed: {0}")]
    Encoding(String),

    /// Signing key material is missing or inconsistent.
    #[error("signing key material: {0}")]
    KeyMaterial(String),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] cyper_crypto::CryptoError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] cyper_storage::StorageError),
}

impl Classify for AuditError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::EntryNotFound { .. } => ErrorClass::NotFound,
            Self::Encoding(_) | Self::KeyMaterial(_) | Self::Crypto(_) => ErrorClass::Crypto,
            Self::IdConflict { .. } => ErrorClass::TransientInfrastructure,
            Self::Storage(e) => e.class(),
        }
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
