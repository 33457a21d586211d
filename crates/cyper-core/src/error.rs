//! Error classification shared across the workspace.
//!
//! Each crate keeps its own error enum. [`Classify`] maps every one of them
//! onto the same small set of classes so callers can decide how to surface a
//! failure without matching on crate-specific variants.

use thiserror::Error;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed input from the caller.
    Validation,
    /// Unknown entry or session identifier.
    NotFound,
    /// Malformed key material or canonical-encoding failure.
    Crypto,
    /// Store or external authority unreachable; retrying may succeed.
    TransientInfrastructure,
    /// A bounded queue is saturated.
    Capacity,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Crypto => write!(f, "crypto"),
            Self::TransientInfrastructure => write!(f, "transient_infrastructure"),
            Self::Capacity => write!(f, "capacity"),
        }
    }
}

/// Implemented by every error type in the workspace.
pub trait Classify {
    /// The class this error belongs to.
    fn class(&self) -> ErrorClass;

    /// Whether the caller supplied bad input (validation or not-found).
    fn is_caller_error(&self) -> bool {
        matches!(self.class(), ErrorClass::Validation | ErrorClass::NotFound)
    }
}

/// Errors raised by core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value failed validation.
    #[error("validation error: {0}")]
    Validation(String),
}

impl Classify for CoreError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
