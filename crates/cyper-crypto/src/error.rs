//! Cryptographic error types.

use cyper_core::{Classify, ErrorClass};
use thiserror::Error;

/// Errors from key handling and signature checks.
///
/// A signature that simply does not match is not an error; see
/// [`PublicKey::verifies`](crate::PublicKey::verifies).
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Decoded value has the wrong size.
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Which value was being decoded.
        what: &'static str,
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Value is not valid base64.
    #[error("{what} is not valid base64")]
    InvalidBase64 {
        /// Which value was being decoded.
        what: &'static str,
    },

    /// Bytes do not form a usable Ed25519 public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The supplied public key does not belong to the supplied private key.
    #[error("public key does not match private key")]
    KeyMismatch,
}

impl Classify for CryptoError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Crypto
    }
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
