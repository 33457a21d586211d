//! Cyper Crypto - Cryptographic primitives for the audit and session layer.
//!
//! This crate provides:
//! - Ed25519 key pairs with secure memory handling
//! - Signatures over canonical audit records
//! - SHA-256 fingerprints for bearer tokens
//!
//! # Example
//!
//! ```
//! use cyper_crypto::{KeyPair, TokenFingerprint};
//!
//! let keypair = KeyPair::generate();
//!
//! let message = b"canonical record";
//! let signature = keypair.sign(message);
//! assert!(keypair.public_key().verifies(message, &signature)?);
//!
//! let fingerprint = TokenFingerprint::of("bearer-token");
//! assert_eq!(fingerprint.as_str().len(), 64);
//! # Ok::<(), cyper_crypto::CryptoError>(())
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod encoding;
mod error;
mod fingerprint;
mod keypair;
mod signature;

pub use error::{CryptoError, CryptoResult};
pub use fingerprint::TokenFingerprint;
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;
