//! Ed25519 signatures over canonical audit records.
//!
//! Stored next to the entry they cover in the same base64 form the key
//! material uses.

use std::fmt;

use crate::encoding::{self, base64_text};
use crate::error::CryptoResult;

/// A detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; Signature::LEN]);

impl Signature {
    /// Size of a signature in bytes.
    pub const LEN: usize = 64;

    /// Raw signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Base64 text form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        encoding::encode(&self.0)
    }

    /// Parse the base64 text form.
    ///
    /// # Errors
    ///
    /// Fails on invalid base64 or a decoded length other than [`Self::LEN`].
    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        encoding::decode_fixed(s, "signature").map(Self)
    }

    pub(crate) fn to_dalek(self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.0)
    }
}

impl From<ed25519_dalek::Signature> for Signature {
    fn from(sig: ed25519_dalek::Signature) -> Self {
        Self(sig.to_bytes())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_base64();
        write!(f, "Signature({}…)", text.get(..12).unwrap_or(&text))
    }
}

base64_text!(Signature);
