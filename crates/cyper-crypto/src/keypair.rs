//! Ed25519 key pairs with secure memory handling.
//!
//! The audit signer holds exactly one [`KeyPair`] for the lifetime of the
//! process. Key material is supplied externally as base64, either as the
//! 32-byte seed or as the 64-byte seed-plus-public-key layout.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::encoding::{self, base64_text};
use crate::error::{CryptoError, CryptoResult};
use crate::signature::Signature;

const SEED_LEN: usize = ed25519_dalek::SECRET_KEY_LENGTH;
const EXPANDED_LEN: usize = ed25519_dalek::KEYPAIR_LENGTH;

/// The process signing key. The secret half is zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build from raw secret bytes.
    ///
    /// Accepts the 32-byte seed, or the 64-byte layout whose second half is
    /// the public key; that half must match the key derived from the seed.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidLength`] for any other length and
    /// [`CryptoError::KeyMismatch`] if the embedded public key is wrong.
    pub fn from_secret(bytes: &[u8]) -> CryptoResult<Self> {
        let (seed, embedded_public) = match bytes.len() {
            SEED_LEN => (bytes, None),
            EXPANDED_LEN => {
                let (seed, public) = bytes.split_at(SEED_LEN);
                (seed, Some(public))
            },
            actual => {
                return Err(CryptoError::InvalidLength {
                    what: "private key",
                    expected: SEED_LEN,
                    actual,
                });
            },
        };

        let seed = Zeroizing::new(<[u8; SEED_LEN]>::try_from(seed).map_err(|_| {
            CryptoError::InvalidLength {
                what: "private key",
                expected: SEED_LEN,
                actual: seed.len(),
            }
        })?);
        let keypair = Self {
            signing_key: SigningKey::from_bytes(&seed),
        };

        match embedded_public {
            Some(public) if public != keypair.public_key().as_bytes() => {
                Err(CryptoError::KeyMismatch)
            },
            _ => Ok(keypair),
        }
    }

    /// Load from the two externally held base64 values.
    ///
    /// # Errors
    ///
    /// Fails if either value is not valid base64, has the wrong length, or
    /// the public key does not belong to the private key.
    pub fn from_base64(private_b64: &str, public_b64: &str) -> CryptoResult<Self> {
        let keypair = Self::from_secret(&encoding::decode(private_b64, "private key")?)?;
        if PublicKey::from_base64(public_b64)? != keypair.public_key() {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(keypair)
    }

    /// Public half.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Short hex identifier of the public key, for logs.
    #[must_use]
    pub fn key_id(&self) -> String {
        self.public_key().key_id()
    }

    /// Sign `message`. Ed25519 is deterministic: equal input, equal output.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from(self.signing_key.sign(message))
    }

    /// The 32-byte seed as base64, for handing to an external secret store.
    #[must_use]
    pub fn secret_base64(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(self.signing_key.to_bytes());
        Zeroizing::new(encoding::encode(seed.as_slice()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

/// Public verification key, stored alongside every signature it made.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PublicKey::LEN]);

impl PublicKey {
    /// Size of a public key in bytes.
    pub const LEN: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// First eight bytes as hex.
    #[must_use]
    pub fn key_id(&self) -> String {
        hex::encode(&self.0[..8])
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
        encoding::decode_fixed(s, "public key").map(Self)
    }

    /// Whether `signature` was made over `message` by this key's owner.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes are not a
    /// valid curve point. A non-matching signature is `Ok(false)`.
    pub fn verifies(&self, message: &[u8], signature: &Signature) -> CryptoResult<bool> {
        let key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(key.verify(message, &signature.to_dalek()).is_ok())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.key_id())
    }
}

base64_text!(PublicKey);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(KeyPair::generate().public_key(), KeyPair::generate().public_key());
    }

    #[test]
    fn test_external_key_material_round_trip() {
        let original = KeyPair::generate();
        let restored =
            KeyPair::from_base64(&original.secret_base64(), &original.public_key().to_base64())
                .unwrap();
        assert_eq!(restored.public_key(), original.public_key());
        assert_eq!(restored.sign(b"entry"), original.sign(b"entry"));
    }

    #[test]
    fn test_expanded_secret_must_embed_matching_public_key() {
        let original = KeyPair::generate();
        let mut expanded = original.signing_key.to_keypair_bytes().to_vec();
        assert_eq!(
            KeyPair::from_secret(&expanded).unwrap().public_key(),
            original.public_key()
        );

        expanded[40] ^= 0xff;
        assert!(matches!(
            KeyPair::from_secret(&expanded),
            Err(CryptoError::KeyMismatch)
        ));
    }

    #[test]
    fn test_mismatched_public_key_is_rejected() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let result = KeyPair::from_base64(&a.secret_base64(), &b.public_key().to_base64());
        assert!(matches!(result, Err(CryptoError::KeyMismatch)));
    }

    #[test]
    fn test_bad_material_names_the_value() {
        assert!(matches!(
            KeyPair::from_base64("not base64!!", "also not"),
            Err(CryptoError::InvalidBase64 { what: "private key" })
        ));
        assert!(matches!(
            KeyPair::from_secret(&[0u8; 31]),
            Err(CryptoError::InvalidLength {
                what: "private key",
                ..
            })
        ));
    }

    #[test]
    fn test_verifies_is_false_for_other_message_or_key() {
        let keypair = KeyPair::generate();
        let sig = keypair.sign(b"entry");
        let public = keypair.public_key();

        assert!(public.verifies(b"entry", &sig).unwrap());
        assert!(!public.verifies(b"entry!", &sig).unwrap());
        assert!(!KeyPair::generate().public_key().verifies(b"entry", &sig).unwrap());
    }

    #[test]
    fn test_public_key_serializes_as_base64() {
        let pk = KeyPair::generate().public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_base64()));
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), pk);
    }
}
