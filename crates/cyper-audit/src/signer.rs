//! Audit signing key holder.
//!
//! One [`AuditSigner`] is built at process start and shared read-only by
//! every signing worker and verification call.

use cyper_crypto::{KeyPair, PublicKey, Signature};
use tracing::{info, warn};

use crate::canonical::SignableRecord;
use crate::error::{AuditError, AuditResult};

/// Signs and verifies canonical audit projections.
#[derive(Debug)]
pub struct AuditSigner {
    keypair: KeyPair,
    ephemeral: bool,
}

impl AuditSigner {
    /// Wrap an already loaded key pair.
    #[must_use]
    pub fn new(keypair: KeyPair) -> Self {
        Self {
            keypair,
            ephemeral: false,
        }
    }

    /// Load from externally held base64 key material.
    ///
    /// # Errors
    ///
    /// Fails if either value is malformed or the two keys do not belong
    /// together.
    pub fn from_base64(private_b64: &str, public_b64: &str) -> AuditResult<Self> {
        let keypair = KeyPair::from_base64(private_b64, public_b64)?;
        info!(key_id = %keypair.key_id(), "Loaded audit signing keys");
        Ok(Self::new(keypair))
    }

    /// Generate a fresh key pair for this process only.
    ///
    /// Entries signed with an ephemeral key cannot be verified after a
    /// restart unless the printed public key is kept elsewhere.
    #[must_use]
    pub fn generate_ephemeral() -> Self {
        let keypair = KeyPair::generate();
        warn!(
            public_key = %keypair.public_key(),
            "Generated ephemeral audit signing keys; signatures written by this process \
             become unverifiable after restart unless these keys are persisted externally"
        );
        Self {
            keypair,
            ephemeral: true,
        }
    }

    /// Build a signer from optional key material.
    ///
    /// Both values present loads them. Neither present generates an
    /// ephemeral pair when `allow_ephemeral` is set.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::KeyMaterial`] when only one value is supplied,
    /// or when none is supplied and ephemeral keys are not allowed.
    pub fn from_key_material(
        private_b64: Option<&str>,
        public_b64: Option<&str>,
        allow_ephemeral: bool,
    ) -> AuditResult<Self> {
        match (private_b64, public_b64) {
            (Some(private), Some(public)) => Self::from_base64(private, public),
            (None, None) if allow_ephemeral => Ok(Self::generate_ephemeral()),
            (None, None) => Err(AuditError::KeyMaterial(
                "no signing keys configured and ephemeral keys are disabled".into(),
            )),
            _ => Err(AuditError::KeyMaterial(
                "private and public signing keys must be supplied together".into(),
            )),
        }
    }

    /// Public half of the signing key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Whether the key was generated at boot.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Sign a projection.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Encoding`] if the projection cannot be encoded.
    pub fn sign(&self, record: &SignableRecord<'_>) -> AuditResult<Signature> {
        let bytes = record.canonical_bytes()?;
        Ok(self.keypair.sign(&bytes))
    }

    /// Check `signature` over `record` against `public_key`.
    ///
    /// A mismatch returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Encoding`] if the projection cannot be encoded,
    /// or a crypto error if `public_key` is not a valid curve point.
    pub fn verify(
        record: &SignableRecord<'_>,
        signature: &Signature,
        public_key: &PublicKey,
    ) -> AuditResult<bool> {
        let bytes = record.canonical_bytes()?;
        Ok(public_key.verifies(&bytes, signature)?)
    }
}
