//! Base64 text form shared by keys and signatures.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

pub(crate) fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode into a zeroized buffer; key material passes through here.
pub(crate) fn decode(s: &str, what: &'static str) -> CryptoResult<Zeroizing<Vec<u8>>> {
    STANDARD
        .decode(s.trim())
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::InvalidBase64 { what })
}

/// Decode a value that must be exactly `N` bytes.
pub(crate) fn decode_fixed<const N: usize>(s: &str, what: &'static str) -> CryptoResult<[u8; N]> {
    let bytes = decode(s, what)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| CryptoError::InvalidLength {
        what,
        expected: N,
        actual: bytes.len(),
    })
}

/// `Display`, `Serialize` and `Deserialize` through the base64 form.
///
/// The type must provide `to_base64(&self) -> String` and
/// `from_base64(&str) -> CryptoResult<Self>`.
macro_rules! base64_text {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_base64())
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_base64(&text).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use base64_text;
