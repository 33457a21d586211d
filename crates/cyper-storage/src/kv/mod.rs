//! Namespaced key-value storage.
//!
//! Keys compare byte-wise inside a namespace. Record stores depend on that:
//! audit ids and pulse sequence numbers are written as fixed-width,
//! zero-padded decimals so iteration order is insertion order.

mod memory;
#[cfg(feature = "kv")]
mod surreal;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StorageError, StorageResult};

pub use memory::MemoryKvStore;
#[cfg(feature = "kv")]
pub use surreal::SurrealKvStore;

/// Byte separating namespace from key in flat backends.
pub(crate) const SEPARATOR: u8 = 0;

/// Rejects empty names and names containing [`SEPARATOR`].
pub(crate) fn check_name(kind: &str, name: &str) -> StorageResult<()> {
    let problem = if name.is_empty() {
        "must not be empty"
    } else if name.as_bytes().contains(&SEPARATOR) {
        "must not contain null bytes"
    } else {
        return Ok(());
    };
    Err(StorageError::InvalidKey(format!("{kind} {problem}")))
}

pub(crate) fn check_pair(namespace: &str, key: &str) -> StorageResult<()> {
    check_name("namespace", namespace)?;
    check_name("key", key)
}

/// Byte-level storage partitioned by namespace.
#[async_trait]
pub trait KvStore: Send + Sync + fmt::Debug {
    /// Value stored under `key`, or `None`.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing what was there.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Every key in `namespace`, ascending by bytes.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;
}

/// A [`KvStore`] bound to one namespace, holding JSON records.
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl fmt::Debug for ScopedKvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopedKvStore({:?})", self.namespace)
    }
}

impl ScopedKvStore {
    /// Bind `store` to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an empty namespace or one
    /// containing a null byte.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        check_name("namespace", &namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// Bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Keys in the namespace, ascending.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Decode the record under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored bytes are not
    /// a valid `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.inner.get(&self.namespace, key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(format!("{}/{key}: {e}", self.namespace))),
            None => Ok(None),
        }
    }

    /// Encode `value` and store it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if encoding fails.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.inner.set(&self.namespace, key, bytes).await
    }

    /// All records, in key order. A key removed between listing and reading
    /// is skipped.
    ///
    /// # Errors
    ///
    /// Fails on the first record that does not decode.
    pub async fn scan_json<T: DeserializeOwned>(&self) -> StorageResult<Vec<T>> {
        let keys = self.keys().await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in &keys {
            records.extend(self.get_json::<T>(key).await?);
        }
        Ok(records)
    }
}
