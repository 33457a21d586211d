//! Process-local backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{KvStore, check_name, check_pair};
use crate::error::{StorageError, StorageResult};

type Namespace = BTreeMap<String, Vec<u8>>;

/// In-memory store for tests and single-process development runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StorageError {
    StorageError::Internal("memory store lock poisoned".into())
}

impl MemoryKvStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        check_pair(namespace, key)?;
        let namespaces = self.namespaces.read().map_err(poisoned)?;
        Ok(namespaces.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        check_pair(namespace, key)?;
        self.namespaces
            .write()
            .map_err(poisoned)?
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        check_name("namespace", namespace)?;
        let namespaces = self.namespaces.read().map_err(poisoned)?;
        Ok(namespaces
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = MemoryKvStore::new();
        store.set("ns1", "k", b"v1".to_vec()).await.unwrap();
        store.set("ns1", "k", b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get("ns1", "k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.get("ns1", "other").await.unwrap(), None);
        assert_eq!(store.get("ns9", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_are_ordered_and_namespaced() {
        let store = MemoryKvStore::new();
        store.set("ns1", "00000000000000000002", b"2".to_vec()).await.unwrap();
        store.set("ns1", "00000000000000000001", b"1".to_vec()).await.unwrap();
        store.set("ns2", "00000000000000000000", b"0".to_vec()).await.unwrap();

        assert_eq!(
            store.list_keys("ns1").await.unwrap(),
            vec!["00000000000000000001", "00000000000000000002"]
        );
        assert!(store.list_keys("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_names_are_rejected() {
        let store = MemoryKvStore::new();
        assert!(store.set("", "k", Vec::new()).await.is_err());
        assert!(store.set("ns", "", Vec::new()).await.is_err());
        assert!(store.get("ns", "k\0bad").await.is_err());
        assert!(store.list_keys("").await.is_err());
    }
}
