//! On-disk backend over SurrealKV.
//!
//! SurrealKV has one flat keyspace, so a record lives at
//! `namespace ++ 0x00 ++ key`. Listing a namespace scans
//! `[namespace ++ 0x00, namespace ++ 0x01)`.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use surrealkv::{Mode, Tree, TreeBuilder};

use super::{KvStore, SEPARATOR, check_name, check_pair};
use crate::error::{StorageError, StorageResult};

/// Persistent, transactional store in a local directory.
pub struct SurrealKvStore {
    tree: Tree,
}

impl fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

fn internal(e: surrealkv::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

fn prefix(namespace: &str, tail: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1).saturating_add(tail));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(SEPARATOR);
    buf
}

fn record_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut buf = prefix(namespace, key.len());
    buf.extend_from_slice(key.as_bytes());
    buf
}

impl SurrealKvStore {
    /// Open or create the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the directory cannot be used.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        TreeBuilder::new()
            .with_path(path.as_ref().to_path_buf())
            .build()
            .map(|tree| Self { tree })
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Flush and close.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the flush fails.
    pub async fn close(&self) -> StorageResult<()> {
        self.tree.close().await.map_err(internal)
    }
}

#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        check_pair(namespace, key)?;
        let tx = self.tree.begin_with_mode(Mode::ReadOnly).map_err(internal)?;
        tx.get(&record_key(namespace, key)).map_err(internal)
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        check_pair(namespace, key)?;
        let mut tx = self.tree.begin().map_err(internal)?;
        tx.set(&record_key(namespace, key), &value).map_err(internal)?;
        tx.commit().await.map_err(internal)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        check_name("namespace", namespace)?;
        let start = prefix(namespace, 0);
        let mut end = start.clone();
        if let Some(last) = end.last_mut() {
            *last = SEPARATOR.saturating_add(1);
        }

        let tx = self.tree.begin_with_mode(Mode::ReadOnly).map_err(internal)?;
        let mut cursor = tx.range(&start, &end).map_err(internal)?;
        cursor.seek_first().map_err(internal)?;

        let mut keys = Vec::new();
        while cursor.valid() {
            let raw = cursor.key();
            if let Some(tail) = raw.get(start.len()..)
                && !tail.is_empty()
                && let Ok(key) = std::str::from_utf8(tail)
            {
                keys.push(key.to_owned());
            }
            cursor.next().map_err(internal)?;
        }
        Ok(keys)
    }
}
