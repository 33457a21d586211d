//! Audit storage trait and key-value implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cyper_core::UserId;
use cyper_crypto::{PublicKey, Signature};
use cyper_storage::{KvStore, ScopedKvStore};
use tokio::sync::Mutex;

use crate::entry::{AuditEntry, AuditEntryId, AuditRecord};
use crate::error::{AuditError, AuditResult};

// -- Namespace constants --

const NS_ENTRIES: &str = "audit:entries";
const NS_META: &str = "audit:meta";
const KEY_NEXT_ID: &str = "next_id";

/// Which entries a scan returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFilter {
    /// Every entry.
    All,
    /// Entries attributed to one user.
    Actor(UserId),
    /// Entries with one action name.
    Action(String),
    /// Severity `high` or `critical`.
    Elevated,
    /// Timestamp within `[start, end]`.
    Range {
        /// Inclusive lower bound.
        start: DateTime<Utc>,
        /// Inclusive upper bound.
        end: DateTime<Utc>,
    },
    /// Signature fields still empty.
    Unsigned,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        match self {
            Self::All => true,
            Self::Actor(user) => entry.actor.as_ref() == Some(user),
            Self::Action(action) => entry.action == *action,
            Self::Elevated => entry.severity.is_elevated(),
            Self::Range { start, end } => entry.timestamp >= *start && entry.timestamp <= *end,
            Self::Unsigned => !entry.is_signed(),
        }
    }
}

/// Durable storage for audit entries.
///
/// Entries are append-only. The only permitted mutation is
/// [`set_signature`](Self::set_signature).
#[async_trait]
pub trait AuditStore: Send + Sync + std::fmt::Debug {
    /// Assign the next id and persist the record. Returns once durable.
    async fn insert(&self, record: AuditRecord, timestamp: DateTime<Utc>)
    -> AuditResult<AuditEntry>;

    /// Fetch an entry as currently stored.
    async fn get(&self, id: AuditEntryId) -> AuditResult<Option<AuditEntry>>;

    /// Populate the three signature fields of an entry.
    async fn set_signature(
        &self,
        id: AuditEntryId,
        signature: Signature,
        public_key: PublicKey,
        signed_at: DateTime<Utc>,
    ) -> AuditResult<()>;

    /// Matching entries, newest first, at most `limit` when given.
    async fn scan(&self, filter: &AuditFilter, limit: Option<usize>)
    -> AuditResult<Vec<AuditEntry>>;

    /// Number of stored entries.
    async fn count(&self) -> AuditResult<u64>;
}

/// [`AuditStore`] over a namespaced [`KvStore`].
///
/// Entries live under `audit:entries` keyed by zero-padded id; the id
/// counter lives under `audit:meta` and is advanced before the entry is
/// written. An existing entry is never overwritten by an insert. A single
/// writer lock serializes id assignment and signature updates.
pub struct KvAuditStore {
    entries: ScopedKvStore,
    meta: ScopedKvStore,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for KvAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvAuditStore").finish_non_exhaustive()
    }
}

impl KvAuditStore {
    /// Create an audit store over `store`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the namespaces are rejected.
    pub fn new(store: Arc<dyn KvStore>) -> AuditResult<Self> {
        Ok(Self {
            entries: ScopedKvStore::new(Arc::clone(&store), NS_ENTRIES)?,
            meta: ScopedKvStore::new(store, NS_META)?,
            write_lock: Mutex::new(()),
        })
    }
}

#[async_trait]
impl AuditStore for KvAuditStore {
    async fn insert(
        &self,
        record: AuditRecord,
        timestamp: DateTime<Utc>,
    ) -> AuditResult<AuditEntry> {
        record.validate()?;
        let _guard = self.write_lock.lock().await;

        let next: u64 = self.meta.get_json(KEY_NEXT_ID).await?.unwrap_or(1);
        let following = next
            .checked_add(1)
            .ok_or_else(|| AuditError::Validation("audit id space exhausted".into()))?;

        // Reserve the id before the entry exists. A failure after this
        // point leaves a gap in the id sequence, never a reused id.
        self.meta.set_json(KEY_NEXT_ID, &following).await?;

        let entry = record.into_entry(AuditEntryId(next), timestamp);
        let key = entry.id.storage_key();
        if self.entries.get_json::<AuditEntry>(&key).await?.is_some() {
            return Err(AuditError::IdConflict { id: entry.id });
        }
        self.entries.set_json(&key, &entry).await?;
        Ok(entry)
    }

    async fn get(&self, id: AuditEntryId) -> AuditResult<Option<AuditEntry>> {
        Ok(self.entries.get_json(&id.storage_key()).await?)
    }

    async fn set_signature(
        &self,
        id: AuditEntryId,
        signature: Signature,
        public_key: PublicKey,
        signed_at: DateTime<Utc>,
    ) -> AuditResult<()> {
        let _guard = self.write_lock.lock().await;
        let key = id.storage_key();
        let mut entry: AuditEntry = self
            .entries
            .get_json(&key)
            .await?
            .ok_or(AuditError::EntryNotFound { id })?;

        entry.signature = Some(signature);
        entry.signer_public_key = Some(public_key);
        entry.signed_at = Some(cyper_core::clock::truncate_to_micros(signed_at));
        self.entries.set_json(&key, &entry).await?;
        Ok(())
    }

    async fn scan(
        &self,
        filter: &AuditFilter,
        limit: Option<usize>,
    ) -> AuditResult<Vec<AuditEntry>> {
        let keys = self.entries.keys().await?;
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for key in keys.iter().rev() {
            if out.len() >= limit {
                break;
            }
            if let Some(entry) = self.entries.get_json::<AuditEntry>(key).await?
                && filter.matches(&entry)
            {
                out.push(entry);
            }
        }
        Ok(out)
    }

    async fn count(&self) -> AuditResult<u64> {
        let keys = self.entries.keys().await?;
        Ok(u64::try_from(keys.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Severity;
    use cyper_crypto::KeyPair;
    use cyper_storage::{MemoryKvStore, StorageError, StorageResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> KvAuditStore {
        KvAuditStore::new(Arc::new(MemoryKvStore::new())).unwrap()
    }

    /// Memory store whose writes to one namespace fail while armed.
    #[derive(Debug)]
    struct FailingKv {
        inner: MemoryKvStore,
        namespace: &'static str,
        failures: AtomicUsize,
    }

    impl FailingKv {
        fn new(namespace: &'static str) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryKvStore::new(),
                namespace,
                failures: AtomicUsize::new(0),
            })
        }

        fn fail_next(&self, count: usize) {
            self.failures.store(count, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KvStore for FailingKv {
        async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(namespace, key).await
        }

        async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
            if namespace == self.namespace
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StorageError::Internal("disk hiccup".into()));
            }
            self.inner.set(namespace, key, value).await
        }

        async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
            self.inner.list_keys(namespace).await
        }
    }

    async fn action_of(store: &KvAuditStore, id: u64) -> Option<String> {
        store
            .get(AuditEntryId(id))
            .await
            .unwrap()
            .map(|entry| entry.action)
    }

    #[tokio::test]
    async fn test_insert_assigns_monotonic_ids() {
        let store = store();
        let a = store
            .insert(AuditRecord::new("a"), Utc::now())
            .await
            .unwrap();
        let b = store
            .insert(AuditRecord::new("b"), Utc::now())
            .await
            .unwrap();

        assert_eq!(a.id, AuditEntryId(1));
        assert_eq!(b.id, AuditEntryId(2));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_record() {
        let store = store();
        let result = store.insert(AuditRecord::new(""), Utc::now()).await;
        assert!(matches!(result, Err(AuditError::Validation(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_signature_only_touches_signature_fields() {
        let store = store();
        let entry = store
            .insert(AuditRecord::new("login_success").actor("u1"), Utc::now())
            .await
            .unwrap();

        let keypair = KeyPair::generate();
        let sig = keypair.sign(b"x");
        store
            .set_signature(entry.id, sig, keypair.public_key(), Utc::now())
            .await
            .unwrap();

        let stored = store.get(entry.id).await.unwrap().unwrap();
        assert!(stored.is_signed());
        assert_eq!(stored.action, entry.action);
        assert_eq!(stored.timestamp, entry.timestamp);
    }

    #[tokio::test]
    async fn test_set_signature_unknown_entry() {
        let store = store();
        let keypair = KeyPair::generate();
        let result = store
            .set_signature(
                AuditEntryId(99),
                keypair.sign(b"x"),
                keypair.public_key(),
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(AuditError::EntryNotFound { .. })));
    }

    #[tokio::test]
    async fn test_scan_filters_newest_first() {
        let store = store();
        for (action, actor, severity) in [
            ("login_success", "u1", Severity::Info),
            ("login_failure", "u2", Severity::High),
            ("login_success", "u2", Severity::Critical),
        ] {
            store
                .insert(
                    AuditRecord::new(action).actor(actor).severity(severity),
                    Utc::now(),
                )
                .await
                .unwrap();
        }

        let by_actor = store
            .scan(&AuditFilter::Actor(UserId::from("u2")), None)
            .await
            .unwrap();
        assert_eq!(
            by_actor.iter().map(|e| e.id.0).collect::<Vec<_>>(),
            vec![3, 2]
        );

        let elevated = store.scan(&AuditFilter::Elevated, Some(1)).await.unwrap();
        assert_eq!(elevated.len(), 1);
        assert_eq!(elevated[0].id, AuditEntryId(3));

        let by_action = store
            .scan(&AuditFilter::Action("login_success".into()), None)
            .await
            .unwrap();
        assert_eq!(by_action.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_counter_write_stores_nothing() {
        let kv = FailingKv::new(NS_META);
        let store = KvAuditStore::new(Arc::clone(&kv) as Arc<dyn KvStore>).unwrap();

        kv.fail_next(1);
        let failed = store
            .insert(AuditRecord::new("login_failure"), Utc::now())
            .await;
        assert!(matches!(failed, Err(AuditError::Storage(_))));
        assert_eq!(action_of(&store, 1).await, None);

        let next = store.insert(AuditRecord::new("benign"), Utc::now()).await.unwrap();
        assert_eq!(next.id, AuditEntryId(1));
        assert_eq!(action_of(&store, 1).await.as_deref(), Some("benign"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_entry_write_leaves_a_gap() {
        let kv = FailingKv::new(NS_ENTRIES);
        let store = KvAuditStore::new(Arc::clone(&kv) as Arc<dyn KvStore>).unwrap();
        let first = store.insert(AuditRecord::new("login_success"), Utc::now()).await.unwrap();

        kv.fail_next(1);
        assert!(store.insert(AuditRecord::new("lost"), Utc::now()).await.is_err());

        let third = store.insert(AuditRecord::new("logout"), Utc::now()).await.unwrap();
        assert_eq!(first.id, AuditEntryId(1));
        assert_eq!(third.id, AuditEntryId(3));
        assert_eq!(action_of(&store, 1).await.as_deref(), Some("login_success"));
        assert_eq!(action_of(&store, 2).await, None);
    }

    #[tokio::test]
    async fn test_stale_counter_never_overwrites_an_entry() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let store = KvAuditStore::new(Arc::clone(&kv)).unwrap();
        store.insert(AuditRecord::new("login_failure"), Utc::now()).await.unwrap();

        // Roll the counter back as a lost counter write would have.
        ScopedKvStore::new(kv, NS_META)
            .unwrap()
            .set_json(KEY_NEXT_ID, &1u64)
            .await
            .unwrap();

        let conflict = store.insert(AuditRecord::new("benign"), Utc::now()).await;
        assert!(matches!(
            conflict,
            Err(AuditError::IdConflict { id }) if id == AuditEntryId(1)
        ));
        assert_eq!(action_of(&store, 1).await.as_deref(), Some("login_failure"));

        let next = store.insert(AuditRecord::new("benign"), Utc::now()).await.unwrap();
        assert_eq!(next.id, AuditEntryId(2));
    }

    #[tokio::test]
    async fn test_failed_signature_write_leaves_entry_unsigned() {
        let kv = FailingKv::new(NS_ENTRIES);
        let store = KvAuditStore::new(Arc::clone(&kv) as Arc<dyn KvStore>).unwrap();
        let entry = store
            .insert(AuditRecord::new("login_success").actor("u1"), Utc::now())
            .await
            .unwrap();

        let keypair = KeyPair::generate();
        kv.fail_next(1);
        let result = store
            .set_signature(entry.id, keypair.sign(b"x"), keypair.public_key(), Utc::now())
            .await;
        assert!(matches!(result, Err(AuditError::Storage(_))));

        let stored = store.get(entry.id).await.unwrap().unwrap();
        assert!(!stored.is_signed());
        assert_eq!(stored.action, "login_success");
        assert_eq!(stored.timestamp, entry.timestamp);
    }
}
