//! Session and pulse-record storage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cyper_core::{Session, SessionId};
use cyper_storage::{KvStore, ScopedKvStore};
use tokio::sync::Mutex;

use crate::error::{PulseError, PulseResult};
use crate::record::{PulseRecord, PulseStatus};

// -- Namespace constants --

const NS_SESSIONS: &str = "sessions";
const NS_FINGERPRINTS: &str = "sessions:by_fingerprint";
const NS_PULSE_PREFIX: &str = "pulse:";

/// Durable session records.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Persist a new session.
    async fn create(&self, session: &Session) -> PulseResult<()>;

    /// Fetch a session by id.
    async fn get(&self, id: SessionId) -> PulseResult<Option<Session>>;

    /// Fetch a session by its token fingerprint.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> PulseResult<Option<Session>>;

    /// Sessions neither revoked nor expired at `now`.
    async fn active_sessions(&self, now: DateTime<Utc>) -> PulseResult<Vec<Session>>;

    /// Mark a session revoked. Already-revoked sessions are returned as is.
    async fn revoke(&self, id: SessionId, at: DateTime<Utc>) -> PulseResult<Session>;

    /// Refresh the last-activity time.
    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> PulseResult<()>;
}

/// Append-only per-session pulse history.
#[async_trait]
pub trait PulseStore: Send + Sync + std::fmt::Debug {
    /// Append a record.
    ///
    /// Rejects a `checked_at` not strictly after the previous record and any
    /// record following a terminal status.
    async fn append(&self, record: &PulseRecord) -> PulseResult<()>;

    /// Most recent record for a session.
    async fn latest(&self, session_id: SessionId) -> PulseResult<Option<PulseRecord>>;

    /// All records for a session, oldest first.
    async fn history(&self, session_id: SessionId) -> PulseResult<Vec<PulseRecord>>;
}

/// [`SessionStore`] and [`PulseStore`] over a [`KvStore`].
pub struct KvSessionStore {
    store: Arc<dyn KvStore>,
    sessions: ScopedKvStore,
    fingerprints: ScopedKvStore,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for KvSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvSessionStore").finish_non_exhaustive()
    }
}

impl KvSessionStore {
    /// Create a session store over `store`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the namespaces are rejected.
    pub fn new(store: Arc<dyn KvStore>) -> PulseResult<Self> {
        Ok(Self {
            sessions: ScopedKvStore::new(Arc::clone(&store), NS_SESSIONS)?,
            fingerprints: ScopedKvStore::new(Arc::clone(&store), NS_FINGERPRINTS)?,
            store,
            write_lock: Mutex::new(()),
        })
    }

    fn records(&self, session_id: SessionId) -> PulseResult<ScopedKvStore> {
        Ok(ScopedKvStore::new(
            Arc::clone(&self.store),
            format!("{NS_PULSE_PREFIX}{session_id}"),
        )?)
    }

    async fn load(&self, id: SessionId) -> PulseResult<Session> {
        self.sessions
            .get_json(&id.to_string())
            .await?
            .ok_or(PulseError::SessionNotFound { id })
    }
}

#[async_trait]
impl SessionStore for KvSessionStore {
    async fn create(&self, session: &Session) -> PulseResult<()> {
        let _guard = self.write_lock.lock().await;
        let key = session.id.to_string();
        if self.sessions.get_json::<Session>(&key).await?.is_some() {
            return Err(PulseError::Validation(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.sessions.set_json(&key, session).await?;
        self.fingerprints
            .set_json(&session.token_fingerprint, &session.id)
            .await?;
        Ok(())
    }

    async fn get(&self, id: SessionId) -> PulseResult<Option<Session>> {
        Ok(self.sessions.get_json(&id.to_string()).await?)
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> PulseResult<Option<Session>> {
        if fingerprint.is_empty() {
            return Ok(None);
        }
        let Some(id) = self.fingerprints.get_json::<SessionId>(fingerprint).await? else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn active_sessions(&self, now: DateTime<Utc>) -> PulseResult<Vec<Session>> {
        let all: Vec<Session> = self.sessions.scan_json().await?;
        Ok(all.into_iter().filter(|s| s.is_active(now)).collect())
    }

    async fn revoke(&self, id: SessionId, at: DateTime<Utc>) -> PulseResult<Session> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load(id).await?;
        if session.revoked_at.is_none() {
            session.revoked_at = Some(cyper_core::clock::truncate_to_micros(at));
            self.sessions.set_json(&id.to_string(), &session).await?;
        }
        Ok(session)
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> PulseResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load(id).await?;
        if at > session.last_activity_at {
            session.last_activity_at = cyper_core::clock::truncate_to_micros(at);
            self.sessions.set_json(&id.to_string(), &session).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PulseStore for KvSessionStore {
    async fn append(&self, record: &PulseRecord) -> PulseResult<()> {
        let _guard = self.write_lock.lock().await;
        let records = self.records(record.session_id)?;
        let keys = records.keys().await?;

        if let Some(last_key) = keys.last()
            && let Some(previous) = records.get_json::<PulseRecord>(last_key).await?
        {
            if record.checked_at <= previous.checked_at {
                return Err(PulseError::Validation(format!(
                    "pulse for session {} at {} is not after {}",
                    record.session_id, record.checked_at, previous.checked_at
                )));
            }
            if previous.status.is_terminal() {
                return Err(PulseError::Validation(format!(
                    "session {} is already {}",
                    record.session_id, previous.status
                )));
            }
        }

        let key = format!("{:010}", keys.len());
        records.set_json(&key, record).await?;
        Ok(())
    }

    async fn latest(&self, session_id: SessionId) -> PulseResult<Option<PulseRecord>> {
        let records = self.records(session_id)?;
        let keys = records.keys().await?;
        match keys.last() {
            Some(key) => Ok(records.get_json(key).await?),
            None => Ok(None),
        }
    }

    async fn history(&self, session_id: SessionId) -> PulseResult<Vec<PulseRecord>> {
        Ok(self.records(session_id)?.scan_json().await?)
    }
}

/// Whether a session still needs checks given its latest record.
pub(crate) fn needs_check(latest: Option<&PulseRecord>) -> bool {
    latest.is_none_or(|r| !r.status.is_terminal())
}

/// Whether the latest record asks for an early retry.
pub(crate) fn awaiting_retry(latest: Option<&PulseRecord>) -> bool {
    latest.is_some_and(|r| r.status == PulseStatus::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cyper_core::UserId;
    use cyper_storage::MemoryKvStore;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn store() -> KvSessionStore {
        KvSessionStore::new(Arc::new(MemoryKvStore::new())).unwrap()
    }

    fn session(fingerprint: &str, hours: i64) -> Session {
        Session::new(UserId::from("u1"), fingerprint, t0(), t0() + Duration::hours(hours)).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = store();
        let s = session("fp1", 1);
        store.create(&s).await.unwrap();

        assert_eq!(store.get(s.id).await.unwrap(), Some(s.clone()));
        assert_eq!(store.find_by_fingerprint("fp1").await.unwrap(), Some(s.clone()));
        assert_eq!(store.find_by_fingerprint("nope").await.unwrap(), None);
        assert!(matches!(
            store.create(&s).await,
            Err(PulseError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_active_sessions_excludes_expired_and_revoked() {
        let store = store();
        let short = session("a", 1);
        let long = session("b", 5);
        let revoked = session("c", 5);
        for s in [&short, &long, &revoked] {
            store.create(s).await.unwrap();
        }
        store.revoke(revoked.id, t0()).await.unwrap();

        let active = store.active_sessions(t0() + Duration::hours(2)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, long.id);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = store();
        let s = session("fp", 1);
        store.create(&s).await.unwrap();

        let first = store.revoke(s.id, t0()).await.unwrap();
        let second = store
            .revoke(s.id, t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(first.revoked_at, Some(t0()));
        assert_eq!(second.revoked_at, Some(t0()));

        assert!(matches!(
            store.revoke(SessionId::new(), t0()).await,
            Err(PulseError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_touch_only_moves_forward() {
        let store = store();
        let s = session("fp", 1);
        store.create(&s).await.unwrap();

        store.touch(s.id, t0() + Duration::minutes(10)).await.unwrap();
        store.touch(s.id, t0() + Duration::minutes(5)).await.unwrap();
        let stored = store.get(s.id).await.unwrap().unwrap();
        assert_eq!(stored.last_activity_at, t0() + Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_append_requires_increasing_checked_at() {
        let store = store();
        let id = SessionId::new();
        let next = t0() + Duration::minutes(5);
        store
            .append(&PulseRecord::authorized(id, t0(), vec![], next))
            .await
            .unwrap();

        let same_time = PulseRecord::authorized(id, t0(), vec![], next);
        assert!(matches!(
            store.append(&same_time).await,
            Err(PulseError::Validation(_))
        ));

        let later = PulseRecord::authorized(id, next, vec![], next + Duration::minutes(5));
        store.append(&later).await.unwrap();
        assert_eq!(store.history(id).await.unwrap().len(), 2);
        assert_eq!(store.latest(id).await.unwrap(), Some(later));
    }

    #[tokio::test]
    async fn test_append_rejects_after_terminal() {
        let store = store();
        let id = SessionId::new();
        store
            .append(&PulseRecord::revoked(id, t0(), "admin".into()))
            .await
            .unwrap();

        let resurrect = PulseRecord::authorized(
            id,
            t0() + Duration::minutes(1),
            vec![],
            t0() + Duration::minutes(6),
        );
        assert!(store.append(&resurrect).await.is_err());
        assert_eq!(store.history(id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_check_scheduling_helpers() {
        let id = SessionId::new();
        let error = PulseRecord::error(id, t0(), "down".into(), t0());
        let revoked = PulseRecord::revoked(id, t0(), "x".into());

        assert!(needs_check(None));
        assert!(needs_check(Some(&error)));
        assert!(!needs_check(Some(&revoked)));
        assert!(awaiting_retry(Some(&error)));
        assert!(!awaiting_retry(None));
    }
}
