//! Shared test harness for integration tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use cyper_audit::{
    AuditEntry, AuditEntryId, AuditSigner, AuditStore, AuditTrail, KvAuditStore, SigningOptions,
};
use cyper_core::{Clock, ManualClock, Session, UserId};
use cyper_crypto::TokenFingerprint;
use cyper_events::{EventHub, HubOptions};
use cyper_pulse::{
    AuthorizationAuthority, AuthorizationPulse, KvSessionStore, PulseOptions, PulseStore,
    ScriptedAuthority, SessionStore,
};
use cyper_storage::{KvStore, MemoryKvStore, ScopedKvStore};
use tokio_util::sync::CancellationToken;

/// Namespace the audit store keeps entries under.
#[allow(dead_code)]
pub const AUDIT_ENTRIES_NS: &str = "audit:entries";

/// Features the scripted authority grants by default.
#[allow(dead_code)]
pub fn default_features() -> Vec<String> {
    vec!["scan".to_owned(), "report".to_owned()]
}

/// Every subsystem wired over one in-memory store and one manual clock.
///
/// The hub dispatch loop runs for the harness's lifetime; dropping the
/// harness cancels it and the signing workers.
#[allow(dead_code)]
pub struct Harness {
    /// Shared durable store.
    pub kv: Arc<dyn KvStore>,
    /// Test clock.
    pub clock: ManualClock,
    /// Sessions and pulse records.
    pub sessions: Arc<KvSessionStore>,
    /// Audit trail with an ephemeral signer.
    pub audit: Arc<AuditTrail>,
    /// Realtime hub (running).
    pub hub: Arc<EventHub>,
    /// Scripted authorization authority.
    pub authority: Arc<ScriptedAuthority>,
    /// Pulse over all of the above.
    pub pulse: AuthorizationPulse,
    /// Shared cancellation.
    pub cancel: CancellationToken,
}

#[allow(dead_code)]
impl Harness {
    /// Build with default hub sizing.
    pub fn new() -> Self {
        Self::with_hub_options(HubOptions::default())
    }

    /// Build with custom hub sizing.
    pub fn with_hub_options(hub_options: HubOptions) -> Self {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let clock = ManualClock::starting_now();
        let clock_dyn: Arc<dyn Clock> = Arc::new(clock.clone());
        let cancel = CancellationToken::new();

        let audit_store: Arc<dyn AuditStore> =
            Arc::new(KvAuditStore::new(Arc::clone(&kv)).expect("audit store"));
        let audit = Arc::new(AuditTrail::new(
            audit_store,
            Arc::new(AuditSigner::generate_ephemeral()),
            Arc::clone(&clock_dyn),
            SigningOptions::default(),
            &cancel,
        ));

        let sessions = Arc::new(KvSessionStore::new(Arc::clone(&kv)).expect("session store"));
        let hub = Arc::new(EventHub::new(hub_options, Arc::clone(&clock_dyn)));
        {
            let hub = Arc::clone(&hub);
            let cancel = cancel.clone();
            tokio::spawn(async move { hub.run(cancel).await });
        }

        let authority = Arc::new(ScriptedAuthority::new(default_features()));
        let pulse = AuthorizationPulse::new(
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&sessions) as Arc<dyn PulseStore>,
            Arc::clone(&authority) as Arc<dyn AuthorizationAuthority>,
            clock_dyn,
            PulseOptions::default(),
        )
        .with_hub(Arc::clone(&hub))
        .with_audit(Arc::clone(&audit));

        Self {
            kv,
            clock,
            sessions,
            audit,
            hub,
            authority,
            pulse,
            cancel,
        }
    }

    /// Create a session for `user` holding `token`, valid for `ttl`.
    pub async fn create_session(&self, user: &str, token: &str, ttl: TimeDelta) -> Session {
        let now = self.clock.now();
        let session = Session::new(
            UserId::new(user),
            TokenFingerprint::of(token).into_string(),
            now,
            now + ttl,
        )
        .expect("valid session");
        self.sessions.create(&session).await.expect("create session");
        session
    }

    /// Wait until the signing pool has signed `id`.
    pub async fn wait_signed(&self, id: AuditEntryId) -> AuditEntry {
        wait_signed(&self.audit, id).await
    }

    /// Rewrite a stored audit entry in place, bypassing the trail.
    pub async fn tamper(&self, id: AuditEntryId, edit: impl FnOnce(&mut serde_json::Value)) {
        let entries = ScopedKvStore::new(Arc::clone(&self.kv), AUDIT_ENTRIES_NS).expect("ns");
        let key = id.storage_key();
        let mut raw: serde_json::Value = entries
            .get_json(&key)
            .await
            .expect("read entry")
            .expect("entry exists");
        edit(&mut raw);
        entries.set_json(&key, &raw).await.expect("write entry");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Poll until `id` is signed, failing after five seconds.
#[allow(dead_code)]
pub async fn wait_signed(audit: &AuditTrail, id: AuditEntryId) -> AuditEntry {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let entry = audit.get(id).await.expect("entry");
            if entry.is_signed() {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("entry signed in time")
}
