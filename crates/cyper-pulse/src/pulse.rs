//! The authorization pulse loop.
//!
//! One ticker drives every check. Each tick loads the active sessions and
//! re-verifies them concurrently through a bounded pool, each check bounded
//! by its own timeout, so one slow session cannot hold up the rest.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use cyper_audit::{AuditRecord, AuditTrail, Severity};
use cyper_core::{Clock, Principal, Session};
use cyper_events::{EventHub, RealtimeEvent};
use cyper_metrics::SharedMetricsRegistry;
use futures::StreamExt;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::authority::{AuthorityDecision, AuthorizationAuthority};
use crate::error::PulseResult;
use crate::record::{PulseRecord, PulseStatus};
use crate::store::{PulseStore, SessionStore, awaiting_retry, needs_check};

/// Audit action recorded when a session loses authorization.
pub const REVOKED_ACTION: &str = "authorization_revoked";

/// Scheduling for the pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseOptions {
    /// Time between regular ticks.
    pub interval: Duration,
    /// Delay before re-checking sessions whose last check failed.
    pub error_retry: Duration,
    /// Upper bound on one session's check.
    pub session_timeout: Duration,
    /// Sessions checked at once.
    pub max_concurrency: usize,
}

impl Default for PulseOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            error_retry: Duration::from_secs(30),
            session_timeout: Duration::from_secs(10),
            max_concurrency: 16,
        }
    }
}

/// Counts from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Sessions for which a record was written.
    pub checked: usize,
    /// Still authorized.
    pub authorized: usize,
    /// Newly revoked.
    pub revoked: usize,
    /// Newly expired.
    pub expired: usize,
    /// Checks that ended in `error`.
    pub errors: usize,
    /// Active sessions not checked this pass.
    pub skipped: usize,
}

impl TickSummary {
    fn count(&mut self, outcome: Option<PulseStatus>) {
        let Some(status) = outcome else {
            self.skipped = self.skipped.saturating_add(1);
            return;
        };
        self.checked = self.checked.saturating_add(1);
        let slot = match status {
            PulseStatus::Authorized => &mut self.authorized,
            PulseStatus::Revoked => &mut self.revoked,
            PulseStatus::Expired => &mut self.expired,
            PulseStatus::Error => &mut self.errors,
        };
        *slot = slot.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Regular,
    Retry,
}

/// `at + by`, saturating at the latest representable time.
fn after(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Periodic re-verification of every active session.
#[derive(Debug)]
pub struct AuthorizationPulse {
    sessions: Arc<dyn SessionStore>,
    records: Arc<dyn PulseStore>,
    authority: Arc<dyn AuthorizationAuthority>,
    clock: Arc<dyn Clock>,
    hub: Option<Arc<EventHub>>,
    audit: Option<Arc<AuditTrail>>,
    metrics: Option<SharedMetricsRegistry>,
    options: PulseOptions,
}

impl AuthorizationPulse {
    /// Create a pulse with no notification targets.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        records: Arc<dyn PulseStore>,
        authority: Arc<dyn AuthorizationAuthority>,
        clock: Arc<dyn Clock>,
        options: PulseOptions,
    ) -> Self {
        Self {
            sessions,
            records,
            authority,
            clock,
            hub: None,
            audit: None,
            metrics: None,
            options,
        }
    }

    /// Publish `auth_revoked` to the session owner's clients on revocation.
    #[must_use]
    pub fn with_hub(mut self, hub: Arc<EventHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Record revocations in the audit trail.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Count check outcomes and track the active session gauge.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until `cancel` fires. The first tick runs immediately.
    ///
    /// A tick in progress when `cancel` fires is completed first.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_at: Option<Instant> = None;

        info!(
            interval_secs = self.options.interval.as_secs(),
            error_retry_secs = self.options.error_retry.as_secs(),
            "Authorization pulse started"
        );

        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
                () = wait_until(retry_at) => self.retry_errors().await,
            };

            match result {
                Ok(summary) => {
                    retry_at = (summary.errors > 0)
                        .then(|| Instant::now().checked_add(self.options.error_retry))
                        .flatten();
                },
                Err(e) => {
                    warn!(error = %e, "Pulse pass failed");
                    retry_at = Instant::now().checked_add(self.options.error_retry);
                },
            }
        }
        info!("Authorization pulse stopped");
    }

    /// Check every active session once.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the active sessions cannot be listed.
    /// Failures for individual sessions are recorded, not returned.
    pub async fn tick(&self) -> PulseResult<TickSummary> {
        self.pass(Pass::Regular).await
    }

    /// Re-check only the sessions whose latest record is `error`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the active sessions cannot be listed.
    pub async fn retry_errors(&self) -> PulseResult<TickSummary> {
        self.pass(Pass::Retry).await
    }

    async fn pass(&self, pass: Pass) -> PulseResult<TickSummary> {
        let now = self.clock.now();
        let sessions = self.sessions.active_sessions(now).await?;
        if let Some(metrics) = &self.metrics {
            metrics.metrics().set_active_sessions(sessions.len());
        }

        let outcomes: Vec<Option<PulseStatus>> = futures::stream::iter(sessions)
            .map(|session| self.check(session, now, pass))
            .buffer_unordered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let mut summary = TickSummary::default();
        for outcome in outcomes {
            summary.count(outcome);
        }
        debug!(
            pass = ?pass,
            checked = summary.checked,
            authorized = summary.authorized,
            revoked = summary.revoked,
            expired = summary.expired,
            errors = summary.errors,
            skipped = summary.skipped,
            "Pulse pass complete"
        );
        Ok(summary)
    }

    /// Check one session. `None` if it was skipped or nothing was recorded.
    async fn check(&self, session: Session, now: DateTime<Utc>, pass: Pass) -> Option<PulseStatus> {
        let latest = match self.records.latest(session.id).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Failed to load pulse history");
                return None;
            },
        };
        if !needs_check(latest.as_ref())
            || (pass == Pass::Retry && !awaiting_retry(latest.as_ref()))
            || latest.as_ref().is_some_and(|r| r.checked_at >= now)
        {
            return None;
        }

        let decision = tokio::time::timeout(
            self.options.session_timeout,
            self.authority.reverify(&session),
        )
        .await;

        let record = match decision {
            Ok(Ok(AuthorityDecision::Authorized { features })) => {
                PulseRecord::authorized(session.id, now, features, after(now, self.options.interval))
            },
            Ok(Ok(AuthorityDecision::Revoked { reason })) => {
                PulseRecord::revoked(session.id, now, reason)
            },
            Ok(Ok(AuthorityDecision::Expired)) => PulseRecord::expired(session.id, now),
            Ok(Err(e)) => {
                warn!(session_id = %session.id, error = %e, "Authorization check failed");
                PulseRecord::error(session.id, now, e.to_string(), after(now, self.options.error_retry))
            },
            Err(_) => {
                warn!(session_id = %session.id, "Authorization check timed out");
                PulseRecord::error(
                    session.id,
                    now,
                    "authorization check timed out".into(),
                    after(now, self.options.error_retry),
                )
            },
        };

        if let Err(e) = self.records.append(&record).await {
            warn!(session_id = %session.id, error = %e, "Failed to record pulse");
            return None;
        }
        if let Some(metrics) = &self.metrics {
            metrics.metrics().pulse_checked(record.status.as_str());
        }

        if record.status == PulseStatus::Revoked {
            let reason = record.reason.clone().unwrap_or_default();
            self.on_revoked(&session, now, reason).await;
        } else if record.status == PulseStatus::Expired {
            info!(session_id = %session.id, user_id = %session.user_id, "Session authorization expired");
        }
        Some(record.status)
    }

    async fn on_revoked(&self, session: &Session, now: DateTime<Utc>, reason: String) {
        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            reason = %reason,
            "Session authorization revoked"
        );

        if let Err(e) = self.sessions.revoke(session.id, now).await {
            warn!(session_id = %session.id, error = %e, "Failed to mark session revoked");
        }

        if let Some(audit) = &self.audit {
            let principal = Principal::new(session.user_id.clone()).with_session(session.id);
            let record = AuditRecord::new(REVOKED_ACTION)
                .principal(&principal)
                .resource("session", session.id.to_string())
                .severity(Severity::High)
                .detail(serde_json::json!({ "reason": reason }));
            if let Err(e) = audit.write(record).await {
                warn!(session_id = %session.id, error = %e, "Failed to audit revocation");
            }
        }

        if let Some(hub) = &self.hub {
            let event = RealtimeEvent::AuthRevoked { reason };
            if let Err(e) = hub.publish(Some(&session.user_id), event).await {
                warn!(session_id = %session.id, error = %e, "Failed to publish revocation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{ScriptedAuthority, ScriptedOutcome};
    use crate::store::KvSessionStore;
    use chrono::Duration as ChronoDuration;
    use cyper_audit::{AuditSigner, KvAuditStore, SigningOptions};
    use cyper_core::{ManualClock, UserId};
    use cyper_events::HubOptions;
    use cyper_storage::MemoryKvStore;

    struct Fixture {
        store: Arc<KvSessionStore>,
        authority: Arc<ScriptedAuthority>,
        clock: Arc<ManualClock>,
        pulse: AuthorizationPulse,
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fixture() -> Fixture {
        let store = Arc::new(KvSessionStore::new(Arc::new(MemoryKvStore::new())).unwrap());
        let authority = Arc::new(ScriptedAuthority::new(vec!["scan".into()]));
        let clock = Arc::new(ManualClock::new(t0()));
        let pulse = AuthorizationPulse::new(
            store.clone(),
            store.clone(),
            authority.clone(),
            clock.clone(),
            PulseOptions::default(),
        );
        Fixture {
            store,
            authority,
            clock,
            pulse,
        }
    }

    async fn session(store: &KvSessionStore, user: &str, fingerprint: &str) -> Session {
        let s = Session::new(
            UserId::from(user),
            fingerprint,
            t0(),
            t0() + ChronoDuration::hours(1),
        )
        .unwrap();
        store.create(&s).await.unwrap();
        s
    }

    #[tokio::test]
    async fn test_tick_authorizes_and_schedules_next() {
        let f = fixture();
        let s = session(&f.store, "u1", "fp").await;

        let summary = f.pulse.tick().await.unwrap();
        assert_eq!(summary.authorized, 1);

        let history = f.store.history(s.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, PulseStatus::Authorized);
        assert_eq!(history[0].features, vec!["scan".to_string()]);
        assert_eq!(history[0].next_check_at, Some(t0() + ChronoDuration::minutes(5)));
    }

    #[tokio::test]
    async fn test_expired_session_is_not_checked() {
        let f = fixture();
        let s = session(&f.store, "u1", "fp").await;
        f.pulse.tick().await.unwrap();

        f.clock.advance(ChronoDuration::hours(2));
        let summary = f.pulse.tick().await.unwrap();
        assert_eq!(summary, TickSummary::default());
        assert_eq!(f.store.history(s.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_instant_is_not_rechecked() {
        let f = fixture();
        session(&f.store, "u1", "fp").await;
        f.pulse.tick().await.unwrap();

        let summary = f.pulse.tick().await.unwrap();
        assert_eq!(summary.checked, 0);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_unreachable_authority_records_error_then_retries() {
        let f = fixture();
        let s = session(&f.store, "u1", "fp").await;
        let other = session(&f.store, "u2", "fp2").await;
        f.authority.script(s.id, ScriptedOutcome::Unreachable);

        let summary = f.pulse.tick().await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.authorized, 1);

        let latest = f.store.latest(s.id).await.unwrap().unwrap();
        assert_eq!(latest.status, PulseStatus::Error);
        assert_eq!(latest.next_check_at, Some(t0() + ChronoDuration::seconds(30)));
        assert!(latest.reason.is_some());

        f.authority.clear(s.id);
        f.clock.advance(ChronoDuration::seconds(30));
        let retry = f.pulse.retry_errors().await.unwrap();
        assert_eq!(retry.authorized, 1);
        assert_eq!(retry.skipped, 1);

        let statuses: Vec<_> = f
            .store
            .history(s.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec![PulseStatus::Error, PulseStatus::Authorized]);
        assert_eq!(f.store.history(other.id).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_session_does_not_block_others() {
        let f = fixture();
        let hung = session(&f.store, "u1", "a").await;
        let slow = session(&f.store, "u2", "b").await;
        let fine = session(&f.store, "u3", "c").await;
        f.authority.script(hung.id, ScriptedOutcome::Hang);
        f.authority
            .script(slow.id, ScriptedOutcome::Slow(Duration::from_secs(2)));

        let summary = f.pulse.tick().await.unwrap();
        assert_eq!(summary.authorized, 2);
        assert_eq!(summary.errors, 1);

        let latest = f.store.latest(hung.id).await.unwrap().unwrap();
        assert_eq!(latest.status, PulseStatus::Error);
        assert_eq!(
            f.store.latest(fine.id).await.unwrap().unwrap().status,
            PulseStatus::Authorized
        );
    }

    #[tokio::test]
    async fn test_revocation_is_terminal_and_notified() {
        let store = Arc::new(KvSessionStore::new(Arc::new(MemoryKvStore::new())).unwrap());
        let authority = Arc::new(ScriptedAuthority::new(vec![]));
        let clock = Arc::new(ManualClock::new(t0()));
        let cancel = CancellationToken::new();

        let hub = Arc::new(EventHub::new(HubOptions::default(), clock.clone()));
        let runner = Arc::clone(&hub);
        let token = cancel.clone();
        tokio::spawn(async move { runner.run(token).await });

        let audit_store = Arc::new(KvAuditStore::new(Arc::new(MemoryKvStore::new())).unwrap());
        let audit = Arc::new(AuditTrail::new(
            audit_store,
            Arc::new(AuditSigner::generate_ephemeral()),
            clock.clone(),
            SigningOptions::default(),
            &cancel,
        ));

        let pulse = AuthorizationPulse::new(
            store.clone(),
            store.clone(),
            authority.clone(),
            clock.clone(),
            PulseOptions::default(),
        )
        .with_hub(Arc::clone(&hub))
        .with_audit(Arc::clone(&audit));

        let s = session(&store, "u1", "fp").await;
        let mut watcher = hub.register_client(UserId::from("u1")).await;
        let mut bystander = hub.register_client(UserId::from("u2")).await;

        pulse.tick().await.unwrap();
        authority.script(
            s.id,
            ScriptedOutcome::Decide(AuthorityDecision::Revoked {
                reason: "role removed".into(),
            }),
        );
        clock.advance(ChronoDuration::minutes(5));
        let summary = pulse.tick().await.unwrap();
        assert_eq!(summary.revoked, 1);

        let frame = watcher.outbound.recv().await.unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["type"], "auth_revoked");
        assert_eq!(envelope["data"]["reason"], "role removed");
        assert!(bystander.outbound.try_recv().is_err());

        assert!(store.get(s.id).await.unwrap().unwrap().is_revoked());
        let audited = audit.by_action(REVOKED_ACTION, 10).await.unwrap();
        assert_eq!(audited.len(), 1);
        assert_eq!(audited[0].severity, Severity::High);
        assert_eq!(audited[0].actor, Some(UserId::from("u1")));

        // Even if the authority would now authorize again, nothing follows.
        authority.clear(s.id);
        clock.advance(ChronoDuration::minutes(5));
        pulse.tick().await.unwrap();
        let statuses: Vec<_> = store
            .history(s.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec![PulseStatus::Authorized, PulseStatus::Revoked]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_outcomes_and_active_sessions_are_counted() {
        let metrics = cyper_metrics::MetricsRegistry::shared().unwrap();
        let f = fixture();
        let pulse = f.pulse.with_metrics(Arc::clone(&metrics));
        session(&f.store, "u1", "a").await;
        let down = session(&f.store, "u2", "b").await;
        let gone = session(&f.store, "u3", "c").await;
        f.authority.script(down.id, ScriptedOutcome::Unreachable);
        f.authority
            .script(gone.id, ScriptedOutcome::Decide(AuthorityDecision::Expired));

        pulse.tick().await.unwrap();
        let counts = metrics.metrics();
        assert_eq!(counts.active_sessions(), 3);
        assert_eq!(counts.pulse_check_count("authorized"), 1);
        assert_eq!(counts.pulse_check_count("error"), 1);
        assert_eq!(counts.pulse_check_count("expired"), 1);

        // Skipped sessions add nothing; the gauge follows the listing.
        pulse.tick().await.unwrap();
        assert_eq!(counts.pulse_check_count("authorized"), 1);
        f.clock.advance(ChronoDuration::hours(2));
        pulse.tick().await.unwrap();
        assert_eq!(counts.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_expired_decision_is_terminal() {
        let f = fixture();
        let s = session(&f.store, "u1", "fp").await;
        f.authority
            .script(s.id, ScriptedOutcome::Decide(AuthorityDecision::Expired));

        assert_eq!(f.pulse.tick().await.unwrap().expired, 1);
        f.authority.clear(s.id);
        f.clock.advance(ChronoDuration::minutes(5));
        assert_eq!(f.pulse.tick().await.unwrap().skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_cancelled() {
        let f = fixture();
        let s = session(&f.store, "u1", "fp").await;
        let pulse = Arc::new(f.pulse);
        let cancel = CancellationToken::new();

        let runner = Arc::clone(&pulse);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { runner.run(token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.store.history(s.id).await.unwrap().len(), 1);

        f.clock.advance(ChronoDuration::minutes(5));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(f.store.history(s.id).await.unwrap().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
