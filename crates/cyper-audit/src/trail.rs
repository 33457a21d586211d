//! Audit trail - the main interface for recording and verifying entries.
//!
//! Writes are durable before they return and never wait on signing.
//! Signing happens afterwards on the [`SigningQueue`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cyper_core::{Clock, Principal, UserId};
use cyper_crypto::PublicKey;
use cyper_metrics::SharedMetricsRegistry;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::canonical::SignableRecord;
use crate::entry::{AuditEntry, AuditEntryId, AuditRecord, AuditStatus, Severity};
use crate::error::{AuditError, AuditResult};
use crate::signer::AuditSigner;
use crate::storage::{AuditFilter, AuditStore};
use crate::worker::{ShutdownMode, SigningOptions, SigningQueue};

/// Largest page any query returns.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Result of re-verifying one stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// The entry checked.
    pub entry_id: AuditEntryId,
    /// Whether signature fields are present.
    pub signed: bool,
    /// Whether the signature matches the entry as currently stored.
    pub verified: bool,
    /// Key that produced the signature.
    pub signer_public_key: Option<PublicKey>,
    /// When the signature was attached.
    pub signed_at: Option<DateTime<Utc>>,
}

/// Entries in an inclusive time range.
#[derive(Debug, Clone, Serialize)]
pub struct AuditExport {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
    /// Number of entries returned.
    pub count: usize,
    /// Entries, newest first.
    pub entries: Vec<AuditEntry>,
}

fn check_limit(limit: usize) -> AuditResult<usize> {
    if limit == 0 || limit > MAX_QUERY_LIMIT {
        return Err(AuditError::Validation(format!(
            "limit must be between 1 and {MAX_QUERY_LIMIT}, got {limit}"
        )));
    }
    Ok(limit)
}

/// Append-only, asynchronously signed audit trail.
#[derive(Debug)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    signer: Arc<AuditSigner>,
    clock: Arc<dyn Clock>,
    queue: SigningQueue,
    metrics: Option<SharedMetricsRegistry>,
}

impl AuditTrail {
    /// Build the trail and spawn its signing workers.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuditStore>,
        signer: Arc<AuditSigner>,
        clock: Arc<dyn Clock>,
        options: SigningOptions,
        cancel: &CancellationToken,
    ) -> Self {
        Self::instrumented(store, signer, clock, options, None, cancel)
    }

    /// Like [`new`](Self::new), recording writes and signing outcomes into
    /// `metrics` when given.
    #[must_use]
    pub fn instrumented(
        store: Arc<dyn AuditStore>,
        signer: Arc<AuditSigner>,
        clock: Arc<dyn Clock>,
        options: SigningOptions,
        metrics: Option<SharedMetricsRegistry>,
        cancel: &CancellationToken,
    ) -> Self {
        let queue = SigningQueue::spawn(
            Arc::clone(&store),
            Arc::clone(&signer),
            Arc::clone(&clock),
            options,
            metrics.clone(),
            cancel,
        );
        Self {
            store,
            signer,
            clock,
            queue,
            metrics,
        }
    }

    /// Persist a record and schedule it for signing.
    ///
    /// Returns as soon as the entry is durable. At that point the entry is
    /// queryable with `signed = false`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed record, or a storage error
    /// if the write fails. Signing failures are never reported here.
    pub async fn write(&self, record: AuditRecord) -> AuditResult<AuditEntryId> {
        let entry = self.store.insert(record, self.clock.now()).await?;
        debug!(
            entry_id = %entry.id,
            action = %entry.action,
            user_id = entry.actor.as_ref().map(UserId::as_str),
            status = %entry.status,
            severity = %entry.severity,
            "Audit entry recorded"
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .metrics()
                .audit_entry_written(entry.severity.as_str(), &entry.action);
        }
        self.queue.enqueue(entry.id);
        Ok(entry.id)
    }

    /// Record a successful action against a target.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn log_action(
        &self,
        principal: &Principal,
        action: &str,
        target: &str,
        detail: serde_json::Value,
    ) -> AuditResult<AuditEntryId> {
        self.write(
            AuditRecord::new(action)
                .principal(principal)
                .target(target)
                .detail(detail),
        )
        .await
    }

    /// Record a successful action on a resource.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn log_success(
        &self,
        principal: &Principal,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        detail: serde_json::Value,
    ) -> AuditResult<AuditEntryId> {
        self.write(
            AuditRecord::new(action)
                .principal(principal)
                .resource(resource_type, resource_id)
                .detail(detail),
        )
        .await
    }

    /// Record a failed action.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn log_failure(
        &self,
        principal: &Principal,
        action: &str,
        error_message: &str,
        detail: serde_json::Value,
    ) -> AuditResult<AuditEntryId> {
        self.write(
            AuditRecord::new(action)
                .principal(principal)
                .status(AuditStatus::Failure)
                .severity(Severity::Medium)
                .error_message(error_message)
                .detail(detail),
        )
        .await
    }

    /// Record a security event at the given severity.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn log_security_event(
        &self,
        principal: &Principal,
        action: &str,
        target: &str,
        severity: Severity,
        detail: serde_json::Value,
    ) -> AuditResult<AuditEntryId> {
        self.write(
            AuditRecord::new(action)
                .principal(principal)
                .target(target)
                .severity(severity)
                .detail(detail),
        )
        .await
    }

    /// Record the start of a scan job.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn log_scan_start(
        &self,
        principal: &Principal,
        scan_id: &str,
        scan_type: &str,
        target: &str,
        authorization_proof: &str,
    ) -> AuditResult<AuditEntryId> {
        self.write(
            AuditRecord::new(format!("scan_{scan_type}_initiated"))
                .principal(principal)
                .resource("scan_job", scan_id)
                .target(target)
                .authorization_proof(authorization_proof)
                .detail(json!({
                    "scan_id": scan_id,
                    "scan_type": scan_type,
                    "target": target,
                })),
        )
        .await
    }

    /// Record an unauthenticated access attempt.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub async fn log_unauthorized_access(
        &self,
        source_addr: &str,
        action: &str,
        target: &str,
    ) -> AuditResult<AuditEntryId> {
        self.write(
            AuditRecord::new(action)
                .source_addr(source_addr)
                .target(target)
                .status(AuditStatus::Failure)
                .severity(Severity::High)
                .detail(json!({ "reason": "unauthorized_access_attempt" })),
        )
        .await
    }

    /// Fetch one entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::EntryNotFound`] for an unknown id.
    pub async fn get(&self, id: AuditEntryId) -> AuditResult<AuditEntry> {
        self.store
            .get(id)
            .await?
            .ok_or(AuditError::EntryNotFound { id })
    }

    /// Most recent entries.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `limit` is 0 or above [`MAX_QUERY_LIMIT`].
    pub async fn recent(&self, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        self.store
            .scan(&AuditFilter::All, Some(check_limit(limit)?))
            .await
    }

    /// Most recent entries by one actor.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `limit` is out of range.
    pub async fn by_actor(&self, actor: &UserId, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        self.store
            .scan(&AuditFilter::Actor(actor.clone()), Some(check_limit(limit)?))
            .await
    }

    /// Most recent entries with one action.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `limit` is out of range.
    pub async fn by_action(&self, action: &str, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        self.store
            .scan(&AuditFilter::Action(action.to_owned()), Some(check_limit(limit)?))
            .await
    }

    /// Most recent `high` and `critical` entries.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `limit` is out of range.
    pub async fn elevated(&self, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        self.store
            .scan(&AuditFilter::Elevated, Some(check_limit(limit)?))
            .await
    }

    /// All entries with `start <= timestamp <= end`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `start` is after `end`.
    pub async fn export(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AuditResult<AuditExport> {
        if start > end {
            return Err(AuditError::Validation(format!(
                "export start {start} is after end {end}"
            )));
        }
        let entries = self
            .store
            .scan(&AuditFilter::Range { start, end }, None)
            .await?;
        Ok(AuditExport {
            start,
            end,
            count: entries.len(),
            entries,
        })
    }

    /// Re-derive the signable projection from storage and check it.
    ///
    /// An unsigned entry reports `signed = false, verified = false`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::EntryNotFound`] for an unknown id, or
    /// [`AuditError::Encoding`] if the projection cannot be encoded.
    pub async fn verify(&self, id: AuditEntryId) -> AuditResult<VerificationReport> {
        let entry = self.get(id).await?;
        let verified = match (&entry.signature, &entry.signer_public_key) {
            (Some(signature), Some(public_key)) => {
                AuditSigner::verify(&SignableRecord::project(&entry), signature, public_key)?
            },
            _ => false,
        };
        Ok(VerificationReport {
            entry_id: id,
            signed: entry.is_signed(),
            verified,
            signer_public_key: entry.signer_public_key,
            signed_at: entry.signed_at,
        })
    }

    /// Queue up to `limit` still-unsigned entries for signing.
    ///
    /// One bounded pass; returns how many were queued.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the scan fails.
    pub async fn backfill_signatures(&self, limit: usize) -> AuditResult<usize> {
        let pending = self.store.scan(&AuditFilter::Unsigned, Some(limit)).await?;
        let queued = pending
            .iter()
            .filter(|entry| self.queue.enqueue(entry.id))
            .count();
        if queued > 0 {
            info!(queued, "Queued unsigned audit entries for signing");
        }
        Ok(queued)
    }

    /// Total stored entries.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the count fails.
    pub async fn count(&self) -> AuditResult<u64> {
        self.store.count().await
    }

    /// Public key new signatures are made with.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    /// Stop the signing workers.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.queue.shutdown(mode).await;
    }
}
