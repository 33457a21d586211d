//! Audit entry types.
//!
//! An [`AuditEntry`] is immutable once persisted, except for its three
//! signature fields which move from empty to populated exactly once.

use std::fmt;

use chrono::{DateTime, Utc};
use cyper_core::{Principal, SessionId, UserId};
use cyper_crypto::{PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Longest accepted action name.
pub const MAX_ACTION_LEN: usize = 128;

/// Monotonic audit entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(pub u64);

impl AuditEntryId {
    /// Storage key for this id. Fixed width so key order equals id order.
    #[must_use]
    pub fn storage_key(self) -> String {
        format!("{:020}", self.0)
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// The action succeeded.
    #[default]
    Success,
    /// The action was refused or failed validation.
    Failure,
    /// The action failed on an internal error.
    Error,
}

impl AuditStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgent the event is for an operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Immediate attention.
    Critical,
    /// Security-relevant, needs review.
    High,
    /// Notable.
    Medium,
    /// Minor.
    Low,
    /// Routine.
    #[default]
    Info,
}

impl Severity {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    /// `high` or `critical`.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic identifier.
    pub id: AuditEntryId,
    /// Acting user, if known.
    pub actor: Option<UserId>,
    /// Session the action arrived on.
    pub session_id: Option<SessionId>,
    /// What happened, e.g. `login_success`.
    pub action: String,
    /// Kind of resource acted on.
    pub resource_type: Option<String>,
    /// Identifier of the resource acted on.
    pub resource_id: Option<String>,
    /// Free-form target (host, URL, ...).
    pub target: Option<String>,
    /// Proof of authorization presented for the action.
    pub authorization_proof: Option<String>,
    /// Remote address of the caller.
    pub source_addr: Option<String>,
    /// User agent of the caller.
    pub user_agent: Option<String>,
    /// Outcome.
    pub status: AuditStatus,
    /// Error text for failed actions.
    pub error_message: Option<String>,
    /// Operator urgency.
    pub severity: Severity,
    /// Unsigned enrichment data.
    pub detail: serde_json::Value,
    /// When the entry was written (microsecond precision).
    pub timestamp: DateTime<Utc>,
    /// Signature over the signable projection.
    pub signature: Option<Signature>,
    /// Key that produced `signature`.
    pub signer_public_key: Option<PublicKey>,
    /// When the signature was attached.
    pub signed_at: Option<DateTime<Utc>>,
}

impl AuditEntry {
    /// Whether the signature fields are populated.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signature.is_some() && self.signer_public_key.is_some()
    }
}

/// Input to [`AuditTrail::write`](crate::AuditTrail::write).
///
/// Status defaults to `success` and severity to `info` when not set.
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    pub(crate) action: String,
    pub(crate) actor: Option<UserId>,
    pub(crate) session_id: Option<SessionId>,
    pub(crate) resource_type: Option<String>,
    pub(crate) resource_id: Option<String>,
    pub(crate) target: Option<String>,
    pub(crate) authorization_proof: Option<String>,
    pub(crate) source_addr: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) status: Option<AuditStatus>,
    pub(crate) error_message: Option<String>,
    pub(crate) severity: Option<Severity>,
    pub(crate) detail: Option<serde_json::Value>,
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

impl AuditRecord {
    /// Start a record for `action`.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Attribute the record to a verified caller.
    #[must_use]
    pub fn principal(mut self, principal: &Principal) -> Self {
        self.actor = Some(principal.user_id.clone());
        self.session_id = principal.session_id;
        self.source_addr.clone_from(&principal.source_addr);
        self.user_agent.clone_from(&principal.user_agent);
        self
    }

    /// Set the acting user without session context.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<UserId>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set the resource acted on. Empty strings are stored as absent.
    #[must_use]
    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource_type = non_empty(kind);
        self.resource_id = non_empty(id);
        self
    }

    /// Set the target.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = non_empty(target);
        self
    }

    /// Set the authorization proof.
    #[must_use]
    pub fn authorization_proof(mut self, proof: impl Into<String>) -> Self {
        self.authorization_proof = non_empty(proof);
        self
    }

    /// Set the caller address.
    #[must_use]
    pub fn source_addr(mut self, addr: impl Into<String>) -> Self {
        self.source_addr = non_empty(addr);
        self
    }

    /// Set the outcome.
    #[must_use]
    pub fn status(mut self, status: AuditStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the error text.
    #[must_use]
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = non_empty(message);
        self
    }

    /// Set the severity.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach unsigned detail.
    #[must_use]
    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub(crate) fn validate(&self) -> AuditResult<()> {
        let action = self.action.trim();
        if action.is_empty() {
            return Err(AuditError::Validation("action must not be empty".into()));
        }
        if action.len() > MAX_ACTION_LEN {
            return Err(AuditError::Validation(format!(
                "action exceeds {MAX_ACTION_LEN} bytes"
            )));
        }
        if action.chars().any(char::is_control) {
            return Err(AuditError::Validation(
                "action must not contain control characters".into(),
            ));
        }
        Ok(())
    }

    /// Materialize the record with its assigned id and write time.
    pub(crate) fn into_entry(self, id: AuditEntryId, timestamp: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id,
            actor: self.actor,
            session_id: self.session_id,
            action: self.action.trim().to_owned(),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            target: self.target,
            authorization_proof: self.authorization_proof,
            source_addr: self.source_addr,
            user_agent: self.user_agent,
            status: self.status.unwrap_or_default(),
            error_message: self.error_message,
            severity: self.severity.unwrap_or_default(),
            detail: self
                .detail
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            timestamp: cyper_core::clock::truncate_to_micros(timestamp),
            signature: None,
            signer_public_key: None,
            signed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let entry = AuditRecord::new("login_success").into_entry(AuditEntryId(1), Utc::now());

        assert_eq!(entry.status, AuditStatus::Success);
        assert_eq!(entry.severity, Severity::Info);
        assert_eq!(entry.detail, serde_json::json!({}));
        assert!(!entry.is_signed());
    }

    #[test]
    fn test_record_from_principal() {
        let session = SessionId::new();
        let principal = Principal::new("u1")
            .with_session(session)
            .with_source_addr("10.0.0.1");

        let entry = AuditRecord::new("scan_view")
            .principal(&principal)
            .resource("", "42")
            .into_entry(AuditEntryId(7), Utc::now());

        assert_eq!(entry.actor, Some(UserId::from("u1")));
        assert_eq!(entry.session_id, Some(session));
        assert_eq!(entry.source_addr.as_deref(), Some("10.0.0.1"));
        assert!(entry.resource_type.is_none());
        assert_eq!(entry.resource_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_record_validation() {
        assert!(AuditRecord::new("  ").validate().is_err());
        assert!(AuditRecord::new("a".repeat(MAX_ACTION_LEN + 1)).validate().is_err());
        assert!(AuditRecord::new("bad\naction").validate().is_err());
        assert!(AuditRecord::new("login_success").validate().is_ok());
    }

    #[test]
    fn test_severity_elevation() {
        assert!(Severity::Critical.is_elevated());
        assert!(Severity::High.is_elevated());
        assert!(!Severity::Medium.is_elevated());
        assert!(!Severity::Info.is_elevated());
    }

    #[test]
    fn test_entry_id_storage_key_orders_numerically() {
        assert!(AuditEntryId(9).storage_key() < AuditEntryId(10).storage_key());
        assert_eq!(AuditEntryId(1).storage_key().len(), 20);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AuditStatus::Failure).unwrap(),
            "\"failure\""
        );
    }
}
