//! The signable projection of an audit entry.
//!
//! Only the fields below are ever signed. Detail, severity and the other
//! enrichment columns are left out so they can change without invalidating
//! a signature. Field order is fixed by the struct declaration and the
//! encoding is compact JSON, so equal projections always encode to equal
//! bytes.

use chrono::SecondsFormat;
use serde::Serialize;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};

/// Fixed-order view over the signed fields of an [`AuditEntry`].
///
/// Absent optional fields encode as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignableRecord<'a> {
    id: u64,
    user_id: &'a str,
    action: &'a str,
    resource_type: &'a str,
    resource_id: &'a str,
    target: &'a str,
    status: &'a str,
    source_addr: &'a str,
    timestamp: String,
}

impl<'a> SignableRecord<'a> {
    /// Project the signed fields out of a stored entry.
    #[must_use]
    pub fn project(entry: &'a AuditEntry) -> Self {
        Self {
            id: entry.id.0,
            user_id: entry.actor.as_ref().map_or("", |u| u.as_str()),
            action: &entry.action,
            resource_type: entry.resource_type.as_deref().unwrap_or_default(),
            resource_id: entry.resource_id.as_deref().unwrap_or_default(),
            target: entry.target.as_deref().unwrap_or_default(),
            status: entry.status.as_str(),
            source_addr: entry.source_addr.as_deref().unwrap_or_default(),
            timestamp: entry
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    /// Canonical bytes: compact JSON in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Encoding`] if serialization fails.
    pub fn canonical_bytes(&self) -> AuditResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AuditError::Encoding(e.to_string()))
    }
}
