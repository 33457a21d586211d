//! Pulse records: the per-session history of authorization checks.

use std::fmt;

use chrono::{DateTime, Utc};
use cyper_core::SessionId;
use serde::{Deserialize, Serialize};

/// Outcome of one authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseStatus {
    /// Still authorized.
    Authorized,
    /// Authorization withdrawn. Terminal.
    Revoked,
    /// Authorization lapsed. Terminal.
    Expired,
    /// The check could not be completed. Retried on a shorter schedule.
    Error,
}

impl PulseStatus {
    /// Whether no further checks follow for the session.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PulseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One check of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseRecord {
    /// Session checked.
    pub session_id: SessionId,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
    /// Result.
    pub status: PulseStatus,
    /// Features granted at check time. Empty unless authorized.
    #[serde(default)]
    pub features: Vec<String>,
    /// When the session is due again; `None` after a terminal status.
    pub next_check_at: Option<DateTime<Utc>>,
    /// Revocation reason or error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PulseRecord {
    /// Authorized with the given features.
    #[must_use]
    pub fn authorized(
        session_id: SessionId,
        checked_at: DateTime<Utc>,
        features: Vec<String>,
        next_check_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            checked_at,
            status: PulseStatus::Authorized,
            features,
            next_check_at: Some(next_check_at),
            reason: None,
        }
    }

    /// Revoked for `reason`.
    #[must_use]
    pub fn revoked(session_id: SessionId, checked_at: DateTime<Utc>, reason: String) -> Self {
        Self {
            session_id,
            checked_at,
            status: PulseStatus::Revoked,
            features: Vec::new(),
            next_check_at: None,
            reason: Some(reason),
        }
    }

    /// Expired.
    #[must_use]
    pub fn expired(session_id: SessionId, checked_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            checked_at,
            status: PulseStatus::Expired,
            features: Vec::new(),
            next_check_at: None,
            reason: None,
        }
    }

    /// Check failed; due again at `retry_at`.
    #[must_use]
    pub fn error(
        session_id: SessionId,
        checked_at: DateTime<Utc>,
        reason: String,
        retry_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            checked_at,
            status: PulseStatus::Error,
            features: Vec::new(),
            next_check_at: Some(retry_at),
            reason: Some(reason),
        }
    }
}
