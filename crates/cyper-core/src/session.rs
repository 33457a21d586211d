//! Authenticated session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{SessionId, UserId};

/// A login session.
///
/// Created at login, mutated only by revocation or activity refresh. Sessions
/// are never deleted; they expire or are revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Owning user.
    pub user_id: UserId,
    /// SHA-256 hex fingerprint of the bearer token. The token itself is
    /// never stored.
    pub token_fingerprint: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
    /// When the session was revoked, if it was.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Last time the session was used.
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `expires_at` is not strictly after
    /// `created_at` or the fingerprint is empty.
    pub fn new(
        user_id: UserId,
        token_fingerprint: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if expires_at <= created_at {
            return Err(CoreError::Validation(format!(
                "session expiry {expires_at} must be after creation {created_at}"
            )));
        }
        let token_fingerprint = token_fingerprint.into();
        if token_fingerprint.is_empty() {
            return Err(CoreError::Validation(
                "session token fingerprint must not be empty".into(),
            ));
        }
        Ok(Self {
            id: SessionId::new(),
            user_id,
            token_fingerprint,
            created_at,
            expires_at,
            revoked_at: None,
            last_activity_at: created_at,
        })
    }

    /// Whether the session has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the session is neither revoked nor expired at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}
