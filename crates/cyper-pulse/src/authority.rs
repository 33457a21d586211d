//! External authorization authority consulted on every pulse.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cyper_core::{Session, SessionId};

use crate::error::{PulseError, PulseResult};

/// What the authority says about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityDecision {
    /// Still authorized with these features.
    Authorized {
        /// Granted feature names.
        features: Vec<String>,
    },
    /// Authorization withdrawn.
    Revoked {
        /// Human-readable reason, forwarded to the user's clients.
        reason: String,
    },
    /// Authorization lapsed.
    Expired,
}

/// Re-verifies a live session.
///
/// An unreachable authority must be reported as
/// [`PulseError::AuthorityUnreachable`], never as an authorization.
#[async_trait]
pub trait AuthorizationAuthority: Send + Sync + std::fmt::Debug {
    /// Check whether `session` is still authorized.
    async fn reverify(&self, session: &Session) -> PulseResult<AuthorityDecision>;
}

/// Authority that authorizes every session with a fixed feature set.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthority {
    features: Vec<String>,
}

impl StaticAuthority {
    /// Grant `features` to every session.
    #[must_use]
    pub fn new(features: Vec<String>) -> Self {
        Self { features }
    }
}

#[async_trait]
impl AuthorizationAuthority for StaticAuthority {
    async fn reverify(&self, _session: &Session) -> PulseResult<AuthorityDecision> {
        Ok(AuthorityDecision::Authorized {
            features: self.features.clone(),
        })
    }
}

/// Scripted answer for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Answer with this decision.
    Decide(AuthorityDecision),
    /// Fail as unreachable.
    Unreachable,
    /// Answer authorized after a delay.
    Slow(Duration),
    /// Never answer.
    Hang,
}

/// Authority whose answers are set per session, for tests and drills.
///
/// Sessions without a script are authorized with the default features.
#[derive(Debug, Default)]
pub struct ScriptedAuthority {
    default_features: Vec<String>,
    scripts: Mutex<HashMap<SessionId, ScriptedOutcome>>,
}

impl ScriptedAuthority {
    /// Authorize unscripted sessions with `default_features`.
    #[must_use]
    pub fn new(default_features: Vec<String>) -> Self {
        Self {
            default_features,
            scripts: Mutex::new(HashMap::new()),
        }
    }

    /// Set the answer for a session.
    pub fn script(&self, session_id: SessionId, outcome: ScriptedOutcome) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, outcome);
    }

    /// Revert a session to the default answer.
    pub fn clear(&self, session_id: SessionId) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);
    }

    fn outcome(&self, session_id: SessionId) -> Option<ScriptedOutcome> {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned()
    }
}

#[async_trait]
impl AuthorizationAuthority for ScriptedAuthority {
    async fn reverify(&self, session: &Session) -> PulseResult<AuthorityDecision> {
        let authorized = AuthorityDecision::Authorized {
            features: self.default_features.clone(),
        };
        match self.outcome(session.id) {
            None => Ok(authorized),
            Some(ScriptedOutcome::Decide(decision)) => Ok(decision),
            Some(ScriptedOutcome::Unreachable) => Err(PulseError::AuthorityUnreachable(
                "scripted outage".into(),
            )),
            Some(ScriptedOutcome::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(authorized)
            },
            Some(ScriptedOutcome::Hang) => std::future::pending().await,
        }
    }
}
