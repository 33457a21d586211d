//! Request-scoped caller identity.

use serde::{Deserialize, Serialize};

use crate::types::{SessionId, UserId};

/// The verified caller of an operation.
///
/// Built once per request by the credential layer (or by the gateway after
/// resolving a session token) and passed explicitly to every audited
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Verified user identifier.
    pub user_id: UserId,
    /// Session the request arrived on, if any.
    pub session_id: Option<SessionId>,
    /// Remote address of the caller.
    pub source_addr: Option<String>,
    /// User agent reported by the caller.
    pub user_agent: Option<String>,
}

impl Principal {
    /// Create a principal for a user with no session context.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            source_addr: None,
            user_agent: None,
        }
    }

    /// Attach the session the request arrived on.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach the caller's remote address.
    #[must_use]
    pub fn with_source_addr(mut self, addr: impl Into<String>) -> Self {
        self.source_addr = Some(addr.into());
        self
    }

    /// Attach the caller's user agent.
    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}
