//! Bearer token authentication for realtime connections.
//!
//! Tokens are never stored. A presented token is reduced to its SHA-256
//! fingerprint and matched against session records.

use std::sync::Arc;

use cyper_core::{Clock, Principal, Session};
use cyper_crypto::TokenFingerprint;
use cyper_pulse::SessionStore;
use tokio_tungstenite::tungstenite::handshake::server::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, USER_AGENT};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Query parameter accepted in place of the `Authorization` header.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Credentials pulled from an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeCredentials {
    /// Bearer token.
    pub token: String,
    /// Client `User-Agent`, if sent.
    pub user_agent: Option<String>,
}

/// Read the bearer token from the `Authorization` header, falling back to
/// the percent-decoded `token` query parameter. Empty values, and query
/// values that do not decode to UTF-8, count as absent.
#[must_use]
pub fn extract_credentials(request: &Request) -> Option<HandshakeCredentials> {
    let from_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned);

    let token = from_header.or_else(|| {
        request.uri().query().and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == TOKEN_QUERY_PARAM)
                .and_then(|(_, value)| urlencoding::decode(value).ok())
                .filter(|token| !token.is_empty())
                .map(std::borrow::Cow::into_owned)
        })
    })?;

    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    Some(HandshakeCredentials { token, user_agent })
}

/// Resolves bearer tokens to active sessions.
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl TokenAuthenticator {
    /// Create an authenticator over `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { sessions, clock }
    }

    /// Resolve `token` to its session. The session must be neither revoked
    /// nor expired. A successful lookup refreshes the session's activity.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] for an unknown or inactive
    /// session, or a pulse error if the store fails.
    pub async fn authenticate(&self, token: &str) -> GatewayResult<Session> {
        let fingerprint = TokenFingerprint::of(token);
        let Some(session) = self.sessions.find_by_fingerprint(fingerprint.as_str()).await? else {
            return Err(GatewayError::Unauthorized("unknown session".into()));
        };

        let now = self.clock.now();
        if session.is_revoked() {
            return Err(GatewayError::Unauthorized("session revoked".into()));
        }
        if session.is_expired(now) {
            return Err(GatewayError::Unauthorized("session expired".into()));
        }

        self.sessions.touch(session.id, now).await?;
        debug!(session_id = %session.id, user_id = %session.user_id, "Session authenticated");
        Ok(session)
    }

    /// Authenticate and build the caller's principal.
    ///
    /// # Errors
    ///
    /// See [`authenticate`](Self::authenticate).
    pub async fn principal(
        &self,
        credentials: &HandshakeCredentials,
        source_addr: &str,
    ) -> GatewayResult<Principal> {
        let session = self.authenticate(&credentials.token).await?;
        let mut principal = Principal::new(session.user_id)
            .with_session(session.id)
            .with_source_addr(source_addr);
        if let Some(agent) = &credentials.user_agent {
            principal = principal.with_user_agent(agent.clone());
        }
        Ok(principal)
    }
}
