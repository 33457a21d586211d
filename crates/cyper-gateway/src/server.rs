//! Realtime `WebSocket` listener.
//!
//! Every accepted socket is authenticated during the upgrade: a request
//! without a bearer token is refused with HTTP 401, a token that does not
//! resolve to an active session is closed with policy violation (1008)
//! right after the upgrade. Authenticated sockets are registered with the
//! hub and served until either side ends the session.

use std::sync::Arc;
use std::time::Duration;

use cyper_audit::AuditTrail;
use cyper_events::{ConnectionOptions, EventHub, EventsError, serve_connection};
use cyper_metrics::SharedMetricsRegistry;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{HandshakeCredentials, TokenAuthenticator, extract_credentials};
use crate::error::{GatewayError, GatewayResult};

/// Audit action for rejected realtime connections.
pub const REALTIME_CONNECT_ACTION: &str = "realtime_connect";

/// Pause after a failed `accept` so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

fn unauthorized_response() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("missing bearer token".to_owned()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

/// Send a close frame and drop the socket.
async fn reject<S>(mut ws: WebSocketStream<S>, code: CloseCode, reason: &str, write_timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code,
        reason: reason.to_owned().into(),
    };
    match tokio::time::timeout(write_timeout, ws.close(Some(frame))).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => debug!(error = %e, "Failed to send rejection close frame"),
        Err(_) => debug!("Timed out sending rejection close frame"),
    }
}

/// Accepts, authenticates and serves realtime clients.
#[derive(Debug)]
pub struct RealtimeServer {
    hub: Arc<EventHub>,
    auth: TokenAuthenticator,
    audit: Option<Arc<AuditTrail>>,
    metrics: Option<SharedMetricsRegistry>,
    options: ConnectionOptions,
}

impl RealtimeServer {
    /// Create a server that registers clients with `hub`.
    #[must_use]
    pub fn new(hub: Arc<EventHub>, auth: TokenAuthenticator, options: ConnectionOptions) -> Self {
        Self {
            hub,
            auth,
            audit: None,
            metrics: None,
            options,
        }
    }

    /// Record rejected connections in the audit trail.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Count handshake outcomes (`success`, `rejected`, `error`).
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn count_attempt(&self, status: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.metrics().auth_attempt(status);
        }
    }

    /// Accept connections until `cancel` fires, then give open connections
    /// up to `drain_timeout` to close before aborting them.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the listener address cannot be read.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
        drain_timeout: Duration,
    ) -> GatewayResult<()> {
        info!(addr = %listener.local_addr()?, "Realtime listener started");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&self);
                        let cancel = cancel.clone();
                        connections.spawn(async move {
                            let peer = peer.to_string();
                            if let Err(e) = server.handle_stream(stream, &peer, &cancel).await {
                                debug!(peer, error = %e, "Connection ended with error");
                            }
                        });
                    },
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    },
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {},
            }
        }

        let drained = tokio::time::timeout(drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "Connections still open after drain timeout, aborting"
            );
            connections.abort_all();
        }
        info!("Realtime listener stopped");
        Ok(())
    }

    /// Upgrade, authenticate and serve one connection over `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthorized`] for a rejected connection, or
    /// the transport error that ended an accepted one.
    pub async fn handle_stream<S>(
        &self,
        stream: S,
        peer: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut credentials: Option<HandshakeCredentials> = None;
        let callback = |request: &Request, response: Response| {
            credentials = extract_credentials(request);
            if credentials.is_some() {
                Ok(response)
            } else {
                Err(unauthorized_response())
            }
        };
        let accepted = tokio_tungstenite::accept_hdr_async(stream, callback).await;

        let ws = match accepted {
            Ok(ws) => ws,
            Err(e) => {
                if credentials.is_none() {
                    self.record_rejection(peer, "missing bearer token").await;
                    return Err(GatewayError::Unauthorized("missing bearer token".into()));
                }
                return Err(EventsError::from(e).into());
            },
        };
        let Some(credentials) = credentials else {
            return Err(GatewayError::Unauthorized("missing bearer token".into()));
        };

        let principal = match self.auth.principal(&credentials, peer).await {
            Ok(principal) => principal,
            Err(GatewayError::Unauthorized(reason)) => {
                self.record_rejection(peer, &reason).await;
                reject(ws, CloseCode::Policy, "unauthorized", self.options.write_timeout).await;
                return Err(GatewayError::Unauthorized(reason));
            },
            Err(e) => {
                self.count_attempt("error");
                warn!(peer, error = %e, "Session lookup failed");
                reject(ws, CloseCode::Error, "authentication unavailable", self.options.write_timeout)
                    .await;
                return Err(e);
            },
        };

        self.count_attempt("success");
        let client = self.hub.register_client(principal.user_id.clone()).await;
        debug!(
            connection_id = %client.id,
            user_id = %principal.user_id,
            session_id = ?principal.session_id,
            peer,
            "Realtime client authenticated"
        );
        serve_connection(&self.hub, ws, client, self.options, cancel).await?;
        Ok(())
    }

    async fn record_rejection(&self, peer: &str, reason: &str) {
        self.count_attempt("rejected");
        warn!(peer, reason, "Rejected realtime connection");
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(e) = audit
            .log_unauthorized_access(peer, REALTIME_CONNECT_ACTION, "realtime")
            .await
        {
            warn!(peer, error = %e, "Failed to audit rejected connection");
        }
    }
}
