//! Gateway composition root.
//!
//! Every component is built once here and handed to its consumers by `Arc`.
//! Startup order: store, metrics, signer, audit trail, session store, hub,
//! pulse, listener. Shutdown runs in reverse: listener and exporter, pulse
//! and hub, then the signing pool under the configured shutdown mode, then
//! the store.

use std::sync::Arc;
use std::time::Duration;

use cyper_audit::{AuditSigner, AuditStore, AuditTrail, KvAuditStore, ShutdownMode};
use cyper_config::Config;
use cyper_core::{Clock, SystemClock};
use cyper_events::{ConnectionOptions, EventHub};
use cyper_metrics::{MetricsRegistry, SharedMetricsRegistry};
use cyper_pulse::{
    AuthorizationAuthority, AuthorizationPulse, KvSessionStore, PulseStore, SessionStore,
    StaticAuthority,
};
use cyper_storage::{KvStore, MemoryKvStore, SurrealKvStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::TokenAuthenticator;
use crate::config_bridge;
use crate::error::GatewayResult;
use crate::exporter::serve_metrics;
use crate::notifier::RealtimeNotifier;
use crate::server::RealtimeServer;

/// The opened durable store. The on-disk backend is kept typed so it can be
/// closed at shutdown.
struct OpenedStore {
    kv: Arc<dyn KvStore>,
    disk: Option<Arc<SurrealKvStore>>,
}

fn open_store(config: &Config) -> GatewayResult<OpenedStore> {
    match (config.storage.backend.as_str(), &config.storage.path) {
        ("surrealkv", Some(path)) => {
            let disk = Arc::new(SurrealKvStore::open(path)?);
            info!(path, "Opened SurrealKV store");
            Ok(OpenedStore {
                kv: Arc::clone(&disk) as Arc<dyn KvStore>,
                disk: Some(disk),
            })
        },
        (backend, _) => {
            if backend != "memory" {
                warn!(backend, "Unrecognized storage backend, using memory");
            }
            warn!("Using in-memory storage; sessions and audit entries are lost on exit");
            Ok(OpenedStore {
                kv: Arc::new(MemoryKvStore::new()),
                disk: None,
            })
        },
    }
}

/// The running gateway's components.
pub struct Gateway {
    config: Config,
    disk: Option<Arc<SurrealKvStore>>,
    sessions: Arc<KvSessionStore>,
    audit: Arc<AuditTrail>,
    hub: Arc<EventHub>,
    pulse: Arc<AuthorizationPulse>,
    server: Arc<RealtimeServer>,
    metrics: SharedMetricsRegistry,
    shutdown_mode: ShutdownMode,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("bind_addr", &self.config.gateway.bind_addr)
            .field("persistent", &self.disk.is_some())
            .field("metrics_enabled", &self.config.metrics.enabled)
            .field("shutdown_mode", &self.shutdown_mode)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Build the gateway from configuration with the system clock and the
    /// built-in authority.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the signing keys
    /// are unusable.
    pub fn build(config: Config) -> GatewayResult<Self> {
        let store = open_store(&config)?;
        let authority: Arc<dyn AuthorizationAuthority> =
            Arc::new(StaticAuthority::new(config.pulse.granted_features.clone()));
        Self::assemble(config, store, Arc::new(SystemClock), authority)
    }

    /// Build the gateway over an existing store, clock and authority.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn with_components(
        config: Config,
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        authority: Arc<dyn AuthorizationAuthority>,
    ) -> GatewayResult<Self> {
        Self::assemble(config, OpenedStore { kv, disk: None }, clock, authority)
    }

    fn assemble(
        config: Config,
        store: OpenedStore,
        clock: Arc<dyn Clock>,
        authority: Arc<dyn AuthorizationAuthority>,
    ) -> GatewayResult<Self> {
        let shutdown_mode = config_bridge::shutdown_mode(&config.audit)?;
        let metrics = MetricsRegistry::shared()?;

        let signer = AuditSigner::from_key_material(
            config.signing.private_key.as_deref(),
            config.signing.public_key.as_deref(),
            config.signing.allow_ephemeral,
        )?;

        // The signing pool stops on its own token so that shutdown can
        // drain it after every producer has stopped.
        let audit_store: Arc<dyn AuditStore> = Arc::new(KvAuditStore::new(Arc::clone(&store.kv))?);
        let audit = Arc::new(AuditTrail::instrumented(
            audit_store,
            Arc::new(signer),
            Arc::clone(&clock),
            config_bridge::signing_options(&config.audit),
            Some(Arc::clone(&metrics)),
            &CancellationToken::new(),
        ));

        let sessions = Arc::new(KvSessionStore::new(Arc::clone(&store.kv))?);
        let hub = Arc::new(
            EventHub::new(
                config_bridge::hub_options(&config.realtime),
                Arc::clone(&clock),
            )
            .with_metrics(Arc::clone(&metrics)),
        );

        let pulse = Arc::new(
            AuthorizationPulse::new(
                Arc::clone(&sessions) as Arc<dyn SessionStore>,
                Arc::clone(&sessions) as Arc<dyn PulseStore>,
                authority,
                Arc::clone(&clock),
                config_bridge::pulse_options(&config.pulse),
            )
            .with_hub(Arc::clone(&hub))
            .with_audit(Arc::clone(&audit))
            .with_metrics(Arc::clone(&metrics)),
        );

        let connection_options: ConnectionOptions =
            config_bridge::connection_options(&config.realtime);
        let server = Arc::new(
            RealtimeServer::new(
                Arc::clone(&hub),
                TokenAuthenticator::new(Arc::clone(&sessions) as Arc<dyn SessionStore>, clock),
                connection_options,
            )
            .with_audit(Arc::clone(&audit))
            .with_metrics(Arc::clone(&metrics)),
        );

        Ok(Self {
            config,
            disk: store.disk,
            sessions,
            audit,
            hub,
            pulse,
            server,
            metrics,
            shutdown_mode,
            cancel: CancellationToken::new(),
        })
    }

    /// Bind the configured listener address.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the address cannot be bound.
    pub async fn bind(&self) -> GatewayResult<TcpListener> {
        Ok(TcpListener::bind(&self.config.gateway.bind_addr).await?)
    }

    /// Bind the metrics exporter address, if the exporter is enabled.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the address cannot be bound.
    pub async fn bind_metrics(&self) -> GatewayResult<Option<TcpListener>> {
        if !self.config.metrics.enabled {
            return Ok(None);
        }
        Ok(Some(TcpListener::bind(&self.config.metrics.bind_addr).await?))
    }

    /// Session records.
    #[must_use]
    pub fn sessions(&self) -> &Arc<KvSessionStore> {
        &self.sessions
    }

    /// Audit trail.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    /// Realtime hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Authorization pulse.
    #[must_use]
    pub fn pulse(&self) -> &Arc<AuthorizationPulse> {
        &self.pulse
    }

    /// Metrics shared by every component.
    #[must_use]
    pub fn metrics(&self) -> &SharedMetricsRegistry {
        &self.metrics
    }

    /// Typed event publisher over the hub.
    #[must_use]
    pub fn notifier(&self) -> RealtimeNotifier {
        RealtimeNotifier::new(Arc::clone(&self.hub))
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Serve on `listener` until shutdown is requested, then stop every
    /// component. The metrics exporter runs alongside when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter address cannot be bound, or the
    /// listener's error. Shutdown problems are logged.
    pub async fn run(&self, listener: TcpListener) -> GatewayResult<()> {
        let exporter_task = self.bind_metrics().await?.map(|metrics_listener| {
            let registry = Arc::clone(&self.metrics);
            let cancel = self.cancel.clone();
            tokio::spawn(serve_metrics(metrics_listener, registry, cancel))
        });

        if self.config.audit.backfill_on_start {
            if let Err(e) = self
                .audit
                .backfill_signatures(self.config.audit.backfill_limit)
                .await
            {
                warn!(error = %e, "Audit signature backfill failed");
            }
        }

        let hub_task = {
            let hub = Arc::clone(&self.hub);
            let cancel = self.cancel.clone();
            tokio::spawn(async move { hub.run(cancel).await })
        };
        let pulse_task = {
            let pulse = Arc::clone(&self.pulse);
            let cancel = self.cancel.clone();
            tokio::spawn(async move { pulse.run(cancel).await })
        };

        let grace = Duration::from_secs(self.config.gateway.shutdown_timeout_secs);
        let served = Arc::clone(&self.server)
            .serve(listener, self.cancel.clone(), grace)
            .await;
        // The listener only returns early on error; stop everything else too.
        self.cancel.cancel();

        let stopped = tokio::time::timeout(grace, async {
            if let Some(exporter) = exporter_task {
                match exporter.await {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => warn!(error = %e, "Metrics exporter failed"),
                    Err(e) => warn!(error = %e, "Metrics exporter task failed"),
                }
            }
            if let Err(e) = pulse_task.await {
                warn!(error = %e, "Pulse task failed");
            }
            if let Err(e) = hub_task.await {
                warn!(error = %e, "Hub task failed");
            }
        })
        .await;
        if stopped.is_err() {
            warn!("Background tasks did not stop within the shutdown timeout");
        }

        info!(mode = ?self.shutdown_mode, "Stopping audit signing");
        if tokio::time::timeout(grace, self.audit.shutdown(self.shutdown_mode))
            .await
            .is_err()
        {
            warn!("Audit signing did not stop within the shutdown timeout");
        }

        if let Some(disk) = &self.disk
            && let Err(e) = disk.close().await
        {
            warn!(error = %e, "Failed to close store");
        }

        info!("Gateway stopped");
        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        Config::default()
    }

    #[tokio::test]
    async fn test_build_with_defaults() {
        let gateway = Gateway::build(memory_config()).unwrap();
        assert!(gateway.disk.is_none());
        assert_eq!(gateway.shutdown_mode, ShutdownMode::Drain);
        assert_eq!(gateway.hub().client_count().await, 0);
    }

    #[tokio::test]
    async fn test_bad_key_material_fails_build() {
        let mut config = memory_config();
        config.signing.private_key = Some("not-base64!".into());
        config.signing.public_key = Some("also-not".into());
        assert!(Gateway::build(config).is_err());
    }

    #[tokio::test]
    async fn test_surrealkv_backend_opens_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config();
        config.storage.backend = "surrealkv".into();
        config.storage.path = Some(dir.path().join("data").display().to_string());

        let gateway = Gateway::build(config).unwrap();
        assert!(gateway.disk.is_some());
        if let Some(disk) = &gateway.disk {
            disk.close().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut config = memory_config();
        config.gateway.bind_addr = "127.0.0.1:0".into();
        config.gateway.shutdown_timeout_secs = 5;
        let gateway = Arc::new(Gateway::build(config).unwrap());
        let listener = gateway.bind().await.unwrap();

        let runner = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.run(listener).await })
        };
        tokio::task::yield_now().await;
        gateway.shutdown();
        runner.await.unwrap().unwrap();

        assert!(matches!(
            gateway.notifier().system_status(serde_json::json!({})).await,
            Err(cyper_events::EventsError::HubClosed)
        ));
    }

    #[tokio::test]
    async fn test_exporter_serves_shared_registry() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Reserve a free port for the exporter, then release it.
        let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let metrics_addr = reserved.local_addr().unwrap();
        drop(reserved);

        let mut config = memory_config();
        config.gateway.bind_addr = "127.0.0.1:0".into();
        config.gateway.shutdown_timeout_secs = 5;
        config.metrics.enabled = true;
        config.metrics.bind_addr = metrics_addr.to_string();
        let gateway = Arc::new(Gateway::build(config).unwrap());
        let listener = gateway.bind().await.unwrap();

        let principal = cyper_core::Principal::new("u1");
        gateway
            .audit()
            .log_action(&principal, "report_download", "r-1", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(
            gateway.metrics().metrics().audit_entry_count("info", "report_download"),
            1
        );

        let runner = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.run(listener).await })
        };

        let mut stream = loop {
            match tokio::net::TcpStream::connect(metrics_addr).await {
                Ok(stream) => break stream,
                Err(_) => tokio::task::yield_now().await,
            }
        };
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("cyper_audit_entries_total"));
        assert!(response.contains("report_download"));

        gateway.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_disabled_exporter_binds_nothing() {
        let gateway = Gateway::build(memory_config()).unwrap();
        assert!(gateway.bind_metrics().await.unwrap().is_none());
    }
}
