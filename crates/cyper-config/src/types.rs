//! Configuration types for the Cyper gateway.
//!
//! Every section implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header yields a working setup.
//! Conversion into component option types happens in the gateway.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener and process settings.
    pub gateway: GatewaySection,
    /// Authorization pulse schedule.
    pub pulse: PulseSection,
    /// Audit signing pool.
    pub audit: AuditSection,
    /// Audit signing key material.
    pub signing: SigningSection,
    /// Realtime hub and connection limits.
    pub realtime: RealtimeSection,
    /// Durable store backend.
    pub storage: StorageSection,
    /// Log output.
    pub logging: LoggingSection,
    /// Prometheus exporter.
    pub metrics: MetricsSection,
}

// ---------------------------------------------------------------------------
// GatewaySection
// ---------------------------------------------------------------------------

/// Listener and process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Socket address for the realtime listener.
    pub bind_addr: String,
    /// Grace period for background tasks at shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            shutdown_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// PulseSection
// ---------------------------------------------------------------------------

/// Authorization pulse schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseSection {
    /// Seconds between regular ticks.
    pub interval_secs: u64,
    /// Seconds before re-checking sessions whose last check failed.
    pub error_retry_secs: u64,
    /// Upper bound on one session's check.
    pub session_timeout_secs: u64,
    /// Sessions checked concurrently.
    pub max_concurrency: usize,
    /// Features granted by the built-in authority.
    pub granted_features: Vec<String>,
}

impl Default for PulseSection {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            error_retry_secs: 30,
            session_timeout_secs: 10,
            max_concurrency: 16,
            granted_features: vec!["scan".to_owned(), "report".to_owned(), "realtime".to_owned()],
        }
    }
}

// ---------------------------------------------------------------------------
// AuditSection
// ---------------------------------------------------------------------------

/// Audit signing pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Signing worker tasks.
    pub signing_workers: usize,
    /// Signing queue slots.
    pub signing_queue_capacity: usize,
    /// `"drain"` signs queued entries at shutdown; `"abandon"` leaves them
    /// unsigned.
    pub shutdown_mode: String,
    /// Queue unsigned entries for signing at startup.
    pub backfill_on_start: bool,
    /// Maximum entries queued by the startup backfill.
    pub backfill_limit: usize,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            signing_workers: 4,
            signing_queue_capacity: 1024,
            shutdown_mode: "drain".to_owned(),
            backfill_on_start: true,
            backfill_limit: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// SigningSection
// ---------------------------------------------------------------------------

/// Audit signing key material, base64 encoded.
///
/// The private key never appears in `Debug` or serialized output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    /// Private key (32-byte seed or 64-byte seed and public key).
    pub private_key: Option<String>,
    /// Public key.
    pub public_key: Option<String>,
    /// Generate a throwaway key pair when none is configured.
    pub allow_ephemeral: bool,
}

impl Default for SigningSection {
    fn default() -> Self {
        Self {
            private_key: None,
            public_key: None,
            allow_ephemeral: true,
        }
    }
}

impl std::fmt::Debug for SigningSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSection")
            .field("has_private_key", &self.private_key.is_some())
            .field("public_key", &self.public_key)
            .field("allow_ephemeral", &self.allow_ephemeral)
            .finish()
    }
}

impl Serialize for SigningSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SigningSection", 2)?;
        state.serialize_field("public_key", &self.public_key)?;
        state.serialize_field("allow_ephemeral", &self.allow_ephemeral)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// RealtimeSection
// ---------------------------------------------------------------------------

/// Realtime hub and per-connection limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSection {
    /// Outbound slots per client.
    pub client_queue: usize,
    /// Slots in the hub's publish queue.
    pub publish_queue: usize,
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,
    /// Seconds of client silence before disconnect.
    pub read_deadline_secs: u64,
    /// Seconds allowed to write one frame.
    pub write_timeout_secs: u64,
    /// Largest accepted inbound message.
    pub max_message_bytes: usize,
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            client_queue: 256,
            publish_queue: 256,
            ping_interval_secs: 54,
            read_deadline_secs: 60,
            write_timeout_secs: 10,
            max_message_bytes: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageSection
// ---------------------------------------------------------------------------

/// Durable store backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// `"memory"` or `"surrealkv"`.
    pub backend: String,
    /// Data directory for `surrealkv`.
    pub path: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsSection
// ---------------------------------------------------------------------------

/// Prometheus exporter. Metrics are recorded either way; this only controls
/// whether `/metrics` is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Serve `/metrics`.
    pub enabled: bool,
    /// Socket address for the exporter.
    pub bind_addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: "127.0.0.1:9100".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level filter.
    pub level: String,
    /// `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// `"stdout"`, `"stderr"` or `"file"`.
    pub target: String,
    /// Log directory when `target = "file"`.
    pub file_dir: Option<String>,
    /// Log file name prefix.
    pub file_prefix: String,
    /// Per-crate directives, e.g. `"cyper_events=debug"`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            file_dir: None,
            file_prefix: "cyper".to_owned(),
            directives: Vec::new(),
        }
    }
}
