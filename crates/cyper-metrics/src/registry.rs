//! Metric families and the registry that owns them.

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{MetricsError, MetricsResult};

/// Label values longer than this are cut at a character boundary.
pub const MAX_LABEL_VALUE_LEN: usize = 64;

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// How a signing attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    /// The signature was written back to storage.
    Signed,
    /// Fetching, signing or storing the signature failed.
    Failed,
    /// The entry never reached a worker (queue full or shut down).
    Skipped,
}

impl SignOutcome {
    /// Label value for this outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Every metric the gateway records.
///
/// Cloning shares the underlying collectors.
#[derive(Clone)]
pub struct CyperMetrics {
    audit_entries_total: IntCounterVec,
    audit_signatures_total: IntCounterVec,
    pulse_checks_total: IntCounterVec,
    active_sessions: IntGauge,
    auth_attempts_total: IntCounterVec,
    realtime_clients: IntGauge,
    realtime_drops_total: IntCounterVec,
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> MetricsResult<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> MetricsResult<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn saturating_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl CyperMetrics {
    /// Create the metric families and register them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Registration`] if a name is already taken.
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        Ok(Self {
            audit_entries_total: counter(
                registry,
                "cyper_audit_entries_total",
                "Audit entries written",
                &["severity", "action"],
            )?,
            audit_signatures_total: counter(
                registry,
                "cyper_audit_signatures_total",
                "Audit signing attempts by outcome",
                &["outcome"],
            )?,
            pulse_checks_total: counter(
                registry,
                "cyper_pulse_checks_total",
                "Authorization checks by resulting status",
                &["status"],
            )?,
            active_sessions: gauge(
                registry,
                "cyper_active_sessions",
                "Sessions seen active by the last pulse pass",
            )?,
            auth_attempts_total: counter(
                registry,
                "cyper_auth_attempts_total",
                "Realtime handshake authentication attempts",
                &["status"],
            )?,
            realtime_clients: gauge(
                registry,
                "cyper_realtime_clients",
                "Connected realtime clients",
            )?,
            realtime_drops_total: counter(
                registry,
                "cyper_realtime_drops_total",
                "Realtime clients disconnected by the hub",
                &["reason"],
            )?,
        })
    }

    /// Count one durable audit entry.
    pub fn audit_entry_written(&self, severity: &str, action: &str) {
        self.audit_entries_total
            .with_label_values(&[truncate_label(severity), truncate_label(action)])
            .inc();
    }

    /// Entries written so far for the label pair.
    #[must_use]
    pub fn audit_entry_count(&self, severity: &str, action: &str) -> u64 {
        self.audit_entries_total
            .with_label_values(&[truncate_label(severity), truncate_label(action)])
            .get()
    }

    /// Count one signing attempt.
    pub fn signature_recorded(&self, outcome: SignOutcome) {
        self.audit_signatures_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Signing attempts so far with the given outcome.
    #[must_use]
    pub fn signature_count(&self, outcome: SignOutcome) -> u64 {
        self.audit_signatures_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Count one pulse check that produced `status`.
    pub fn pulse_checked(&self, status: &str) {
        self.pulse_checks_total
            .with_label_values(&[truncate_label(status)])
            .inc();
    }

    /// Pulse checks so far that produced `status`.
    #[must_use]
    pub fn pulse_check_count(&self, status: &str) -> u64 {
        self.pulse_checks_total
            .with_label_values(&[truncate_label(status)])
            .get()
    }

    /// Set the active session gauge.
    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.set(saturating_i64(count));
    }

    /// Current value of the active session gauge.
    #[must_use]
    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    /// Count one handshake authentication attempt.
    pub fn auth_attempt(&self, status: &str) {
        self.auth_attempts_total
            .with_label_values(&[truncate_label(status)])
            .inc();
    }

    /// Handshake attempts so far with the given status.
    #[must_use]
    pub fn auth_attempt_count(&self, status: &str) -> u64 {
        self.auth_attempts_total
            .with_label_values(&[truncate_label(status)])
            .get()
    }

    /// Set the connected client gauge.
    pub fn set_connected_clients(&self, count: usize) {
        self.realtime_clients.set(saturating_i64(count));
    }

    /// Current value of the connected client gauge.
    #[must_use]
    pub fn connected_clients(&self) -> i64 {
        self.realtime_clients.get()
    }

    /// Count one client the hub disconnected.
    pub fn client_dropped(&self, reason: &str) {
        self.realtime_drops_total
            .with_label_values(&[truncate_label(reason)])
            .inc();
    }

    /// Clients dropped so far for `reason`.
    #[must_use]
    pub fn client_drop_count(&self, reason: &str) -> u64 {
        self.realtime_drops_total
            .with_label_values(&[truncate_label(reason)])
            .get()
    }
}

impl std::fmt::Debug for CyperMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CyperMetrics")
            .field("active_sessions", &self.active_sessions())
            .field("connected_clients", &self.connected_clients())
            .finish_non_exhaustive()
    }
}

/// Owns the Prometheus registry and the gateway's metric families.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    metrics: CyperMetrics,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    /// Build a fresh registry with every family registered.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails.
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();
        let metrics = CyperMetrics::new(&registry)?;
        Ok(Self { registry, metrics })
    }

    /// Build a registry already wrapped for sharing.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails.
    pub fn shared() -> MetricsResult<SharedMetricsRegistry> {
        Ok(Arc::new(Self::new()?))
    }

    /// The recording handles.
    #[must_use]
    pub const fn metrics(&self) -> &CyperMetrics {
        &self.metrics
    }

    /// Render every family in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Encoding`] if the encoder fails.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

/// Registry shared across the gateway's components.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

fn truncate_label(value: &str) -> &str {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value;
    }
    let end = value
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= MAX_LABEL_VALUE_LEN)
        .last()
        .unwrap_or(0);
    value.get(..end).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.metrics();

        metrics.audit_entry_written("info", "login_success");
        metrics.audit_entry_written("info", "login_success");
        metrics.audit_entry_written("high", "session_revoked");

        assert_eq!(metrics.audit_entry_count("info", "login_success"), 2);
        assert_eq!(metrics.audit_entry_count("high", "session_revoked"), 1);
        assert_eq!(metrics.audit_entry_count("high", "login_success"), 0);
    }

    #[test]
    fn test_sign_outcomes_counted_separately() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.metrics();

        metrics.signature_recorded(SignOutcome::Signed);
        metrics.signature_recorded(SignOutcome::Signed);
        metrics.signature_recorded(SignOutcome::Failed);

        assert_eq!(metrics.signature_count(SignOutcome::Signed), 2);
        assert_eq!(metrics.signature_count(SignOutcome::Failed), 1);
        assert_eq!(metrics.signature_count(SignOutcome::Skipped), 0);
    }

    #[test]
    fn test_gauges_track_latest_value() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.metrics();

        metrics.set_active_sessions(5);
        metrics.set_active_sessions(3);
        metrics.set_connected_clients(2);

        assert_eq!(metrics.active_sessions(), 3);
        assert_eq!(metrics.connected_clients(), 2);
    }

    #[test]
    fn test_clones_share_collectors() {
        let registry = MetricsRegistry::shared().unwrap();
        let copy = registry.metrics().clone();
        copy.client_dropped("backpressure");
        assert_eq!(registry.metrics().client_drop_count("backpressure"), 1);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = MetricsRegistry::new().unwrap();
        let b = MetricsRegistry::new().unwrap();
        a.metrics().auth_attempt("success");
        assert_eq!(a.metrics().auth_attempt_count("success"), 1);
        assert_eq!(b.metrics().auth_attempt_count("success"), 0);
    }

    #[test]
    fn test_text_exposition() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.metrics();
        metrics.audit_entry_written("info", "login_success");
        metrics.signature_recorded(SignOutcome::Skipped);
        metrics.pulse_checked("authorized");
        metrics.auth_attempt("rejected");
        metrics.client_dropped("backpressure");
        metrics.set_active_sessions(1);

        let text = registry.encode_text().unwrap();
        let entries = text
            .lines()
            .find(|line| line.starts_with("cyper_audit_entries_total{"))
            .unwrap();
        assert!(entries.contains(r#"action="login_success""#));
        assert!(entries.contains(r#"severity="info""#));
        assert!(entries.ends_with(" 1"));
        assert!(text.contains(r#"cyper_audit_signatures_total{outcome="skipped"} 1"#));
        assert!(text.contains(r#"cyper_pulse_checks_total{status="authorized"} 1"#));
        assert!(text.contains(r#"cyper_auth_attempts_total{status="rejected"} 1"#));
        assert!(text.contains(r#"cyper_realtime_drops_total{reason="backpressure"} 1"#));
        assert!(text.contains("cyper_active_sessions 1"));
        assert!(text.contains("cyper_realtime_clients 0"));
    }

    #[test]
    fn test_long_labels_truncated_on_char_boundary() {
        let long = "é".repeat(MAX_LABEL_VALUE_LEN);
        let cut = truncate_label(&long);
        assert!(cut.len() <= MAX_LABEL_VALUE_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate_label("short"), "short");

        let registry = MetricsRegistry::new().unwrap();
        registry.metrics().pulse_checked(&long);
        assert_eq!(registry.metrics().pulse_check_count(cut), 1);
    }
}
