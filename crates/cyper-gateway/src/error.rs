//! Gateway error types.

use cyper_audit::AuditError;
use cyper_config::ConfigError;
use cyper_core::{Classify, ErrorClass};
use cyper_events::EventsError;
use cyper_metrics::MetricsError;
use cyper_pulse::PulseError;
use cyper_storage::StorageError;
use cyper_telemetry::TelemetryError;
use thiserror::Error;

/// Errors from wiring and running the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be set up.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Audit trail error.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// Session or pulse error.
    #[error("pulse error: {0}")]
    Pulse(#[from] PulseError),

    /// Realtime hub or connection error.
    #[error("realtime error: {0}")]
    Events(#[from] EventsError),

    /// Metrics registry error.
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// The connection presented no usable credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for GatewayError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Config(e) => e.class(),
            Self::Telemetry(e) => e.class(),
            Self::Storage(e) => e.class(),
            Self::Audit(e) => e.class(),
            Self::Pulse(e) => e.class(),
            Self::Events(e) => e.class(),
            Self::Metrics(e) => e.class(),
            Self::Unauthorized(_) => ErrorClass::Validation,
            Self::Io(_) => ErrorClass::TransientInfrastructure,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
