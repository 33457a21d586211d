//! Error types for metrics registration and export.

use cyper_core::{Classify, ErrorClass};

/// Errors produced while building or encoding metrics.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A metric was rejected by the registry (bad name or duplicate).
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    /// The text exposition could not be produced.
    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

impl Classify for MetricsError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Registration(_) => ErrorClass::Validation,
            Self::Encoding(_) => ErrorClass::TransientInfrastructure,
        }
    }
}

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;
