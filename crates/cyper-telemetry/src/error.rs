//! Telemetry error types.

use cyper_core::{Classify, ErrorClass};
use thiserror::Error;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid logging configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber could not be installed.
    #[error("Initialization error: {0}")]
    InitError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Classify for TelemetryError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::ConfigError(_) => ErrorClass::Validation,
            Self::InitError(_) | Self::IoError(_) => ErrorClass::TransientInfrastructure,
        }
    }
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
