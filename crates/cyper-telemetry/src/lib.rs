//! Cyper Telemetry - Logging setup for the gateway.
//!
//! Components log through `tracing` with structured fields; this crate
//! installs the process-wide subscriber that formats and routes them.
//!
//! ```rust,no_run
//! use cyper_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), cyper_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("cyper_events=debug");
//! setup_logging(&config)?;
//! tracing::info!("gateway starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_logging,
};
