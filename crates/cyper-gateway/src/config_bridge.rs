//! Bridge from [`cyper_config::Config`] sections to component options.
//!
//! Config carries plain seconds and strings; components take `Duration`s and
//! enums. Everything here assumes the config already passed validation.

use std::time::Duration;

use cyper_audit::{ShutdownMode, SigningOptions};
use cyper_config::{AuditSection, LoggingSection, PulseSection, RealtimeSection};
use cyper_events::{ConnectionOptions, HubOptions};
use cyper_pulse::PulseOptions;
use cyper_telemetry::{LogConfig, LogFormat, LogTarget};

use crate::error::{GatewayError, GatewayResult};

/// Pulse schedule.
#[must_use]
pub fn pulse_options(section: &PulseSection) -> PulseOptions {
    PulseOptions {
        interval: Duration::from_secs(section.interval_secs),
        error_retry: Duration::from_secs(section.error_retry_secs),
        session_timeout: Duration::from_secs(section.session_timeout_secs),
        max_concurrency: section.max_concurrency,
    }
}

/// Signing pool sizing.
#[must_use]
pub fn signing_options(section: &AuditSection) -> SigningOptions {
    SigningOptions {
        workers: section.signing_workers,
        queue_capacity: section.signing_queue_capacity,
    }
}

/// Shutdown contract for queued signing jobs.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] for a mode other than `drain` or
/// `abandon`.
pub fn shutdown_mode(section: &AuditSection) -> GatewayResult<ShutdownMode> {
    match section.shutdown_mode.as_str() {
        "drain" => Ok(ShutdownMode::Drain),
        "abandon" => Ok(ShutdownMode::Abandon),
        other => Err(GatewayError::Config(
            cyper_config::ConfigError::ValidationError {
                field: "audit.shutdown_mode".to_owned(),
                message: format!("unsupported mode '{other}'"),
            },
        )),
    }
}

/// Hub queue sizes.
#[must_use]
pub fn hub_options(section: &RealtimeSection) -> HubOptions {
    HubOptions {
        client_queue: section.client_queue,
        publish_queue: section.publish_queue,
    }
}

/// Per-connection timing and limits.
#[must_use]
pub fn connection_options(section: &RealtimeSection) -> ConnectionOptions {
    ConnectionOptions {
        ping_interval: Duration::from_secs(section.ping_interval_secs),
        read_deadline: Duration::from_secs(section.read_deadline_secs),
        write_timeout: Duration::from_secs(section.write_timeout_secs),
        max_message_bytes: section.max_message_bytes,
    }
}

/// Subscriber settings.
///
/// # Errors
///
/// Returns [`GatewayError::Telemetry`] for an unknown format and
/// [`GatewayError::Config`] for an unknown target or a file target without
/// a directory.
pub fn log_config(section: &LoggingSection) -> GatewayResult<LogConfig> {
    let format: LogFormat = section.format.parse()?;
    let mut config = LogConfig::new(section.level.clone()).with_format(format);
    config = match (section.target.as_str(), &section.file_dir) {
        ("stdout", _) => config.with_target(LogTarget::Stdout),
        ("stderr", _) => config.with_target(LogTarget::Stderr),
        ("file", Some(dir)) => config.with_file_logging(dir, section.file_prefix.clone()),
        (other, _) => {
            return Err(GatewayError::Config(
                cyper_config::ConfigError::ValidationError {
                    field: "logging.target".to_owned(),
                    message: format!("unusable target '{other}'"),
                },
            ));
        },
    };
    for directive in &section.directives {
        config = config.with_directive(directive.clone());
    }
    Ok(config)
}
