//! Post-merge configuration validation.
//!
//! Checks ranges and cross-field invariants of a fully merged [`Config`].

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn non_zero(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}

fn non_zero_count(field: &str, value: usize) -> ConfigResult<()> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_gateway(config)?;
    validate_pulse(config)?;
    validate_audit(config)?;
    validate_signing(config)?;
    validate_realtime(config)?;
    validate_storage(config)?;
    validate_logging(config)?;
    validate_metrics(config)?;
    Ok(())
}

fn validate_gateway(config: &Config) -> ConfigResult<()> {
    if config
        .gateway
        .bind_addr
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        return Err(invalid(
            "gateway.bind_addr",
            format!("'{}' is not a socket address", config.gateway.bind_addr),
        ));
    }
    non_zero("gateway.shutdown_timeout_secs", config.gateway.shutdown_timeout_secs)
}

fn validate_pulse(config: &Config) -> ConfigResult<()> {
    let p = &config.pulse;
    non_zero("pulse.interval_secs", p.interval_secs)?;
    non_zero("pulse.error_retry_secs", p.error_retry_secs)?;
    non_zero("pulse.session_timeout_secs", p.session_timeout_secs)?;
    non_zero_count("pulse.max_concurrency", p.max_concurrency)?;
    if p.error_retry_secs > p.interval_secs {
        return Err(invalid(
            "pulse.error_retry_secs",
            "must not exceed pulse.interval_secs",
        ));
    }
    Ok(())
}

fn validate_audit(config: &Config) -> ConfigResult<()> {
    let a = &config.audit;
    non_zero_count("audit.signing_workers", a.signing_workers)?;
    non_zero_count("audit.signing_queue_capacity", a.signing_queue_capacity)?;
    if !matches!(a.shutdown_mode.as_str(), "drain" | "abandon") {
        return Err(invalid(
            "audit.shutdown_mode",
            format!("unsupported mode '{}'; expected drain or abandon", a.shutdown_mode),
        ));
    }
    Ok(())
}

fn validate_signing(config: &Config) -> ConfigResult<()> {
    let s = &config.signing;
    match (&s.private_key, &s.public_key) {
        (Some(_), None) | (None, Some(_)) => Err(invalid(
            "signing",
            "private_key and public_key must be set together",
        )),
        (None, None) if !s.allow_ephemeral => Err(invalid(
            "signing",
            "no key material configured and allow_ephemeral is false",
        )),
        _ => Ok(()),
    }
}

fn validate_realtime(config: &Config) -> ConfigResult<()> {
    let r = &config.realtime;
    non_zero_count("realtime.client_queue", r.client_queue)?;
    non_zero_count("realtime.publish_queue", r.publish_queue)?;
    non_zero("realtime.ping_interval_secs", r.ping_interval_secs)?;
    non_zero("realtime.read_deadline_secs", r.read_deadline_secs)?;
    non_zero("realtime.write_timeout_secs", r.write_timeout_secs)?;
    non_zero_count("realtime.max_message_bytes", r.max_message_bytes)?;
    if r.ping_interval_secs >= r.read_deadline_secs {
        return Err(invalid(
            "realtime.ping_interval_secs",
            "must be shorter than realtime.read_deadline_secs",
        ));
    }
    Ok(())
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    match config.storage.backend.as_str() {
        "memory" => Ok(()),
        "surrealkv" if config.storage.path.as_deref().is_some_and(|p| !p.is_empty()) => Ok(()),
        "surrealkv" => Err(invalid("storage.path", "required for the surrealkv backend")),
        other => Err(invalid(
            "storage.backend",
            format!("unsupported backend '{other}'; expected memory or surrealkv"),
        )),
    }
}

fn validate_metrics(config: &Config) -> ConfigResult<()> {
    let m = &config.metrics;
    if !m.enabled {
        return Ok(());
    }
    if m.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(invalid(
            "metrics.bind_addr",
            format!("'{}' is not a socket address", m.bind_addr),
        ));
    }
    if m.bind_addr == config.gateway.bind_addr {
        return Err(invalid(
            "metrics.bind_addr",
            "must differ from gateway.bind_addr",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!("unsupported format '{}'", l.format),
        ));
    }
    match l.target.as_str() {
        "stdout" | "stderr" => Ok(()),
        "file" if l.file_dir.is_some() => Ok(()),
        "file" => Err(invalid("logging.file_dir", "required when target is file")),
        other => Err(invalid(
            "logging.target",
            format!("unsupported target '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.pulse.interval_secs = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValidationError { field, .. }) if field == "pulse.interval_secs"
        ));
    }

    #[test]
    fn test_retry_longer_than_interval_rejected() {
        let mut config = Config::default();
        config.pulse.interval_secs = 20;
        config.pulse.error_retry_secs = 30;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_half_key_pair_rejected() {
        let mut config = Config::default();
        config.signing.private_key = Some("abc".into());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_keys_without_ephemeral_rejected() {
        let mut config = Config::default();
        config.signing.allow_ephemeral = false;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_ping_must_precede_read_deadline() {
        let mut config = Config::default();
        config.realtime.ping_interval_secs = 60;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_surrealkv_requires_path() {
        let mut config = Config::default();
        config.storage.backend = "surrealkv".into();
        assert!(validate(&config).is_err());
        config.storage.path = Some("/var/lib/cyper".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = Config::default();
        config.metrics.bind_addr = "nowhere".into();
        assert!(validate(&config).is_ok());

        config.metrics.enabled = true;
        assert!(validate(&config).is_err());

        config.metrics.bind_addr = config.gateway.bind_addr.clone();
        assert!(validate(&config).is_err());

        config.metrics.bind_addr = "127.0.0.1:9100".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_shutdown_mode_rejected() {
        let mut config = Config::default();
        config.audit.shutdown_mode = "later".into();
        assert!(validate(&config).is_err());
    }
}
