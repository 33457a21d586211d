//! Environment variable overrides.
//!
//! Unlike file layers, a set variable always wins. Values are coerced to the
//! type of the key they replace in the merged tree; keys absent from the tree
//! are set as strings.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming a config file to load.
pub const CONFIG_PATH_VAR: &str = "CYPER_CONFIG";

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    // Key material keeps the names used by existing deployments.
    EnvMapping {
        var_name: "AUDIT_SIGNING_PRIVATE_KEY",
        field_path: "signing.private_key",
    },
    EnvMapping {
        var_name: "AUDIT_SIGNING_PUBLIC_KEY",
        field_path: "signing.public_key",
    },
    EnvMapping {
        var_name: "LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "CYPER_BIND_ADDR",
        field_path: "gateway.bind_addr",
    },
    EnvMapping {
        var_name: "CYPER_PULSE_INTERVAL_SECS",
        field_path: "pulse.interval_secs",
    },
    EnvMapping {
        var_name: "CYPER_STORAGE_PATH",
        field_path: "storage.path",
    },
    EnvMapping {
        var_name: "CYPER_METRICS_ENABLED",
        field_path: "metrics.enabled",
    },
    EnvMapping {
        var_name: "CYPER_METRICS_BIND_ADDR",
        field_path: "metrics.bind_addr",
    },
];

/// Snapshot of the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Apply every mapped variable present in `env_vars` to `merged`.
///
/// Empty values are ignored. Returns the number of overrides applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a value cannot be coerced to the
/// type of the field it replaces.
pub fn apply_env_overrides<S: BuildHasher>(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var override"
        );
        set_field(merged, mapping.field_path, mapping.var_name, raw)?;
        count = count.saturating_add(1);
    }
    Ok(count)
}

fn coerce(existing: Option<&toml::Value>, var_name: &str, raw: &str) -> ConfigResult<toml::Value> {
    let invalid = |expected: &str| ConfigError::EnvError {
        var_name: var_name.to_owned(),
        message: format!("expected {expected}, got '{raw}'"),
    };
    match existing {
        Some(toml::Value::Integer(_)) => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| invalid("an integer")),
        Some(toml::Value::Boolean(_)) => raw
            .parse::<bool>()
            .map(toml::Value::Boolean)
            .map_err(|_| invalid("true or false")),
        _ => Ok(toml::Value::String(raw.to_owned())),
    }
}

fn set_field(root: &mut toml::Value, path: &str, var_name: &str, raw: &str) -> ConfigResult<()> {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let table = current.as_table_mut().ok_or_else(|| ConfigError::EnvError {
            var_name: var_name.to_owned(),
            message: format!("'{path}' does not name a table field"),
        })?;
        if segments.peek().is_none() {
            let value = coerce(table.get(segment), var_name, raw)?;
            table.insert(segment.to_owned(), value);
            return Ok(());
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> toml::Value {
        toml::from_str(
            r#"
            [pulse]
            interval_secs = 300
            [logging]
            level = "info"
            "#,
        )
        .unwrap()
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_override_coerces_to_existing_type() {
        let mut merged = tree();
        let applied = apply_env_overrides(
            &mut merged,
            &vars(&[("CYPER_PULSE_INTERVAL_SECS", "60"), ("LOG_LEVEL", "debug")]),
        )
        .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(merged["pulse"]["interval_secs"].as_integer(), Some(60));
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
    }

    #[test]
    fn test_override_creates_missing_fields() {
        let mut merged = tree();
        apply_env_overrides(
            &mut merged,
            &vars(&[("AUDIT_SIGNING_PRIVATE_KEY", "abc"), ("AUDIT_SIGNING_PUBLIC_KEY", "def")]),
        )
        .unwrap();
        assert_eq!(merged["signing"]["private_key"].as_str(), Some("abc"));
        assert_eq!(merged["signing"]["public_key"].as_str(), Some("def"));
    }

    #[test]
    fn test_bad_integer_is_rejected() {
        let mut merged = tree();
        let result = apply_env_overrides(&mut merged, &vars(&[("CYPER_PULSE_INTERVAL_SECS", "soon")]));
        assert!(matches!(result, Err(ConfigError::EnvError { .. })));
    }

    #[test]
    fn test_metrics_toggle_coerces_to_bool() {
        let mut merged: toml::Value = toml::from_str("[metrics]\nenabled = false\n").unwrap();
        apply_env_overrides(&mut merged, &vars(&[("CYPER_METRICS_ENABLED", "true")])).unwrap();
        assert_eq!(merged["metrics"]["enabled"].as_bool(), Some(true));

        let result = apply_env_overrides(&mut merged, &vars(&[("CYPER_METRICS_ENABLED", "yes")]));
        assert!(matches!(result, Err(ConfigError::EnvError { .. })));
    }

    #[test]
    fn test_empty_value_is_ignored() {
        let mut merged = tree();
        let applied = apply_env_overrides(&mut merged, &vars(&[("LOG_LEVEL", "  ")])).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("info"));
    }
}
