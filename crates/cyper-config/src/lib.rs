//! Cyper Config - Layered configuration for the gateway.
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`AUDIT_SIGNING_*`, `LOG_LEVEL`, `CYPER_*`)
//! 2. **Config file** (`--config PATH`, else `$CYPER_CONFIG`)
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! ```rust,no_run
//! let config = cyper_config::Config::load(None).unwrap();
//! println!("listening on {}", config.gateway.bind_addr);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a layer is malformed or the result fails
    /// validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }
}
