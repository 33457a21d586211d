//! Cyper Gateway - Composition root for continuous authorization and audit.
//!
//! This crate wires the subsystems into one process:
//! - Opens the durable store and loads the audit signing keys
//! - Runs the realtime hub, the authorization pulse and the listener
//! - Authenticates realtime clients by bearer token fingerprint
//! - Records Prometheus metrics and optionally serves them on `/metrics`
//! - Stops everything on one cancellation, draining or abandoning queued
//!   audit signatures as configured
//!
//! # Architecture
//!
//! ```text
//! cyper-gateway
//! ├── RealtimeServer ── TokenAuthenticator ── SessionStore
//! │        └── serve_connection ── EventHub
//! ├── AuthorizationPulse ── AuthorizationAuthority
//! │        ├── PulseStore
//! │        ├── EventHub (auth_revoked)
//! │        └── AuditTrail (authorization_revoked)
//! └── AuditTrail ── AuditStore + SigningQueue ── AuditSigner
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use cyper_gateway::Gateway;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = cyper_config::Config::load(None)?;
//!     let gateway = Gateway::build(config)?;
//!     let listener = gateway.bind().await?;
//!     gateway.run(listener).await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod auth;
pub mod config_bridge;
pub mod error;
pub mod exporter;
pub mod notifier;
pub mod runtime;
pub mod server;

pub use auth::{HandshakeCredentials, TokenAuthenticator, extract_credentials};
pub use error::{GatewayError, GatewayResult};
pub use exporter::serve_metrics;
pub use notifier::RealtimeNotifier;
pub use runtime::Gateway;
pub use server::{REALTIME_CONNECT_ACTION, RealtimeServer};
