//! Cyper Metrics - Prometheus counters and gauges for the gateway.
//!
//! One [`MetricsRegistry`] is built at startup and shared by `Arc` with
//! every component that records into it. Components hold it as an
//! `Option`, so a component built without metrics records nothing.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `cyper_audit_entries_total` | Counter | `severity`, `action` |
//! | `cyper_audit_signatures_total` | Counter | `outcome` |
//! | `cyper_pulse_checks_total` | Counter | `status` |
//! | `cyper_active_sessions` | Gauge | |
//! | `cyper_auth_attempts_total` | Counter | `status` |
//! | `cyper_realtime_clients` | Gauge | |
//! | `cyper_realtime_drops_total` | Counter | `reason` |

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod registry;

pub use error::{MetricsError, MetricsResult};
pub use registry::{
    CyperMetrics, MAX_LABEL_VALUE_LEN, MetricsRegistry, SharedMetricsRegistry, SignOutcome,
    TEXT_CONTENT_TYPE,
};
