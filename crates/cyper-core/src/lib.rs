//! Cyper Core - Foundation types for the continuous-authorization gateway.
//!
//! This crate provides:
//! - Identifiers for users, sessions and realtime connections
//! - The request-scoped [`Principal`] threaded through every audited call
//! - The [`Session`] record shared by the pulse and the gateway
//! - A [`Clock`] abstraction for deterministic time in tests
//! - The error classification shared by every crate

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod clock;
pub mod error;
pub mod principal;
pub mod session;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Classify, CoreError, CoreResult, ErrorClass};
pub use principal::Principal;
pub use session::Session;
pub use types::{ConnectionId, SessionId, UserId};
