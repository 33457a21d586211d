//! Cyper Pulse - Continuous re-verification of session authorization.
//!
//! On a fixed interval every active session is re-checked against an
//! external [`AuthorizationAuthority`] and one [`PulseRecord`] is appended
//! per session. Per session the status sequence never leaves a terminal
//! state: once `revoked` or `expired`, no further records are written.
//!
//! An unreachable authority yields an `error` record, never an implicit
//! authorization, and the session is re-checked after a shorter delay.
//! Revocations are pushed to the user's connected clients and audited.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod authority;
mod error;
mod pulse;
mod record;
mod store;

pub use authority::{
    AuthorityDecision, AuthorizationAuthority, ScriptedAuthority, ScriptedOutcome, StaticAuthority,
};
pub use error::{PulseError, PulseResult};
pub use pulse::{AuthorizationPulse, PulseOptions, REVOKED_ACTION, TickSummary};
pub use record::{PulseRecord, PulseStatus};
pub use store::{KvSessionStore, PulseStore, SessionStore};
