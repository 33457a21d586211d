//! Prelude module - commonly used types for convenient import.
//!
//! Use `use cyper_pulse::prelude::*;` to import all essential types.

// Errors
pub use crate::{PulseError, PulseResult};

// Pulse
pub use crate::{AuthorizationPulse, PulseOptions, TickSummary};

// Authority
pub use crate::{AuthorityDecision, AuthorizationAuthority, StaticAuthority};

// Records & storage
pub use crate::{KvSessionStore, PulseRecord, PulseStatus, PulseStore, SessionStore};
