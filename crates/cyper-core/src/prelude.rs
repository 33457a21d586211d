//! Prelude module - commonly used types for convenient import.
//!
//! Use `use cyper_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{Classify, CoreError, CoreResult, ErrorClass};

// Identity
pub use crate::{ConnectionId, Principal, SessionId, UserId};

// Sessions & time
pub use crate::{Clock, ManualClock, Session, SystemClock};
