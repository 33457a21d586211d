//! Prelude module - commonly used types for convenient import.
//!
//! Use `use cyper_gateway::prelude::*;` to import all essential types.

// Composition root
pub use crate::{Gateway, GatewayError, GatewayResult};

// Realtime
pub use crate::{RealtimeNotifier, RealtimeServer, TokenAuthenticator};
