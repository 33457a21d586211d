//! Prelude module - commonly used types for convenient import.
//!
//! Use `use cyper_events::prelude::*;` to import all essential types.

// Errors
pub use crate::{EventsError, EventsResult};

// Hub
pub use crate::{Client, EventHub, HubOptions};

// Connections
pub use crate::{ConnectionOptions, serve_connection};

// Wire types
pub use crate::{Envelope, RealtimeEvent, event_type};
