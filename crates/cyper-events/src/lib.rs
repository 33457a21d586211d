//! Cyper Events - Realtime fan-out to connected clients.
//!
//! This crate provides:
//! - Typed outbound envelopes and inbound client commands
//! - [`EventHub`]: the live client registry with a single dispatch loop
//! - [`serve_connection`]: the per-client `WebSocket` read and write loops
//!
//! # Delivery model
//!
//! Every publish enters one queue and is dispatched in arrival order, so a
//! client sees messages in the order they reached the hub. Delivery is per
//! user; there is no topic filtering. A client whose outbound queue is full
//! at delivery time is disconnected rather than allowed to stall the hub.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod connection;
mod envelope;
mod error;
mod hub;

pub use connection::{ConnectionOptions, serve_connection};
pub use envelope::{ClientCommand, Envelope, InboundMessage, RealtimeEvent, event_type};
pub use error::{EventsError, EventsResult};
pub use hub::{Client, EventHub, Frame, HubOptions};
