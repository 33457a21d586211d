//! Cyper Storage - the durable store behind sessions, pulses and audit.
//!
//! Every subsystem reads and writes through the [`KvStore`] trait, which
//! is the single mutation point for persisted state. No subsystem keeps a
//! mutable copy of stored data across calls.
//!
//! # Backends
//!
//! - [`MemoryKvStore`] (always available): tests and single-process dev runs
//! - [`SurrealKvStore`] (behind the **`kv`** feature): embedded, ACID, on disk
//!
//! Higher layers use [`ScopedKvStore`] to bind a namespace and work with
//! JSON-encoded records.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
