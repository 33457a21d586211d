//! Cyper Audit - Tamper-evident audit trail.
//!
//! This crate provides:
//! - Durable, append-only audit entries with monotonic ids
//! - A fixed signable projection with a deterministic encoding
//! - Asynchronous ed25519 signing on a bounded worker pool
//! - Per-entry re-verification against the entry as currently stored
//!
//! # Security Model
//!
//! A write returns once the entry is durable. Signing runs afterwards and
//! signs exactly what was committed. Verification re-derives the projection
//! from storage, so any later change to a signed field makes verification
//! fail even though the stored signature itself is untouched. Detail and
//! severity are not signed and may be enriched freely.
//!
//! # Example
//!
//! ```
//! use cyper_audit::{AuditSigner, SignableRecord};
//!
//! let signer = AuditSigner::generate_ephemeral();
//! # let entry: cyper_audit::AuditEntry = serde_json::from_value(serde_json::json!({
//! #     "id": 1, "actor": "u1", "session_id": null, "action": "login_success",
//! #     "resource_type": null, "resource_id": null, "target": null,
//! #     "authorization_proof": null, "source_addr": null, "user_agent": null,
//! #     "status": "success", "error_message": null, "severity": "info",
//! #     "detail": {}, "timestamp": "2026-01-01T00:00:00Z",
//! #     "signature": null, "signer_public_key": null, "signed_at": null,
//! # })).unwrap();
//! let record = SignableRecord::project(&entry);
//! let signature = signer.sign(&record).unwrap();
//! assert!(AuditSigner::verify(&record, &signature, &signer.public_key()).unwrap());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod canonical;
mod entry;
mod error;
mod signer;
mod storage;
mod trail;
mod worker;

pub use canonical::SignableRecord;
pub use entry::{AuditEntry, AuditEntryId, AuditRecord, AuditStatus, MAX_ACTION_LEN, Severity};
pub use error::{AuditError, AuditResult};
pub use signer::AuditSigner;
pub use storage::{AuditFilter, AuditStore, KvAuditStore};
pub use trail::{AuditExport, AuditTrail, MAX_QUERY_LIMIT, VerificationReport};
pub use worker::{ShutdownMode, SigningOptions, SigningQueue};
