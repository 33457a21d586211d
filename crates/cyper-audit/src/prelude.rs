//! Prelude module - commonly used types for convenient import.
//!
//! Use `use cyper_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Entries
pub use crate::{AuditEntry, AuditEntryId, AuditRecord, AuditStatus, Severity};

// Signing & verification
pub use crate::{AuditSigner, SignableRecord, VerificationReport};

// Trail & storage
pub use crate::{AuditStore, AuditTrail, KvAuditStore, ShutdownMode, SigningOptions};
