//! Error types for the audit crate.

use thiserror::Error;

/// Audit log errors. Appends are unconditional; the only failure mode at
/// this layer is a poisoned lock, which indicates a panicked writer.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Lock error")]
    LockError,
}
