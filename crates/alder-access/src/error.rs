//! Error types for the access crate.
//!
//! Authorization denials are NOT errors; they come back as a
//! `PermissionDecision` with `allowed = false`. These errors cover
//! malformed administration calls and missing entities.

use alder_audit::AuditError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("Role name already in use: {0}")]
    DuplicateRole(String),

    #[error("Grant not found for section {section} and user {user}")]
    GrantNotFound { section: String, user: String },

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Lock error")]
    LockError,
}
