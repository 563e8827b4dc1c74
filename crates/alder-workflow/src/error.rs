//! Error types for the workflow layer.
//!
//! State-conflict messages name the conflicting state and, where there
//! is one, the remedy. These strings are part of the call contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("Section {0} is already submitted for approval")]
    AlreadySubmitted(String),

    #[error("Section {0} is already approved; create a new revision to make changes")]
    AlreadyApproved(String),

    #[error("Section {0} must be submitted for approval before it can be approved")]
    NotSubmitted(String),

    #[error("Only submitted sections can have changes requested (section {0} is {1})")]
    NotAwaitingReview(String, String),

    #[error("Only approved sections can be revised (section {0} is {1})")]
    NotApproved(String, String),

    #[error("Section {0} is incomplete: {1}")]
    IncompleteSection(String, String),

    #[error("Audit error: {0}")]
    Audit(#[from] alder_audit::AuditError),

    #[error("Lock error")]
    LockError,
}

/// Result type alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
