//! Error types for the lineage crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LineageError {
    #[error("Data point not found: {0}")]
    DataPointNotFound(String),

    #[error("Section is locked: {0}")]
    SectionLocked(String),

    #[error("Data point {source_point} was already rolled over into period {period}")]
    AlreadyRolledOver { source_point: String, period: String },

    #[error("Workflow error: {0}")]
    Workflow(#[from] alder_workflow::WorkflowError),

    #[error("Audit error: {0}")]
    Audit(#[from] alder_audit::AuditError),

    #[error("Lock error")]
    LockError,
}
