//! Alder Audit - immutable, diffable audit trail
//!
//! Every mutation of a governed entity is recorded as an append-only
//! audit entry carrying field-level before/after changes. Entries are
//! never updated or deleted; corrections are new entries. The log is
//! the non-repudiation backbone for the rest of the governance core.

#![deny(unsafe_code)]

pub mod differ;
pub mod entry;
pub mod error;
pub mod log;

pub use differ::{Auditable, ChangeDiffer, FieldSnapshot};
pub use entry::{AuditAction, AuditEntryDraft, AuditLogEntry, FieldChange, FieldValue};
pub use error::AuditError;
pub use log::{AuditLog, AuditQuery, AuditStatistics, EntryTagger};

/// Entity type tags used across the governance core.
pub mod entity {
    pub const USER: &str = "User";
    pub const ROLE: &str = "Role";
    pub const PERMISSION: &str = "Permission";
    pub const SECTION_ACCESS_GRANT: &str = "SectionAccessGrant";
    pub const BREAK_GLASS_SESSION: &str = "BreakGlassSession";
    pub const REPORT_SECTION: &str = "ReportSection";
    pub const DATA_POINT: &str = "DataPoint";
}
