//! Alder Workflow - section approval and lock state machine
//!
//! Sections move draft -> submitted-for-approval -> approved or
//! changes-requested, and approved sections reopen only through an
//! explicit revision that bumps the version number. The edit gate here
//! is the single source of truth every content-mutating operation must
//! consult before writing.

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod section;

pub use engine::{EditGuard, WorkflowEngine};
pub use error::{WorkflowError, WorkflowResult};
pub use section::{EditGate, NewSection, ReportSection, SectionStatus, SectionVersion};
