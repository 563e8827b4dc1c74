//! Alder Access - role- and grant-based permission evaluation
//!
//! The permission engine is the only authority for who may act on what.
//! Standing access comes from roles; section-scoped exceptions come from
//! time-bounded grants. Every check is itself recorded in the audit
//! trail, allowed or denied.

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod model;

pub use engine::{PermissionDecision, PermissionEngine, PermissionMatrix};
pub use error::AccessError;
pub use model::{NewUser, Role, SectionAccessGrant, User, ACTIONS, RESOURCE_TYPES};
