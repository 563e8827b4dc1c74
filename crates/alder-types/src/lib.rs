//! Alder Types - shared identifiers for the governance core
//!
//! Every governed entity is addressed by a string-backed newtype id.
//! Ids are either caller-supplied (`new`) or freshly minted (`generate`).

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a platform user
    UserId
);
string_id!(
    /// Unique identifier for a role
    RoleId
);
string_id!(
    /// Unique identifier for a report section
    SectionId
);
string_id!(
    /// Unique identifier for a reporting period
    PeriodId
);
string_id!(
    /// Unique identifier for a data point
    DataPointId
);
string_id!(
    /// Unique identifier for a break-glass session
    SessionId
);
string_id!(
    /// Unique identifier for an audit log entry
    EntryId
);

/// The acting user attached to a mutation, as recorded in the audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
