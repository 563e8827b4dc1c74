//! Users, roles, and section access grants.

use alder_audit::{Auditable, FieldSnapshot, FieldValue};
use alder_types::{RoleId, SectionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resource types known to the permission system.
pub const RESOURCE_TYPES: [&str; 11] = [
    "organizations",
    "periods",
    "sections",
    "datapoints",
    "documents",
    "templates",
    "exports",
    "users",
    "roles",
    "audit",
    "breakglass",
];

/// Actions known to the permission system.
pub const ACTIONS: [&str; 9] = [
    "view", "create", "edit", "delete", "submit", "approve", "export", "manage", "activate",
];

/// A role: a named set of `"resource:action"` capability strings.
///
/// `"*:*"` grants everything; `"sections:*"` grants every action on one
/// resource type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub permissions: BTreeSet<String>,
    pub is_built_in: bool,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        permissions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: RoleId::generate(),
            name: name.into(),
            description: description.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            is_built_in: false,
        }
    }

    fn built_in(
        id: &str,
        name: &str,
        description: &str,
        permissions: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            id: RoleId::new(id),
            name: name.to_string(),
            description: description.to_string(),
            permissions: permissions.into_iter().map(str::to_string).collect(),
            is_built_in: true,
        }
    }

    /// Whether this role grants the given resource/action pair.
    pub fn grants(&self, resource_type: &str, action: &str) -> bool {
        self.permissions.contains("*:*")
            || self.permissions.contains(&format!("{}:*", resource_type))
            || self
                .permissions
                .contains(&format!("{}:{}", resource_type, action))
    }
}

impl Auditable for Role {
    fn entity_type() -> &'static str {
        alder_audit::entity::ROLE
    }

    fn audit_snapshot(&self) -> FieldSnapshot {
        vec![
            ("name", FieldValue::text(&self.name)),
            ("description", FieldValue::text(&self.description)),
            (
                "permissions",
                FieldValue::List(self.permissions.iter().cloned().collect()),
            ),
        ]
    }
}

/// The seeded built-in roles.
pub(crate) fn built_in_roles() -> Vec<Role> {
    vec![
        Role::built_in(
            "role-admin",
            "Admin",
            "Full administrative access to every resource",
            ["*:*"],
        ),
        Role::built_in(
            "role-compliance-officer",
            "Compliance Officer",
            "Reviews, approves, and exports disclosure content",
            [
                "sections:view",
                "sections:edit",
                "sections:submit",
                "sections:approve",
                "datapoints:view",
                "datapoints:edit",
                "periods:view",
                "audit:view",
                "exports:export",
            ],
        ),
        Role::built_in(
            "role-contributor",
            "Contributor",
            "Drafts section content and data points",
            [
                "sections:view",
                "sections:edit",
                "sections:submit",
                "datapoints:view",
                "datapoints:create",
                "datapoints:edit",
                "periods:view",
            ],
        ),
        Role::built_in(
            "role-data-owner",
            "Data Owner",
            "Owns a section's data points end to end",
            [
                "sections:view",
                "sections:edit",
                "sections:submit",
                "datapoints:view",
                "datapoints:create",
                "datapoints:edit",
                "datapoints:delete",
                "periods:view",
            ],
        ),
        Role::built_in(
            "role-reviewer",
            "Reviewer",
            "Approves submitted sections",
            [
                "sections:view",
                "sections:approve",
                "datapoints:view",
                "periods:view",
                "audit:view",
            ],
        ),
        Role::built_in(
            "role-external-advisor-read",
            "External Advisor (Read)",
            "Read-only advisor access via section grants",
            ["sections:view", "datapoints:view"],
        ),
        Role::built_in(
            "role-external-advisor-edit",
            "External Advisor (Edit)",
            "Advisor access with editing via section grants",
            [
                "sections:view",
                "sections:edit",
                "datapoints:view",
                "datapoints:edit",
            ],
        ),
    ]
}

/// A platform user as seen by the governance core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role_ids: BTreeSet<RoleId>,
    pub is_active: bool,
    /// When set and in the past, the user has no standing access at all,
    /// regardless of roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the user's standing access has lapsed.
    pub fn access_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at.is_some_and(|expiry| expiry <= now)
    }
}

impl Auditable for User {
    fn entity_type() -> &'static str {
        alder_audit::entity::USER
    }

    fn audit_snapshot(&self) -> FieldSnapshot {
        vec![
            ("name", FieldValue::text(&self.name)),
            ("email", FieldValue::text(&self.email)),
            ("is_active", self.is_active.into()),
            (
                "access_expires_at",
                FieldValue::timestamp(self.access_expires_at),
            ),
            (
                "roles",
                FieldValue::List(self.role_ids.iter().map(|r| r.0.clone()).collect()),
            ),
        ]
    }
}

/// Input for creating a user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role_ids: BTreeSet<RoleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<DateTime<Utc>>,
}

/// A section-scoped access grant.
///
/// Grants confer access to one section outside the user's role scope.
/// Expired grants stay in the store for audit value; they are inert on
/// every read path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectionAccessGrant {
    pub section_id: SectionId,
    pub user_id: UserId,
    pub granted_by: UserId,
    pub granted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SectionAccessGrant {
    /// A grant contributes to access checks only while unexpired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expiry| expiry > now).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_role_grants_everything() {
        let admin = built_in_roles().remove(0);
        assert_eq!(admin.name, "Admin");
        assert!(admin.grants("exports", "export"));
        assert!(admin.grants("sections", "approve"));
        assert!(admin.grants("made-up-resource", "made-up-action"));
    }

    #[test]
    fn contributor_cannot_export() {
        let roles = built_in_roles();
        let contributor = roles.iter().find(|r| r.name == "Contributor").unwrap();
        assert!(contributor.grants("sections", "edit"));
        assert!(!contributor.grants("exports", "export"));
    }

    #[test]
    fn resource_wildcard_covers_all_actions() {
        let role = Role::new("Section Manager", "test", ["sections:*"]);
        assert!(role.grants("sections", "view"));
        assert!(role.grants("sections", "approve"));
        assert!(!role.grants("datapoints", "view"));
    }

    #[test]
    fn expired_grant_is_inactive() {
        let now = Utc::now();
        let grant = SectionAccessGrant {
            section_id: SectionId::new("sec-1"),
            user_id: UserId::new("u-1"),
            granted_by: UserId::new("admin"),
            granted_at: now - chrono::Duration::days(30),
            expires_at: Some(now - chrono::Duration::days(1)),
        };
        assert!(!grant.is_active(now));

        let open_ended = SectionAccessGrant {
            expires_at: None,
            ..grant
        };
        assert!(open_ended.is_active(now));
    }

    #[test]
    fn user_expiry_is_checked_against_now() {
        let now = Utc::now();
        let user = User {
            id: UserId::new("u-1"),
            name: "Avery".into(),
            email: "avery@example.com".into(),
            role_ids: BTreeSet::new(),
            is_active: true,
            access_expires_at: Some(now - chrono::Duration::minutes(5)),
        };
        assert!(user.access_expired(now));
    }
}
