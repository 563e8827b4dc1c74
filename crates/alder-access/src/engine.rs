//! The permission engine: check evaluation, matrix projection, and
//! role/user/grant administration.
//!
//! Denials are results, not errors. Every check, allowed or denied, is
//! appended to the audit trail under the `Permission` entity type.

use crate::error::AccessError;
use crate::model::{
    built_in_roles, NewUser, Role, SectionAccessGrant, User, ACTIONS, RESOURCE_TYPES,
};
use alder_audit::{
    entity, AuditAction, AuditEntryDraft, AuditLog, ChangeDiffer, FieldChange, FieldValue,
};
use alder_types::{Actor, RoleId, SectionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Actions a section grant can satisfy on its own. Editing still requires
/// a role that carries the edit capability.
const GRANT_SATISFIED_ACTIONS: [&str; 1] = ["view"];

/// Outcome of a permission check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
    /// Names of the roles that were resolved for the user.
    pub evaluated_roles: Vec<String>,
}

impl PermissionDecision {
    fn allowed(evaluated_roles: Vec<String>) -> Self {
        Self {
            allowed: true,
            denial_reason: None,
            evaluated_roles,
        }
    }

    fn denied(reason: impl Into<String>, evaluated_roles: Vec<String>) -> Self {
        Self {
            allowed: false,
            denial_reason: Some(reason.into()),
            evaluated_roles,
        }
    }
}

/// Resolved role-to-capability projection for administration UIs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionMatrix {
    /// Role name to resource type to granted actions.
    pub roles: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    pub resource_types: Vec<String>,
    pub actions: Vec<String>,
}

/// Evaluates role-based and grant-based access into allow/deny decisions.
pub struct PermissionEngine {
    users: RwLock<HashMap<UserId, User>>,
    roles: RwLock<HashMap<RoleId, Role>>,
    grants: RwLock<Vec<SectionAccessGrant>>,
    audit: Arc<AuditLog>,
}

impl PermissionEngine {
    /// Create an engine seeded with the built-in roles.
    pub fn new(audit: Arc<AuditLog>) -> Self {
        let roles = built_in_roles()
            .into_iter()
            .map(|role| (role.id.clone(), role))
            .collect();
        Self {
            users: RwLock::new(HashMap::new()),
            roles: RwLock::new(roles),
            grants: RwLock::new(Vec::new()),
            audit,
        }
    }

    // ── Permission checks ────────────────────────────────────────────

    /// Check whether a user may perform `action` on `resource_type`.
    /// The check itself is audited, allowed or denied.
    pub fn check_permission(
        &self,
        user_id: &UserId,
        resource_type: &str,
        action: &str,
    ) -> Result<PermissionDecision, AccessError> {
        self.check(user_id, resource_type, action, None)
    }

    /// Section-scoped check: an unexpired grant can satisfy view-class
    /// actions when the user's roles do not.
    pub fn check_section_permission(
        &self,
        user_id: &UserId,
        section_id: &SectionId,
        action: &str,
    ) -> Result<PermissionDecision, AccessError> {
        self.check(user_id, "sections", action, Some(section_id))
    }

    fn check(
        &self,
        user_id: &UserId,
        resource_type: &str,
        action: &str,
        section_id: Option<&SectionId>,
    ) -> Result<PermissionDecision, AccessError> {
        let now = Utc::now();
        let decision = self.evaluate(user_id, resource_type, action, section_id, now)?;

        let user_name = self
            .find_user(user_id)?
            .map(|user| user.name)
            .unwrap_or_else(|| "unknown".to_string());
        let actor = Actor::new(user_id.as_str(), user_name);

        let audit_action = if decision.allowed {
            AuditAction::PermissionCheckAllowed
        } else {
            AuditAction::PermissionCheckDenied
        };

        let mut changes = vec![
            FieldChange::new(
                "resource_type",
                FieldValue::Absent,
                FieldValue::text(resource_type),
            ),
            FieldChange::new("action", FieldValue::Absent, FieldValue::text(action)),
            FieldChange::new("allowed", FieldValue::Absent, decision.allowed.into()),
        ];
        if let Some(reason) = &decision.denial_reason {
            changes.push(FieldChange::new(
                "denial_reason",
                FieldValue::Absent,
                FieldValue::text(reason),
            ));
        }

        self.audit.append(
            AuditEntryDraft::new(audit_action, entity::PERMISSION, user_id.as_str(), &actor)
                .with_changes(changes),
        )?;

        if decision.allowed {
            tracing::debug!(user = %user_id, resource = resource_type, action, "permission allowed");
        } else {
            tracing::warn!(
                user = %user_id,
                resource = resource_type,
                action,
                reason = decision.denial_reason.as_deref().unwrap_or(""),
                "permission denied"
            );
        }

        Ok(decision)
    }

    /// Evaluate without writing an audit entry. Used for derived queries
    /// and by collaborators that audit under their own entity types.
    pub fn user_has_capability(
        &self,
        user_id: &UserId,
        resource_type: &str,
        action: &str,
    ) -> Result<bool, AccessError> {
        Ok(self
            .evaluate(user_id, resource_type, action, None, Utc::now())?
            .allowed)
    }

    fn evaluate(
        &self,
        user_id: &UserId,
        resource_type: &str,
        action: &str,
        section_id: Option<&SectionId>,
        now: DateTime<Utc>,
    ) -> Result<PermissionDecision, AccessError> {
        let user = {
            let users = self.users.read().map_err(|_| AccessError::LockError)?;
            users.get(user_id).cloned()
        };
        let Some(user) = user else {
            return Ok(PermissionDecision::denied("User not found", vec![]));
        };

        if !user.is_active {
            return Ok(PermissionDecision::denied("User account is inactive", vec![]));
        }
        if user.access_expired(now) {
            let expiry = user
                .access_expires_at
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default();
            return Ok(PermissionDecision::denied(
                format!("User access expired at {}", expiry),
                vec![],
            ));
        }

        let evaluated: Vec<Role> = {
            let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
            user.role_ids
                .iter()
                .filter_map(|role_id| roles.get(role_id).cloned())
                .collect()
        };
        let role_names: Vec<String> = evaluated.iter().map(|role| role.name.clone()).collect();

        if evaluated
            .iter()
            .any(|role| role.grants(resource_type, action))
        {
            return Ok(PermissionDecision::allowed(role_names));
        }

        if let Some(section_id) = section_id {
            if GRANT_SATISFIED_ACTIONS.contains(&action)
                && self.has_active_grant(user_id, section_id, now)?
            {
                return Ok(PermissionDecision::allowed(role_names));
            }
        }

        Ok(PermissionDecision::denied(
            format!("Missing required permission: {}:{}", resource_type, action),
            role_names,
        ))
    }

    /// Resolved capability matrix, derived purely from role definitions.
    pub fn permission_matrix(&self) -> Result<PermissionMatrix, AccessError> {
        let roles = self.roles.read().map_err(|_| AccessError::LockError)?;

        let mut resource_types: BTreeSet<String> =
            RESOURCE_TYPES.iter().map(|r| r.to_string()).collect();
        let mut actions: BTreeSet<String> = ACTIONS.iter().map(|a| a.to_string()).collect();
        for role in roles.values() {
            for permission in &role.permissions {
                if let Some((resource, action)) = permission.split_once(':') {
                    if resource != "*" {
                        resource_types.insert(resource.to_string());
                    }
                    if action != "*" {
                        actions.insert(action.to_string());
                    }
                }
            }
        }

        let mut by_role: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
        for role in roles.values() {
            let mut by_resource: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for resource in &resource_types {
                let granted: BTreeSet<String> = actions
                    .iter()
                    .filter(|action| role.grants(resource, action))
                    .cloned()
                    .collect();
                if !granted.is_empty() {
                    by_resource.insert(resource.clone(), granted);
                }
            }
            by_role.insert(role.name.clone(), by_resource);
        }

        Ok(PermissionMatrix {
            roles: by_role,
            resource_types: resource_types.into_iter().collect(),
            actions: actions.into_iter().collect(),
        })
    }

    // ── Section grants ───────────────────────────────────────────────

    /// Grant a user access to one section, optionally time-bounded.
    pub fn grant_section_access(
        &self,
        section_id: &SectionId,
        user_id: &UserId,
        granted_by: &Actor,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SectionAccessGrant, AccessError> {
        if self.find_user(user_id)?.is_none() {
            return Err(AccessError::UserNotFound(user_id.0.clone()));
        }

        let grant = SectionAccessGrant {
            section_id: section_id.clone(),
            user_id: user_id.clone(),
            granted_by: granted_by.id.clone(),
            granted_at: Utc::now(),
            expires_at,
        };

        {
            let mut grants = self.grants.write().map_err(|_| AccessError::LockError)?;
            grants.push(grant.clone());
        }

        self.audit.append(
            AuditEntryDraft::new(
                AuditAction::GrantSectionAccess,
                entity::SECTION_ACCESS_GRANT,
                section_id.as_str(),
                granted_by,
            )
            .with_changes(vec![
                FieldChange::new("user_id", FieldValue::Absent, FieldValue::text(user_id.as_str())),
                FieldChange::new(
                    "expires_at",
                    FieldValue::Absent,
                    FieldValue::timestamp(expires_at),
                ),
            ]),
        )?;

        tracing::info!(section = %section_id, user = %user_id, "section access granted");
        Ok(grant)
    }

    /// Revoke a user's active grant on a section. The grant row is kept,
    /// expired as of now, so the audit trail retains it.
    pub fn revoke_section_access(
        &self,
        section_id: &SectionId,
        user_id: &UserId,
        actor: &Actor,
    ) -> Result<(), AccessError> {
        let now = Utc::now();
        let previous_expiry = {
            let mut grants = self.grants.write().map_err(|_| AccessError::LockError)?;
            let grant = grants
                .iter_mut()
                .find(|grant| {
                    grant.section_id == *section_id
                        && grant.user_id == *user_id
                        && grant.is_active(now)
                })
                .ok_or_else(|| AccessError::GrantNotFound {
                    section: section_id.0.clone(),
                    user: user_id.0.clone(),
                })?;
            let previous = grant.expires_at;
            grant.expires_at = Some(now);
            previous
        };

        self.audit.append(
            AuditEntryDraft::new(
                AuditAction::RevokeSectionAccess,
                entity::SECTION_ACCESS_GRANT,
                section_id.as_str(),
                actor,
            )
            .with_changes(vec![FieldChange::new(
                "expires_at",
                FieldValue::timestamp(previous_expiry),
                FieldValue::timestamp(Some(now)),
            )]),
        )?;

        tracing::info!(section = %section_id, user = %user_id, "section access revoked");
        Ok(())
    }

    /// Whether the user holds an unexpired grant for the section.
    pub fn has_section_access(
        &self,
        user_id: &UserId,
        section_id: &SectionId,
    ) -> Result<bool, AccessError> {
        self.has_active_grant(user_id, section_id, Utc::now())
    }

    /// Section ids the user can reach through unexpired grants.
    pub fn accessible_sections(&self, user_id: &UserId) -> Result<Vec<SectionId>, AccessError> {
        let now = Utc::now();
        let grants = self.grants.read().map_err(|_| AccessError::LockError)?;
        let mut seen = BTreeSet::new();
        let mut sections = Vec::new();
        for grant in grants.iter() {
            if grant.user_id == *user_id && grant.is_active(now) && seen.insert(&grant.section_id) {
                sections.push(grant.section_id.clone());
            }
        }
        Ok(sections)
    }

    fn has_active_grant(
        &self,
        user_id: &UserId,
        section_id: &SectionId,
        now: DateTime<Utc>,
    ) -> Result<bool, AccessError> {
        let grants = self.grants.read().map_err(|_| AccessError::LockError)?;
        Ok(grants.iter().any(|grant| {
            grant.user_id == *user_id && grant.section_id == *section_id && grant.is_active(now)
        }))
    }

    // ── User administration ──────────────────────────────────────────

    /// Create a user. Every assigned role must already exist.
    pub fn create_user(&self, new: NewUser, actor: &Actor) -> Result<User, AccessError> {
        {
            let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
            for role_id in &new.role_ids {
                if !roles.contains_key(role_id) {
                    return Err(AccessError::RoleNotFound(role_id.0.clone()));
                }
            }
        }

        let user = User {
            id: UserId::generate(),
            name: new.name,
            email: new.email,
            role_ids: new.role_ids,
            is_active: true,
            access_expires_at: new.access_expires_at,
        };

        {
            let mut users = self.users.write().map_err(|_| AccessError::LockError)?;
            if users.contains_key(&user.id) {
                return Err(AccessError::DuplicateUser(user.id.0.clone()));
            }
            users.insert(user.id.clone(), user.clone());
        }

        self.audit.append(
            AuditEntryDraft::new(AuditAction::Create, entity::USER, user.id.as_str(), actor)
                .with_changes(ChangeDiffer::creation(&user)),
        )?;

        tracing::info!(user = %user.id, "user created");
        Ok(user)
    }

    /// Update name and email. An identical update is a no-op and writes
    /// no audit entry.
    pub fn update_user_profile(
        &self,
        user_id: &UserId,
        name: impl Into<String>,
        email: impl Into<String>,
        actor: &Actor,
    ) -> Result<User, AccessError> {
        self.update_user(user_id, actor, AuditAction::Update, |user| {
            user.name = name.into();
            user.email = email.into();
        })
    }

    /// Activate or deactivate a user.
    pub fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
        actor: &Actor,
    ) -> Result<User, AccessError> {
        self.update_user(user_id, actor, AuditAction::Update, |user| {
            user.is_active = is_active;
        })
    }

    /// Set or clear the user's standing-access expiry.
    pub fn set_user_expiry(
        &self,
        user_id: &UserId,
        access_expires_at: Option<DateTime<Utc>>,
        actor: &Actor,
    ) -> Result<User, AccessError> {
        self.update_user(user_id, actor, AuditAction::Update, |user| {
            user.access_expires_at = access_expires_at;
        })
    }

    /// Add a role to a user. Assigning an already-held role is a no-op.
    pub fn assign_role(
        &self,
        user_id: &UserId,
        role_id: &RoleId,
        actor: &Actor,
    ) -> Result<User, AccessError> {
        {
            let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
            if !roles.contains_key(role_id) {
                return Err(AccessError::RoleNotFound(role_id.0.clone()));
            }
        }
        self.update_user(user_id, actor, AuditAction::AssignRole, |user| {
            user.role_ids.insert(role_id.clone());
        })
    }

    fn update_user(
        &self,
        user_id: &UserId,
        actor: &Actor,
        action: AuditAction,
        apply: impl FnOnce(&mut User),
    ) -> Result<User, AccessError> {
        let (after, changes) = {
            let mut users = self.users.write().map_err(|_| AccessError::LockError)?;
            let user = users
                .get_mut(user_id)
                .ok_or_else(|| AccessError::UserNotFound(user_id.0.clone()))?;

            let before = user.clone();
            let mut after = user.clone();
            apply(&mut after);

            let changes = ChangeDiffer::diff_entities(&before, &after);
            if changes.is_empty() {
                return Ok(before);
            }
            *user = after.clone();
            (after, changes)
        };

        self.audit.append(
            AuditEntryDraft::new(action, entity::USER, user_id.as_str(), actor)
                .with_changes(changes),
        )?;
        Ok(after)
    }

    pub fn find_user(&self, user_id: &UserId) -> Result<Option<User>, AccessError> {
        let users = self.users.read().map_err(|_| AccessError::LockError)?;
        Ok(users.get(user_id).cloned())
    }

    // ── Role administration ──────────────────────────────────────────

    /// Create a custom role with an arbitrary permission set.
    pub fn create_role(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        permissions: Vec<String>,
        actor: &Actor,
    ) -> Result<Role, AccessError> {
        let role = Role::new(name, description, permissions);

        {
            let mut roles = self.roles.write().map_err(|_| AccessError::LockError)?;
            if roles.values().any(|existing| existing.name == role.name) {
                return Err(AccessError::DuplicateRole(role.name));
            }
            roles.insert(role.id.clone(), role.clone());
        }

        self.audit.append(
            AuditEntryDraft::new(AuditAction::CreateRole, entity::ROLE, role.id.as_str(), actor)
                .with_changes(ChangeDiffer::creation(&role)),
        )?;

        tracing::info!(role = %role.id, name = %role.name, "role created");
        Ok(role)
    }

    /// Replace a role's permission set. Identical sets are a no-op.
    pub fn update_role_permissions(
        &self,
        role_id: &RoleId,
        permissions: BTreeSet<String>,
        actor: &Actor,
    ) -> Result<Role, AccessError> {
        let (after, changes) = {
            let mut roles = self.roles.write().map_err(|_| AccessError::LockError)?;
            let role = roles
                .get_mut(role_id)
                .ok_or_else(|| AccessError::RoleNotFound(role_id.0.clone()))?;

            let before = role.clone();
            let mut after = role.clone();
            after.permissions = permissions;

            let changes = ChangeDiffer::diff_entities(&before, &after);
            if changes.is_empty() {
                return Ok(before);
            }
            *role = after.clone();
            (after, changes)
        };

        self.audit.append(
            AuditEntryDraft::new(AuditAction::UpdateRole, entity::ROLE, role_id.as_str(), actor)
                .with_changes(changes),
        )?;
        Ok(after)
    }

    pub fn get_role(&self, role_id: &RoleId) -> Result<Option<Role>, AccessError> {
        let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
        Ok(roles.get(role_id).cloned())
    }

    pub fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, AccessError> {
        let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
        Ok(roles.values().find(|role| role.name == name).cloned())
    }

    pub fn list_roles(&self) -> Result<Vec<Role>, AccessError> {
        let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
        let mut all: Vec<Role> = roles.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
