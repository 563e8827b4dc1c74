//! Audit entry types: actions, field changes, and the immutable entry.

use alder_types::{Actor, EntryId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verb tag describing what an audit entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    CreateRole,
    UpdateRole,
    AssignRole,
    GrantSectionAccess,
    RevokeSectionAccess,
    PermissionCheckAllowed,
    PermissionCheckDenied,
    ActivateBreakGlass,
    DeactivateBreakGlass,
    SubmitForApproval,
    Approve,
    RequestChanges,
    CreateRevision,
    RolloverDataPoint,
}

impl AuditAction {
    /// Whether an entry with this action only makes sense with a non-empty
    /// change list. Event-style actions (session lifecycle, permission
    /// checks) are recorded even when no field changed.
    pub fn requires_changes(&self) -> bool {
        !matches!(
            self,
            Self::PermissionCheckAllowed
                | Self::PermissionCheckDenied
                | Self::ActivateBreakGlass
                | Self::DeactivateBreakGlass
        )
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::CreateRole => "create-role",
            Self::UpdateRole => "update-role",
            Self::AssignRole => "assign-role",
            Self::GrantSectionAccess => "grant-section-access",
            Self::RevokeSectionAccess => "revoke-section-access",
            Self::PermissionCheckAllowed => "permission-check-allowed",
            Self::PermissionCheckDenied => "permission-check-denied",
            Self::ActivateBreakGlass => "activate-break-glass",
            Self::DeactivateBreakGlass => "deactivate-break-glass",
            Self::SubmitForApproval => "submit-for-approval",
            Self::Approve => "approve",
            Self::RequestChanges => "request-changes",
            Self::CreateRevision => "create-revision",
            Self::RolloverDataPoint => "rollover-data-point",
        };
        write!(f, "{}", tag)
    }
}

/// A tracked field value. Equality is by content, never by reference,
/// so collection-valued fields compare element-wise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    List(Vec<String>),
    /// The field had no value on this side of the diff.
    Absent,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Optional text maps to `Absent` when missing.
    pub fn opt_text(value: Option<&str>) -> Self {
        match value {
            Some(v) => Self::Text(v.to_string()),
            None => Self::Absent,
        }
    }

    /// Optional timestamp rendered as RFC 3339 text.
    pub fn timestamp(value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(ts) => Self::Text(ts.to_rfc3339()),
            None => Self::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::List(v) => write!(f, "[{}]", v.join(", ")),
            Self::Absent => write!(f, "<absent>"),
        }
    }
}

/// One field-level before/after difference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old_value: FieldValue, new_value: FieldValue) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
        }
    }
}

/// Draft for an audit entry; the log assigns id, sequence, and timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntryDraft {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: UserId,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_note: Option<String>,
    pub changes: Vec<FieldChange>,
    pub is_break_glass_action: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_glass_session_id: Option<SessionId>,
}

impl AuditEntryDraft {
    pub fn new(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        actor: &Actor,
    ) -> Self {
        Self {
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            user_id: actor.id.clone(),
            user_name: actor.name.clone(),
            change_note: None,
            changes: vec![],
            is_break_glass_action: false,
            break_glass_session_id: None,
        }
    }

    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.change_note = Some(note.into());
        self
    }

    /// Tag this draft as performed under an active break-glass session.
    pub fn under_break_glass(mut self, session_id: SessionId) -> Self {
        self.is_break_glass_action = true;
        self.break_glass_session_id = Some(session_id);
        self
    }
}

/// An immutable audit log entry.
///
/// `sequence` is a monotone insertion counter; it breaks ordering ties
/// between entries sharing a timestamp so that query results stay in
/// reverse insertion order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: EntryId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: UserId,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_note: Option<String>,
    pub changes: Vec<FieldChange>,
    pub is_break_glass_action: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_glass_session_id: Option<SessionId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tags_are_kebab_case() {
        assert_eq!(AuditAction::ActivateBreakGlass.to_string(), "activate-break-glass");
        assert_eq!(
            AuditAction::PermissionCheckDenied.to_string(),
            "permission-check-denied"
        );
        assert_eq!(AuditAction::Update.to_string(), "update");
    }

    #[test]
    fn action_serde_matches_display() {
        let json = serde_json::to_string(&AuditAction::SubmitForApproval).unwrap();
        assert_eq!(json, "\"submit-for-approval\"");
        let back: AuditAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AuditAction::SubmitForApproval);
    }

    #[test]
    fn event_actions_do_not_require_changes() {
        assert!(!AuditAction::PermissionCheckAllowed.requires_changes());
        assert!(!AuditAction::ActivateBreakGlass.requires_changes());
        assert!(AuditAction::Update.requires_changes());
        assert!(AuditAction::Approve.requires_changes());
    }

    #[test]
    fn field_values_compare_by_content() {
        let a = FieldValue::List(vec!["x".into(), "y".into()]);
        let b = FieldValue::List(vec!["x".into(), "y".into()]);
        let c = FieldValue::List(vec!["y".into(), "x".into()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn draft_builder_tags_break_glass() {
        let actor = Actor::new("u-1", "Ops Admin");
        let draft = AuditEntryDraft::new(AuditAction::Update, "DataPoint", "dp-1", &actor)
            .under_break_glass(SessionId::new("bg-1"));
        assert!(draft.is_break_glass_action);
        assert_eq!(draft.break_glass_session_id, Some(SessionId::new("bg-1")));
    }
}
