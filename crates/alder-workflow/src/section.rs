//! Report sections, their workflow status, and approval snapshots.

use alder_audit::{Auditable, FieldSnapshot, FieldValue};
use alder_types::{PeriodId, SectionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow status of a report section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionStatus {
    Draft,
    SubmittedForApproval,
    Approved,
    ChangesRequested,
}

impl SectionStatus {
    /// Content is editable exactly in the two unlocked states.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::ChangesRequested)
    }
}

impl std::fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Draft => "draft",
            Self::SubmittedForApproval => "submitted-for-approval",
            Self::Approved => "approved",
            Self::ChangesRequested => "changes-requested",
        };
        write!(f, "{}", tag)
    }
}

/// A report section as the workflow engine sees it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: SectionId,
    pub period_id: PeriodId,
    /// Stable catalog identifier correlating the section across periods.
    pub catalog_code: String,
    pub title: String,
    pub status: SectionStatus,
    /// Starts at 1; increments only when an approved section is revised.
    pub version_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_for_approval_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_for_approval_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_for_approval_by_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by_name: Option<String>,
}

impl Auditable for ReportSection {
    fn entity_type() -> &'static str {
        alder_audit::entity::REPORT_SECTION
    }

    fn audit_snapshot(&self) -> FieldSnapshot {
        vec![
            ("title", FieldValue::text(&self.title)),
            ("status", FieldValue::text(self.status.to_string())),
            ("version_number", self.version_number.into()),
            (
                "submitted_for_approval_by",
                FieldValue::opt_text(
                    self.submitted_for_approval_by
                        .as_ref()
                        .map(|id| id.as_str()),
                ),
            ),
            (
                "approved_by",
                FieldValue::opt_text(self.approved_by.as_ref().map(|id| id.as_str())),
            ),
        ]
    }
}

/// Input for registering a section with the workflow engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSection {
    pub period_id: PeriodId,
    pub catalog_code: String,
    pub title: String,
}

/// Immutable snapshot captured when a section is approved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectionVersion {
    pub section_id: SectionId,
    pub version_number: u32,
    pub title: String,
    pub approved_at: DateTime<Utc>,
    pub approved_by: UserId,
    pub approved_by_name: String,
    pub captured_at: DateTime<Utc>,
}

/// Result of the edit gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditGate {
    pub can_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EditGate {
    pub fn editable() -> Self {
        Self {
            can_edit: true,
            reason: None,
        }
    }

    pub fn locked(reason: impl Into<String>) -> Self {
        Self {
            can_edit: false,
            reason: Some(reason.into()),
        }
    }
}
