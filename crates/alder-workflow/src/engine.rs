//! The workflow engine: owns section status and version transitions.

use crate::error::{WorkflowError, WorkflowResult};
use crate::section::{EditGate, NewSection, ReportSection, SectionStatus, SectionVersion};
use alder_audit::{entity, AuditAction, AuditEntryDraft, AuditLog, ChangeDiffer};
use alder_types::{Actor, PeriodId, SectionId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The edit gate seam consumed by content-mutating collaborators.
///
/// Injected rather than referenced concretely so stores can be swapped
/// and tests can stub the gate.
pub trait EditGuard: Send + Sync {
    fn can_edit(&self, section_id: &SectionId) -> WorkflowResult<EditGate>;
}

/// Governs the section lock/approval lifecycle.
///
/// Lock order is always `sections` before `versions`.
pub struct WorkflowEngine {
    sections: RwLock<HashMap<SectionId, ReportSection>>,
    versions: RwLock<HashMap<SectionId, Vec<SectionVersion>>>,
    audit: Arc<AuditLog>,
}

impl WorkflowEngine {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            sections: RwLock::new(HashMap::new()),
            versions: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Register a new section in draft at version 1.
    pub fn create_section(
        &self,
        new: NewSection,
        actor: &Actor,
    ) -> WorkflowResult<ReportSection> {
        let section = ReportSection {
            id: SectionId::generate(),
            period_id: new.period_id,
            catalog_code: new.catalog_code,
            title: new.title,
            status: SectionStatus::Draft,
            version_number: 1,
            submitted_for_approval_at: None,
            submitted_for_approval_by: None,
            submitted_for_approval_by_name: None,
            approved_at: None,
            approved_by: None,
            approved_by_name: None,
        };

        {
            let mut sections = self.sections.write().map_err(|_| WorkflowError::LockError)?;
            sections.insert(section.id.clone(), section.clone());
        }

        self.audit.append(
            AuditEntryDraft::new(
                AuditAction::Create,
                entity::REPORT_SECTION,
                section.id.as_str(),
                actor,
            )
            .with_changes(ChangeDiffer::creation(&section)),
        )?;

        tracing::info!(section = %section.id, period = %section.period_id, "section created");
        Ok(section)
    }

    /// Submit a draft or changes-requested section for approval, locking it.
    pub fn submit_for_approval(
        &self,
        section_id: &SectionId,
        actor: &Actor,
        note: Option<String>,
    ) -> WorkflowResult<ReportSection> {
        let (after, changes) = {
            let mut sections = self.sections.write().map_err(|_| WorkflowError::LockError)?;
            let section = sections
                .get_mut(section_id)
                .ok_or_else(|| WorkflowError::SectionNotFound(section_id.0.clone()))?;

            match section.status {
                SectionStatus::SubmittedForApproval => {
                    return Err(WorkflowError::AlreadySubmitted(section_id.0.clone()));
                }
                SectionStatus::Approved => {
                    return Err(WorkflowError::AlreadyApproved(section_id.0.clone()));
                }
                SectionStatus::Draft | SectionStatus::ChangesRequested => {}
            }

            // Re-validated at the transition itself, not only at creation,
            // so a section that reached this state through any path is
            // still checked.
            Self::validate_ready_for_submission(section)
                .map_err(|why| WorkflowError::IncompleteSection(section_id.0.clone(), why))?;

            let before = section.clone();
            section.status = SectionStatus::SubmittedForApproval;
            section.submitted_for_approval_at = Some(Utc::now());
            section.submitted_for_approval_by = Some(actor.id.clone());
            section.submitted_for_approval_by_name = Some(actor.name.clone());

            (section.clone(), ChangeDiffer::diff_entities(&before, section))
        };

        let mut draft = AuditEntryDraft::new(
            AuditAction::SubmitForApproval,
            entity::REPORT_SECTION,
            section_id.as_str(),
            actor,
        )
        .with_changes(changes);
        if let Some(note) = note {
            draft = draft.with_note(note);
        }
        self.audit.append(draft)?;

        tracing::info!(section = %section_id, by = %actor.id, "section submitted for approval");
        Ok(after)
    }

    /// Approve a submitted section, capturing an immutable version snapshot.
    pub fn approve(
        &self,
        section_id: &SectionId,
        actor: &Actor,
        note: Option<String>,
    ) -> WorkflowResult<ReportSection> {
        let (after, changes, snapshot) = {
            let mut sections = self.sections.write().map_err(|_| WorkflowError::LockError)?;
            let section = sections
                .get_mut(section_id)
                .ok_or_else(|| WorkflowError::SectionNotFound(section_id.0.clone()))?;

            if section.status != SectionStatus::SubmittedForApproval {
                return Err(WorkflowError::NotSubmitted(section_id.0.clone()));
            }
            Self::validate_ready_for_approval(section)
                .map_err(|why| WorkflowError::IncompleteSection(section_id.0.clone(), why))?;

            let before = section.clone();
            let now = Utc::now();
            section.status = SectionStatus::Approved;
            section.approved_at = Some(now);
            section.approved_by = Some(actor.id.clone());
            section.approved_by_name = Some(actor.name.clone());

            let snapshot = SectionVersion {
                section_id: section.id.clone(),
                version_number: section.version_number,
                title: section.title.clone(),
                approved_at: now,
                approved_by: actor.id.clone(),
                approved_by_name: actor.name.clone(),
                captured_at: now,
            };

            let mut versions = self.versions.write().map_err(|_| WorkflowError::LockError)?;
            versions
                .entry(section.id.clone())
                .or_default()
                .push(snapshot.clone());

            (
                section.clone(),
                ChangeDiffer::diff_entities(&before, section),
                snapshot,
            )
        };

        let mut draft = AuditEntryDraft::new(
            AuditAction::Approve,
            entity::REPORT_SECTION,
            section_id.as_str(),
            actor,
        )
        .with_changes(changes);
        if let Some(note) = note {
            draft = draft.with_note(note);
        }
        self.audit.append(draft)?;

        tracing::info!(
            section = %section_id,
            version = snapshot.version_number,
            by = %actor.id,
            "section approved"
        );
        Ok(after)
    }

    /// Send a submitted section back to its authors, unlocking it.
    pub fn request_changes(
        &self,
        section_id: &SectionId,
        actor: &Actor,
        note: Option<String>,
    ) -> WorkflowResult<ReportSection> {
        let (after, changes) = {
            let mut sections = self.sections.write().map_err(|_| WorkflowError::LockError)?;
            let section = sections
                .get_mut(section_id)
                .ok_or_else(|| WorkflowError::SectionNotFound(section_id.0.clone()))?;

            if section.status != SectionStatus::SubmittedForApproval {
                return Err(WorkflowError::NotAwaitingReview(
                    section_id.0.clone(),
                    section.status.to_string(),
                ));
            }

            let before = section.clone();
            section.status = SectionStatus::ChangesRequested;
            section.submitted_for_approval_at = None;
            section.submitted_for_approval_by = None;
            section.submitted_for_approval_by_name = None;

            (section.clone(), ChangeDiffer::diff_entities(&before, section))
        };

        let mut draft = AuditEntryDraft::new(
            AuditAction::RequestChanges,
            entity::REPORT_SECTION,
            section_id.as_str(),
            actor,
        )
        .with_changes(changes);
        if let Some(note) = note {
            draft = draft.with_note(note);
        }
        self.audit.append(draft)?;

        tracing::info!(section = %section_id, by = %actor.id, "changes requested");
        Ok(after)
    }

    /// Reopen an approved section as a new draft revision.
    ///
    /// The version number increments; the historical `approved_at` stays
    /// on the section while the approver and submission metadata clear.
    pub fn create_revision(
        &self,
        section_id: &SectionId,
        actor: &Actor,
    ) -> WorkflowResult<ReportSection> {
        let (after, changes) = {
            let mut sections = self.sections.write().map_err(|_| WorkflowError::LockError)?;
            let section = sections
                .get_mut(section_id)
                .ok_or_else(|| WorkflowError::SectionNotFound(section_id.0.clone()))?;

            if section.status != SectionStatus::Approved {
                return Err(WorkflowError::NotApproved(
                    section_id.0.clone(),
                    section.status.to_string(),
                ));
            }

            let before = section.clone();
            section.status = SectionStatus::Draft;
            section.version_number += 1;
            section.submitted_for_approval_at = None;
            section.submitted_for_approval_by = None;
            section.submitted_for_approval_by_name = None;
            section.approved_by = None;
            section.approved_by_name = None;

            (section.clone(), ChangeDiffer::diff_entities(&before, section))
        };

        self.audit.append(
            AuditEntryDraft::new(
                AuditAction::CreateRevision,
                entity::REPORT_SECTION,
                section_id.as_str(),
                actor,
            )
            .with_changes(changes),
        )?;

        tracing::info!(
            section = %section_id,
            version = after.version_number,
            "revision created"
        );
        Ok(after)
    }

    /// The edit gate. Editable exactly in draft and changes-requested.
    pub fn can_edit_section(&self, section_id: &SectionId) -> WorkflowResult<EditGate> {
        let sections = self.sections.read().map_err(|_| WorkflowError::LockError)?;
        let section = sections
            .get(section_id)
            .ok_or_else(|| WorkflowError::SectionNotFound(section_id.0.clone()))?;

        let gate = match section.status {
            SectionStatus::Draft | SectionStatus::ChangesRequested => EditGate::editable(),
            SectionStatus::SubmittedForApproval => {
                let submitter = section
                    .submitted_for_approval_by_name
                    .as_deref()
                    .unwrap_or("unknown");
                EditGate::locked(format!(
                    "Section is awaiting approval (submitted by {})",
                    submitter
                ))
            }
            SectionStatus::Approved => {
                EditGate::locked("Section is approved and locked; create a new revision to edit")
            }
        };
        Ok(gate)
    }

    pub fn get_section(&self, section_id: &SectionId) -> WorkflowResult<Option<ReportSection>> {
        let sections = self.sections.read().map_err(|_| WorkflowError::LockError)?;
        Ok(sections.get(section_id).cloned())
    }

    /// Sections belonging to a reporting period.
    pub fn sections_in_period(&self, period_id: &PeriodId) -> WorkflowResult<Vec<ReportSection>> {
        let sections = self.sections.read().map_err(|_| WorkflowError::LockError)?;
        let mut found: Vec<ReportSection> = sections
            .values()
            .filter(|section| section.period_id == *period_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.catalog_code.cmp(&b.catalog_code));
        Ok(found)
    }

    /// Approval snapshots for a section, newest first.
    pub fn versions(&self, section_id: &SectionId) -> WorkflowResult<Vec<SectionVersion>> {
        let versions = self.versions.read().map_err(|_| WorkflowError::LockError)?;
        let mut found = versions.get(section_id).cloned().unwrap_or_default();
        found.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(found)
    }

    // ── Completeness validation ──────────────────────────────────────

    fn validate_ready_for_submission(section: &ReportSection) -> Result<(), String> {
        if section.title.trim().is_empty() {
            return Err("section title is required".to_string());
        }
        if section.version_number == 0 {
            return Err("version number must start at 1".to_string());
        }
        Ok(())
    }

    fn validate_ready_for_approval(section: &ReportSection) -> Result<(), String> {
        if section.submitted_for_approval_at.is_none() || section.submitted_for_approval_by.is_none()
        {
            return Err("submission metadata is missing".to_string());
        }
        Ok(())
    }
}

impl EditGuard for WorkflowEngine {
    fn can_edit(&self, section_id: &SectionId) -> WorkflowResult<EditGate> {
        self.can_edit_section(section_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_audit::AuditQuery;
    use proptest::prelude::*;

    fn author() -> Actor {
        Actor::new("u-author", "Sam Author")
    }

    fn reviewer() -> Actor {
        Actor::new("u-reviewer", "Dana Reviewer")
    }

    fn setup() -> (Arc<AuditLog>, WorkflowEngine) {
        let audit = Arc::new(AuditLog::new());
        let engine = WorkflowEngine::new(audit.clone());
        (audit, engine)
    }

    fn make_section(engine: &WorkflowEngine) -> ReportSection {
        engine
            .create_section(
                NewSection {
                    period_id: PeriodId::new("fy2025"),
                    catalog_code: "ENV-001".into(),
                    title: "Energy consumption".into(),
                },
                &author(),
            )
            .unwrap()
    }

    #[test]
    fn full_approval_lifecycle() {
        let (_, engine) = setup();
        let section = make_section(&engine);
        assert_eq!(section.status, SectionStatus::Draft);
        assert_eq!(section.version_number, 1);

        let submitted = engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();
        assert_eq!(submitted.status, SectionStatus::SubmittedForApproval);
        assert_eq!(submitted.submitted_for_approval_by, Some(author().id));

        let approved = engine
            .approve(&section.id, &reviewer(), Some("looks complete".into()))
            .unwrap();
        assert_eq!(approved.status, SectionStatus::Approved);
        assert_eq!(approved.approved_by_name.as_deref(), Some("Dana Reviewer"));

        let versions = engine.versions(&section.id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
    }

    #[test]
    fn double_submit_is_a_state_conflict() {
        let (_, engine) = setup();
        let section = make_section(&engine);
        engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();

        let err = engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadySubmitted(_)));
        assert!(err.to_string().contains("already submitted"));
    }

    #[test]
    fn submitting_an_approved_section_points_at_revisions() {
        let (_, engine) = setup();
        let section = make_section(&engine);
        engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();
        engine.approve(&section.id, &reviewer(), None).unwrap();

        let err = engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyApproved(_)));
        assert!(err.to_string().contains("new revision"));
    }

    #[test]
    fn approve_outside_review_fails_without_mutating() {
        let (audit, engine) = setup();
        let section = make_section(&engine);
        let baseline = audit.len().unwrap();

        let err = engine.approve(&section.id, &reviewer(), None).unwrap_err();
        assert!(matches!(err, WorkflowError::NotSubmitted(_)));
        assert!(err.to_string().contains("must be submitted for approval"));

        let unchanged = engine.get_section(&section.id).unwrap().unwrap();
        assert_eq!(unchanged.status, SectionStatus::Draft);
        assert!(unchanged.approved_at.is_none());
        assert_eq!(audit.len().unwrap(), baseline);
    }

    #[test]
    fn request_changes_reopens_and_clears_submission_metadata() {
        let (_, engine) = setup();
        let section = make_section(&engine);
        engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();

        let reopened = engine
            .request_changes(&section.id, &reviewer(), Some("figures missing".into()))
            .unwrap();
        assert_eq!(reopened.status, SectionStatus::ChangesRequested);
        assert!(reopened.submitted_for_approval_at.is_none());
        assert!(reopened.submitted_for_approval_by.is_none());

        // Reopened sections can be resubmitted.
        let resubmitted = engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();
        assert_eq!(resubmitted.status, SectionStatus::SubmittedForApproval);

        let err = engine
            .request_changes(&SectionId::new("missing"), &reviewer(), None)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn request_changes_requires_a_submitted_section() {
        let (_, engine) = setup();
        let section = make_section(&engine);

        let err = engine
            .request_changes(&section.id, &reviewer(), None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotAwaitingReview(_, _)));
        assert!(err.to_string().contains("Only submitted sections"));
    }

    #[test]
    fn revision_bumps_version_and_returns_to_draft() {
        let (_, engine) = setup();
        let section = make_section(&engine);
        engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();
        let approved = engine.approve(&section.id, &reviewer(), None).unwrap();
        let approved_at = approved.approved_at;

        let revised = engine.create_revision(&section.id, &author()).unwrap();
        assert_eq!(revised.status, SectionStatus::Draft);
        assert_eq!(revised.version_number, 2);
        assert_eq!(revised.approved_at, approved_at);
        assert!(revised.approved_by.is_none());
        assert!(revised.submitted_for_approval_at.is_none());

        // Second approval captures version 2 and sorts newest first.
        engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();
        engine.approve(&section.id, &reviewer(), None).unwrap();
        let versions = engine.versions(&section.id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_number, 2);
        assert_eq!(versions[1].version_number, 1);
    }

    #[test]
    fn revision_requires_an_approved_section() {
        let (_, engine) = setup();
        let section = make_section(&engine);

        let err = engine.create_revision(&section.id, &author()).unwrap_err();
        assert!(matches!(err, WorkflowError::NotApproved(_, _)));
        assert!(err.to_string().contains("Only approved sections"));
    }

    #[test]
    fn edit_gate_tracks_status() {
        let (_, engine) = setup();
        let section = make_section(&engine);

        assert!(engine.can_edit_section(&section.id).unwrap().can_edit);

        engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();
        let gate = engine.can_edit_section(&section.id).unwrap();
        assert!(!gate.can_edit);
        assert!(gate.reason.unwrap().contains("Sam Author"));

        engine.approve(&section.id, &reviewer(), None).unwrap();
        let gate = engine.can_edit_section(&section.id).unwrap();
        assert!(!gate.can_edit);
        assert!(gate.reason.unwrap().contains("create a new revision"));

        engine.create_revision(&section.id, &author()).unwrap();
        assert!(engine.can_edit_section(&section.id).unwrap().can_edit);
    }

    #[test]
    fn approval_revalidates_submission_metadata() {
        let (_, engine) = setup();
        let section = make_section(&engine);

        // Simulate corrupted state: the status flipped without going
        // through submit, so the submission metadata never landed.
        {
            let mut sections = engine.sections.write().unwrap();
            sections.get_mut(&section.id).unwrap().status =
                SectionStatus::SubmittedForApproval;
        }

        let err = engine.approve(&section.id, &reviewer(), None).unwrap_err();
        assert!(matches!(err, WorkflowError::IncompleteSection(_, _)));
        assert!(err.to_string().contains("submission metadata"));
    }

    #[test]
    fn submission_revalidates_completeness() {
        let (_, engine) = setup();
        let section = make_section(&engine);

        {
            let mut sections = engine.sections.write().unwrap();
            sections.get_mut(&section.id).unwrap().title = "   ".into();
        }

        let err = engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::IncompleteSection(_, _)));
    }

    #[test]
    fn each_transition_writes_exactly_one_entry() {
        let (audit, engine) = setup();
        let section = make_section(&engine);

        engine
            .submit_for_approval(&section.id, &author(), None)
            .unwrap();
        engine.approve(&section.id, &reviewer(), None).unwrap();
        engine.create_revision(&section.id, &author()).unwrap();

        let entries = audit
            .query(&AuditQuery::for_entity(
                entity::REPORT_SECTION,
                section.id.as_str(),
            ))
            .unwrap();
        // create + submit + approve + revision
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].action, AuditAction::CreateRevision);
        assert_eq!(entries[3].action, AuditAction::Create);

        let approve_entry = entries
            .iter()
            .find(|entry| entry.action == AuditAction::Approve)
            .unwrap();
        assert!(approve_entry
            .changes
            .iter()
            .any(|change| change.field == "status"));
    }

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Submit,
        Approve,
        RequestChanges,
        Revise,
    }

    fn op_strategy() -> impl Strategy<Value = Vec<Op>> {
        proptest::collection::vec(
            prop_oneof![
                Just(Op::Submit),
                Just(Op::Approve),
                Just(Op::RequestChanges),
                Just(Op::Revise),
            ],
            0..24,
        )
    }

    proptest! {
        #[test]
        fn property_status_stays_legal_and_version_monotone(ops in op_strategy()) {
            let (_, engine) = setup();
            let section = make_section(&engine);
            let mut expected_version = 1u32;

            for op in ops {
                let result = match op {
                    Op::Submit => engine.submit_for_approval(&section.id, &author(), None),
                    Op::Approve => engine.approve(&section.id, &reviewer(), None),
                    Op::RequestChanges => engine.request_changes(&section.id, &reviewer(), None),
                    Op::Revise => engine.create_revision(&section.id, &author()),
                };
                if let (Op::Revise, Ok(ref section)) = (op, &result) {
                    expected_version += 1;
                    prop_assert_eq!(section.version_number, expected_version);
                }

                let current = engine.get_section(&section.id).unwrap().unwrap();
                prop_assert_eq!(current.version_number, expected_version);
                prop_assert_eq!(
                    current.status.is_editable(),
                    matches!(current.status, SectionStatus::Draft | SectionStatus::ChangesRequested)
                );
            }
        }
    }
}
