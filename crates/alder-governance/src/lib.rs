//! Alder Governance - the wired governance core
//!
//! One audit log threads through every component: permission checks,
//! break-glass sessions, workflow transitions, and data point mutations
//! all land in the same append-only ledger. The break-glass controller
//! is installed as the ledger's entry tagger, so anything done while a
//! session is active is attributed to it automatically.
//!
//! The core is an in-process library; an HTTP layer translating these
//! calls to REST lives elsewhere. Writers for one tenant store must be
//! serialized by the caller; reads may run concurrently.

#![deny(unsafe_code)]

use alder_access::{AccessError, PermissionDecision, PermissionEngine, PermissionMatrix};
use alder_audit::{AuditError, AuditLog, AuditLogEntry, AuditQuery, AuditStatistics};
use alder_breakglass::{
    ActivationRequest, BreakGlassController, BreakGlassError, BreakGlassSession,
};
use alder_lineage::{
    DataPoint, DataPointUpdate, LineageError, LineageReport, LineageTracker, NewDataPoint,
    RolloverTarget,
};
use alder_types::{Actor, DataPointId, PeriodId, SectionId, SessionId, UserId};
use alder_workflow::{
    EditGate, EditGuard, NewSection, ReportSection, WorkflowEngine, WorkflowError,
};
use std::sync::Arc;
use thiserror::Error;

pub use alder_access as access;
pub use alder_audit as audit;
pub use alder_breakglass as breakglass;
pub use alder_lineage as lineage;
pub use alder_types as types;
pub use alder_workflow as workflow;

/// Errors surfaced by the facade, one variant per component.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    BreakGlass(#[from] BreakGlassError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Lineage(#[from] LineageError),
}

pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// The governance core: audit, access, break-glass, workflow, lineage,
/// sharing one store instance per tenant.
pub struct GovernanceCore {
    audit: Arc<AuditLog>,
    permissions: Arc<PermissionEngine>,
    break_glass: Arc<BreakGlassController>,
    workflow: Arc<WorkflowEngine>,
    lineage: Arc<LineageTracker>,
}

impl GovernanceCore {
    pub fn new() -> GovernanceResult<Self> {
        let audit = Arc::new(AuditLog::new());
        let permissions = Arc::new(PermissionEngine::new(audit.clone()));
        let break_glass = Arc::new(BreakGlassController::new(
            permissions.clone(),
            audit.clone(),
        ));
        let workflow = Arc::new(WorkflowEngine::new(audit.clone()));
        let edit_guard: Arc<dyn EditGuard> = workflow.clone();
        let lineage = Arc::new(LineageTracker::new(edit_guard, audit.clone()));

        audit.set_tagger(break_glass.clone())?;
        tracing::debug!("governance core initialized");

        Ok(Self {
            audit,
            permissions,
            break_glass,
            workflow,
            lineage,
        })
    }

    // ── Component access ─────────────────────────────────────────────

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn permissions(&self) -> &Arc<PermissionEngine> {
        &self.permissions
    }

    pub fn break_glass(&self) -> &Arc<BreakGlassController> {
        &self.break_glass
    }

    pub fn workflow(&self) -> &Arc<WorkflowEngine> {
        &self.workflow
    }

    pub fn lineage(&self) -> &Arc<LineageTracker> {
        &self.lineage
    }

    // ── Audit surface ────────────────────────────────────────────────

    pub fn query_audit(&self, query: &AuditQuery) -> GovernanceResult<Vec<AuditLogEntry>> {
        Ok(self.audit.query(query)?)
    }

    pub fn audit_statistics(&self) -> GovernanceResult<AuditStatistics> {
        Ok(self.audit.statistics()?)
    }

    // ── Permission surface ───────────────────────────────────────────

    pub fn check_permission(
        &self,
        user_id: &UserId,
        resource_type: &str,
        action: &str,
    ) -> GovernanceResult<PermissionDecision> {
        Ok(self
            .permissions
            .check_permission(user_id, resource_type, action)?)
    }

    pub fn permission_matrix(&self) -> GovernanceResult<PermissionMatrix> {
        Ok(self.permissions.permission_matrix()?)
    }

    // ── Break-glass surface ──────────────────────────────────────────

    pub fn activate_break_glass(
        &self,
        request: ActivationRequest,
    ) -> GovernanceResult<BreakGlassSession> {
        Ok(self.break_glass.activate(request)?)
    }

    pub fn deactivate_break_glass(
        &self,
        session_id: &SessionId,
        deactivated_by: &Actor,
        note: Option<String>,
    ) -> GovernanceResult<BreakGlassSession> {
        Ok(self.break_glass.deactivate(session_id, deactivated_by, note)?)
    }

    // ── Workflow surface ─────────────────────────────────────────────

    pub fn create_section(
        &self,
        new: NewSection,
        actor: &Actor,
    ) -> GovernanceResult<ReportSection> {
        Ok(self.workflow.create_section(new, actor)?)
    }

    pub fn submit_for_approval(
        &self,
        section_id: &SectionId,
        actor: &Actor,
        note: Option<String>,
    ) -> GovernanceResult<ReportSection> {
        Ok(self.workflow.submit_for_approval(section_id, actor, note)?)
    }

    pub fn approve_section(
        &self,
        section_id: &SectionId,
        actor: &Actor,
        note: Option<String>,
    ) -> GovernanceResult<ReportSection> {
        Ok(self.workflow.approve(section_id, actor, note)?)
    }

    pub fn request_changes(
        &self,
        section_id: &SectionId,
        actor: &Actor,
        note: Option<String>,
    ) -> GovernanceResult<ReportSection> {
        Ok(self.workflow.request_changes(section_id, actor, note)?)
    }

    pub fn create_revision(
        &self,
        section_id: &SectionId,
        actor: &Actor,
    ) -> GovernanceResult<ReportSection> {
        Ok(self.workflow.create_revision(section_id, actor)?)
    }

    pub fn can_edit_section(&self, section_id: &SectionId) -> GovernanceResult<EditGate> {
        Ok(self.workflow.can_edit_section(section_id)?)
    }

    // ── Lineage surface ──────────────────────────────────────────────

    pub fn create_data_point(
        &self,
        new: NewDataPoint,
        actor: &Actor,
    ) -> GovernanceResult<DataPoint> {
        Ok(self.lineage.create_data_point(new, actor)?)
    }

    pub fn update_data_point(
        &self,
        data_point_id: &DataPointId,
        update: DataPointUpdate,
        actor: &Actor,
    ) -> GovernanceResult<DataPoint> {
        Ok(self.lineage.update_data_point(data_point_id, update, actor)?)
    }

    pub fn roll_over_data_point(
        &self,
        source_id: &DataPointId,
        target: RolloverTarget,
        actor: &Actor,
    ) -> GovernanceResult<DataPoint> {
        Ok(self.lineage.roll_over(source_id, target, actor)?)
    }

    pub fn cross_period_lineage(
        &self,
        data_point_id: &DataPointId,
    ) -> GovernanceResult<Option<LineageReport>> {
        Ok(self.lineage.cross_period_lineage(data_point_id)?)
    }

    // ── Cross-component queries ──────────────────────────────────────

    /// Sections of a period the user can reach through unexpired grants.
    pub fn accessible_sections(
        &self,
        user_id: &UserId,
        period_id: &PeriodId,
    ) -> GovernanceResult<Vec<ReportSection>> {
        let granted = self.permissions.accessible_sections(user_id)?;
        let sections = self.workflow.sections_in_period(period_id)?;
        Ok(sections
            .into_iter()
            .filter(|section| granted.contains(&section.id))
            .collect())
    }

    /// Grant-accessible sections of a period that are currently unlocked.
    pub fn sections_editable_by(
        &self,
        user_id: &UserId,
        period_id: &PeriodId,
    ) -> GovernanceResult<Vec<ReportSection>> {
        let mut editable = Vec::new();
        for section in self.accessible_sections(user_id, period_id)? {
            if self.workflow.can_edit_section(&section.id)?.can_edit {
                editable.push(section);
            }
        }
        Ok(editable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_wires_one_audit_log_through_every_component() {
        let core = GovernanceCore::new().unwrap();
        assert!(core.audit_log().is_empty().unwrap());

        // The permission engine writes into the same log the facade reads.
        core.check_permission(&UserId::new("ghost"), "sections", "view")
            .unwrap();
        assert_eq!(core.audit_log().len().unwrap(), 1);
        assert_eq!(core.audit_statistics().unwrap().total_entries, 1);
    }
}
