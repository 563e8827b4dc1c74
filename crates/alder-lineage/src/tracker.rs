//! The lineage tracker: rollover writer and chain traversal.

use crate::data_point::{DataPoint, DataPointUpdate, NewDataPoint};
use crate::error::LineageError;
use alder_audit::{entity, AuditAction, AuditEntryDraft, AuditLog, ChangeDiffer};
use alder_types::{Actor, DataPointId, PeriodId, SectionId};
use alder_workflow::EditGuard;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Where a rollover lands: the successor period and its section.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RolloverTarget {
    pub section_id: SectionId,
    pub period_id: PeriodId,
    pub period_name: String,
}

/// One version in a lineage chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineageVersion {
    pub data_point_id: DataPointId,
    pub period_name: String,
    pub value: String,
    pub content: String,
    /// False only at the period of origin.
    pub is_rolled_over: bool,
}

impl LineageVersion {
    fn from_data_point(dp: &DataPoint) -> Self {
        Self {
            data_point_id: dp.id.clone(),
            period_name: dp.period_name.clone(),
            value: dp.value.clone(),
            content: dp.content.clone(),
            is_rolled_over: dp.is_rolled_over(),
        }
    }
}

/// The reconstructed version chain for a data point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineageReport {
    pub data_point_id: DataPointId,
    pub title: String,
    pub current_version: LineageVersion,
    /// Ancestors, nearest period first.
    pub previous_versions: Vec<LineageVersion>,
    /// Length of the whole chain, current version included.
    pub total_periods: usize,
    /// True when a depth cap or a broken link cut the traversal short.
    pub has_more_history: bool,
}

/// Owns data points and the rollover links between them.
///
/// Content mutation consults the injected edit gate first; a locked
/// section rejects the write before anything changes.
pub struct LineageTracker {
    data_points: RwLock<HashMap<DataPointId, DataPoint>>,
    edit_guard: Arc<dyn EditGuard>,
    audit: Arc<AuditLog>,
    max_depth: Option<usize>,
}

impl LineageTracker {
    pub fn new(edit_guard: Arc<dyn EditGuard>, audit: Arc<AuditLog>) -> Self {
        Self {
            data_points: RwLock::new(HashMap::new()),
            edit_guard,
            audit,
            max_depth: None,
        }
    }

    /// Cap traversal depth. Uncapped traversal walks to the origin.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Author a brand-new data point. It carries no source link.
    pub fn create_data_point(
        &self,
        new: NewDataPoint,
        actor: &Actor,
    ) -> Result<DataPoint, LineageError> {
        self.ensure_editable(&new.section_id)?;

        let dp = DataPoint {
            id: DataPointId::generate(),
            section_id: new.section_id,
            period_id: new.period_id,
            period_name: new.period_name,
            title: new.title,
            value: new.value,
            content: new.content,
            source_period_id: None,
            source_period_name: None,
            source_data_point_id: None,
            rollover_timestamp: None,
            rollover_performed_by: None,
            rollover_performed_by_name: None,
        };

        {
            let mut data_points = self.data_points.write().map_err(|_| LineageError::LockError)?;
            data_points.insert(dp.id.clone(), dp.clone());
        }

        self.audit.append(
            AuditEntryDraft::new(AuditAction::Create, entity::DATA_POINT, dp.id.as_str(), actor)
                .with_changes(ChangeDiffer::creation(&dp)),
        )?;

        tracing::debug!(data_point = %dp.id, section = %dp.section_id, "data point created");
        Ok(dp)
    }

    /// Update tracked content fields. Identical values are a no-op that
    /// writes no audit entry; a locked section rejects the write.
    pub fn update_data_point(
        &self,
        data_point_id: &DataPointId,
        update: DataPointUpdate,
        actor: &Actor,
    ) -> Result<DataPoint, LineageError> {
        let section_id = {
            let data_points = self.data_points.read().map_err(|_| LineageError::LockError)?;
            data_points
                .get(data_point_id)
                .map(|dp| dp.section_id.clone())
                .ok_or_else(|| LineageError::DataPointNotFound(data_point_id.0.clone()))?
        };
        self.ensure_editable(&section_id)?;

        let (after, changes) = {
            let mut data_points = self.data_points.write().map_err(|_| LineageError::LockError)?;
            let dp = data_points
                .get_mut(data_point_id)
                .ok_or_else(|| LineageError::DataPointNotFound(data_point_id.0.clone()))?;

            let before = dp.clone();
            let mut after = dp.clone();
            if let Some(title) = update.title {
                after.title = title;
            }
            if let Some(value) = update.value {
                after.value = value;
            }
            if let Some(content) = update.content {
                after.content = content;
            }

            let changes = ChangeDiffer::diff_entities(&before, &after);
            if changes.is_empty() {
                return Ok(before);
            }
            *dp = after.clone();
            (after, changes)
        };

        self.audit.append(
            AuditEntryDraft::new(
                AuditAction::Update,
                entity::DATA_POINT,
                data_point_id.as_str(),
                actor,
            )
            .with_changes(changes),
        )?;
        Ok(after)
    }

    /// Copy a data point into a successor period, linking the copy back
    /// to its source. All lineage fields are set in one critical section.
    pub fn roll_over(
        &self,
        source_id: &DataPointId,
        target: RolloverTarget,
        actor: &Actor,
    ) -> Result<DataPoint, LineageError> {
        let rolled = {
            let mut data_points = self.data_points.write().map_err(|_| LineageError::LockError)?;
            let source = data_points
                .get(source_id)
                .cloned()
                .ok_or_else(|| LineageError::DataPointNotFound(source_id.0.clone()))?;

            if data_points.values().any(|dp| {
                dp.source_data_point_id.as_ref() == Some(source_id)
                    && dp.period_id == target.period_id
            }) {
                return Err(LineageError::AlreadyRolledOver {
                    source_point: source_id.0.clone(),
                    period: target.period_id.0.clone(),
                });
            }

            let rolled = DataPoint {
                id: DataPointId::generate(),
                section_id: target.section_id,
                period_id: target.period_id,
                period_name: target.period_name,
                title: source.title.clone(),
                value: source.value.clone(),
                content: source.content.clone(),
                source_period_id: Some(source.period_id.clone()),
                source_period_name: Some(source.period_name.clone()),
                source_data_point_id: Some(source.id.clone()),
                rollover_timestamp: Some(Utc::now()),
                rollover_performed_by: Some(actor.id.clone()),
                rollover_performed_by_name: Some(actor.name.clone()),
            };
            data_points.insert(rolled.id.clone(), rolled.clone());
            rolled
        };

        let source_period = rolled
            .source_period_name
            .clone()
            .unwrap_or_default();
        self.audit.append(
            AuditEntryDraft::new(
                AuditAction::RolloverDataPoint,
                entity::DATA_POINT,
                rolled.id.as_str(),
                actor,
            )
            .with_changes(ChangeDiffer::creation(&rolled))
            .with_note(format!("Rolled over from {}", source_period)),
        )?;

        tracing::info!(
            data_point = %rolled.id,
            source = %source_id,
            period = %rolled.period_id,
            "data point rolled over"
        );
        Ok(rolled)
    }

    /// Walk the source chain back to the period of origin.
    ///
    /// Returns `None` for an unknown starting point. A broken or cyclic
    /// link ends the walk early with `has_more_history = true`.
    pub fn cross_period_lineage(
        &self,
        data_point_id: &DataPointId,
    ) -> Result<Option<LineageReport>, LineageError> {
        let data_points = self.data_points.read().map_err(|_| LineageError::LockError)?;
        let Some(current) = data_points.get(data_point_id) else {
            return Ok(None);
        };

        let mut previous_versions = Vec::new();
        let mut visited: HashSet<DataPointId> = HashSet::new();
        visited.insert(current.id.clone());

        let mut cursor = current.source_data_point_id.clone();
        let mut has_more_history = false;

        while let Some(ancestor_id) = cursor {
            if let Some(cap) = self.max_depth {
                if previous_versions.len() >= cap {
                    has_more_history = true;
                    break;
                }
            }
            if !visited.insert(ancestor_id.clone()) {
                tracing::warn!(data_point = %data_point_id, "cycle in lineage chain");
                has_more_history = true;
                break;
            }
            match data_points.get(&ancestor_id) {
                Some(ancestor) => {
                    previous_versions.push(LineageVersion::from_data_point(ancestor));
                    cursor = ancestor.source_data_point_id.clone();
                }
                None => {
                    tracing::warn!(
                        data_point = %data_point_id,
                        missing = %ancestor_id,
                        "lineage chain references a missing ancestor"
                    );
                    has_more_history = true;
                    break;
                }
            }
        }

        let total_periods = 1 + previous_versions.len();
        Ok(Some(LineageReport {
            data_point_id: current.id.clone(),
            title: current.title.clone(),
            current_version: LineageVersion::from_data_point(current),
            previous_versions,
            total_periods,
            has_more_history,
        }))
    }

    pub fn get_data_point(
        &self,
        data_point_id: &DataPointId,
    ) -> Result<Option<DataPoint>, LineageError> {
        let data_points = self.data_points.read().map_err(|_| LineageError::LockError)?;
        Ok(data_points.get(data_point_id).cloned())
    }

    /// Data points belonging to one section.
    pub fn data_points_in_section(
        &self,
        section_id: &SectionId,
    ) -> Result<Vec<DataPoint>, LineageError> {
        let data_points = self.data_points.read().map_err(|_| LineageError::LockError)?;
        let mut found: Vec<DataPoint> = data_points
            .values()
            .filter(|dp| dp.section_id == *section_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(found)
    }

    fn ensure_editable(&self, section_id: &SectionId) -> Result<(), LineageError> {
        let gate = self.edit_guard.can_edit(section_id)?;
        if !gate.can_edit {
            return Err(LineageError::SectionLocked(
                gate.reason.unwrap_or_else(|| "section is locked".to_string()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_audit::AuditQuery;
    use alder_workflow::{EditGate, WorkflowResult};

    struct OpenGate;

    impl EditGuard for OpenGate {
        fn can_edit(&self, _section_id: &SectionId) -> WorkflowResult<EditGate> {
            Ok(EditGate::editable())
        }
    }

    struct ClosedGate;

    impl EditGuard for ClosedGate {
        fn can_edit(&self, _section_id: &SectionId) -> WorkflowResult<EditGate> {
            Ok(EditGate::locked("Section is awaiting approval (submitted by Sam)"))
        }
    }

    fn actor() -> Actor {
        Actor::new("u-1", "Robin Owner")
    }

    fn tracker() -> (Arc<AuditLog>, LineageTracker) {
        let audit = Arc::new(AuditLog::new());
        let tracker = LineageTracker::new(Arc::new(OpenGate), audit.clone());
        (audit, tracker)
    }

    fn new_dp(period: &str, period_name: &str) -> NewDataPoint {
        NewDataPoint {
            section_id: SectionId::new("sec-env-001"),
            period_id: PeriodId::new(period),
            period_name: period_name.into(),
            title: "Scope 1 emissions".into(),
            value: "1200".into(),
            content: "Direct emissions across all sites".into(),
        }
    }

    fn target(period: &str, period_name: &str) -> RolloverTarget {
        RolloverTarget {
            section_id: SectionId::new("sec-env-001"),
            period_id: PeriodId::new(period),
            period_name: period_name.into(),
        }
    }

    #[test]
    fn three_period_chain_walks_back_to_origin() {
        let (_, tracker) = tracker();

        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();
        let b = tracker.roll_over(&a.id, target("fy2024", "FY 2024"), &actor()).unwrap();
        tracker
            .update_data_point(
                &b.id,
                DataPointUpdate {
                    value: Some("1350".into()),
                    ..DataPointUpdate::default()
                },
                &actor(),
            )
            .unwrap();
        let c = tracker.roll_over(&b.id, target("fy2025", "FY 2025"), &actor()).unwrap();

        let report = tracker.cross_period_lineage(&c.id).unwrap().unwrap();
        assert_eq!(report.total_periods, 3);
        assert!(!report.has_more_history);
        assert!(report.current_version.is_rolled_over);
        assert_eq!(report.current_version.value, "1350");

        // Nearest ancestor first: B then A; the origin is not rolled over.
        assert_eq!(report.previous_versions.len(), 2);
        assert_eq!(report.previous_versions[0].period_name, "FY 2024");
        assert!(report.previous_versions[0].is_rolled_over);
        assert_eq!(report.previous_versions[1].period_name, "FY 2023");
        assert!(!report.previous_versions[1].is_rolled_over);
    }

    #[test]
    fn origin_lineage_is_a_single_period() {
        let (_, tracker) = tracker();
        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();

        let report = tracker.cross_period_lineage(&a.id).unwrap().unwrap();
        assert_eq!(report.total_periods, 1);
        assert!(report.previous_versions.is_empty());
        assert!(!report.current_version.is_rolled_over);
    }

    #[test]
    fn unknown_data_point_yields_none() {
        let (_, tracker) = tracker();
        let report = tracker
            .cross_period_lineage(&DataPointId::new("missing"))
            .unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn rollover_sets_all_lineage_fields_at_once() {
        let (_, tracker) = tracker();
        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();
        let b = tracker.roll_over(&a.id, target("fy2024", "FY 2024"), &actor()).unwrap();

        assert_eq!(b.source_data_point_id, Some(a.id.clone()));
        assert_eq!(b.source_period_id, Some(a.period_id));
        assert_eq!(b.source_period_name.as_deref(), Some("FY 2023"));
        assert!(b.rollover_timestamp.is_some());
        assert_eq!(b.rollover_performed_by, Some(actor().id));
        assert_eq!(b.rollover_performed_by_name.as_deref(), Some("Robin Owner"));
        assert_eq!(b.value, a.value);
    }

    #[test]
    fn duplicate_rollover_into_same_period_is_rejected() {
        let (_, tracker) = tracker();
        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();
        tracker.roll_over(&a.id, target("fy2024", "FY 2024"), &actor()).unwrap();

        let err = tracker
            .roll_over(&a.id, target("fy2024", "FY 2024"), &actor())
            .unwrap_err();
        assert!(matches!(err, LineageError::AlreadyRolledOver { .. }));

        // A different successor period is still fine.
        tracker.roll_over(&a.id, target("fy2025", "FY 2025"), &actor()).unwrap();
    }

    #[test]
    fn identical_update_writes_no_audit_entry() {
        let (audit, tracker) = tracker();
        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();
        let baseline = audit.len().unwrap();

        let unchanged = tracker
            .update_data_point(
                &a.id,
                DataPointUpdate {
                    value: Some(a.value.clone()),
                    ..DataPointUpdate::default()
                },
                &actor(),
            )
            .unwrap();
        assert_eq!(unchanged.value, a.value);
        assert_eq!(audit.len().unwrap(), baseline);

        tracker
            .update_data_point(
                &a.id,
                DataPointUpdate {
                    value: Some("1500".into()),
                    ..DataPointUpdate::default()
                },
                &actor(),
            )
            .unwrap();
        assert_eq!(audit.len().unwrap(), baseline + 1);

        let entries = audit
            .query(&AuditQuery::for_entity(entity::DATA_POINT, a.id.as_str()))
            .unwrap();
        assert_eq!(entries[0].action, AuditAction::Update);
        assert_eq!(entries[0].changes.len(), 1);
        assert_eq!(entries[0].changes[0].field, "value");
    }

    #[test]
    fn locked_section_rejects_content_mutation() {
        let audit = Arc::new(AuditLog::new());
        let open = LineageTracker::new(Arc::new(OpenGate), audit.clone());
        let a = open.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();

        // Same store contents, now behind a locked gate.
        let locked = LineageTracker::new(Arc::new(ClosedGate), audit.clone());
        {
            let mut dps = locked.data_points.write().unwrap();
            dps.insert(a.id.clone(), a.clone());
        }
        let baseline = audit.len().unwrap();

        let err = locked
            .update_data_point(
                &a.id,
                DataPointUpdate {
                    value: Some("9999".into()),
                    ..DataPointUpdate::default()
                },
                &actor(),
            )
            .unwrap_err();
        assert!(matches!(err, LineageError::SectionLocked(_)));
        assert!(err.to_string().contains("awaiting approval"));

        let stored = locked.get_data_point(&a.id).unwrap().unwrap();
        assert_eq!(stored.value, "1200");
        assert_eq!(audit.len().unwrap(), baseline);
    }

    #[test]
    fn depth_cap_truncates_and_flags_more_history() {
        let audit = Arc::new(AuditLog::new());
        let tracker = LineageTracker::new(Arc::new(OpenGate), audit).with_max_depth(1);

        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();
        let b = tracker.roll_over(&a.id, target("fy2024", "FY 2024"), &actor()).unwrap();
        let c = tracker.roll_over(&b.id, target("fy2025", "FY 2025"), &actor()).unwrap();

        let report = tracker.cross_period_lineage(&c.id).unwrap().unwrap();
        assert_eq!(report.previous_versions.len(), 1);
        assert_eq!(report.total_periods, 2);
        assert!(report.has_more_history);
    }

    #[test]
    fn broken_link_ends_the_walk_with_a_flag() {
        let (_, tracker) = tracker();
        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();
        let b = tracker.roll_over(&a.id, target("fy2024", "FY 2024"), &actor()).unwrap();

        // Corrupt the store: drop the ancestor.
        {
            let mut dps = tracker.data_points.write().unwrap();
            dps.remove(&a.id);
        }

        let report = tracker.cross_period_lineage(&b.id).unwrap().unwrap();
        assert!(report.previous_versions.is_empty());
        assert_eq!(report.total_periods, 1);
        assert!(report.has_more_history);
    }

    #[test]
    fn rollover_is_audited_with_a_note() {
        let (audit, tracker) = tracker();
        let a = tracker.create_data_point(new_dp("fy2023", "FY 2023"), &actor()).unwrap();
        let b = tracker.roll_over(&a.id, target("fy2024", "FY 2024"), &actor()).unwrap();

        let entries = audit
            .query(&AuditQuery {
                action: Some(AuditAction::RolloverDataPoint),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity_id, b.id.as_str());
        assert_eq!(entries[0].change_note.as_deref(), Some("Rolled over from FY 2023"));
        assert!(entries[0]
            .changes
            .iter()
            .any(|change| change.field == "source_data_point_id"));
    }
}
