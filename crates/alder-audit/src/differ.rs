//! Change differ: field-level comparison of entity snapshots.
//!
//! Entities expose their semantically-tracked fields as an ordered
//! snapshot; internal bookkeeping fields are excluded by omission.
//! An empty diff means "no audit entry", never a vacuous one.

use crate::entry::{FieldChange, FieldValue};

/// Ordered list of tracked fields for one entity state.
pub type FieldSnapshot = Vec<(&'static str, FieldValue)>;

/// An entity whose mutations are tracked field-by-field in the audit trail.
pub trait Auditable {
    /// The entity type tag recorded on audit entries.
    fn entity_type() -> &'static str;

    /// Tracked fields in their audit-report order.
    fn audit_snapshot(&self) -> FieldSnapshot;
}

/// Computes field-level differences between two snapshots.
pub struct ChangeDiffer;

impl ChangeDiffer {
    /// Diff two snapshots. Fields are compared by name; order follows the
    /// new snapshot, with fields present only in the old snapshot appended
    /// last (diffed against `Absent`). No side effects.
    pub fn diff(old: &FieldSnapshot, new: &FieldSnapshot) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        for (field, new_value) in new {
            let old_value = old
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, value)| value.clone())
                .unwrap_or(FieldValue::Absent);

            if old_value != *new_value {
                changes.push(FieldChange::new(*field, old_value, new_value.clone()));
            }
        }

        for (field, old_value) in old {
            if new.iter().any(|(name, _)| name == field) {
                continue;
            }
            if !old_value.is_absent() {
                changes.push(FieldChange::new(*field, old_value.clone(), FieldValue::Absent));
            }
        }

        changes
    }

    /// Diff two states of the same entity.
    pub fn diff_entities<T: Auditable>(old: &T, new: &T) -> Vec<FieldChange> {
        Self::diff(&old.audit_snapshot(), &new.audit_snapshot())
    }

    /// Diff for a freshly created entity: every present field against `Absent`.
    pub fn creation<T: Auditable>(entity: &T) -> Vec<FieldChange> {
        Self::diff(&Vec::new(), &entity.audit_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        name: String,
        size: u32,
        tags: Vec<String>,
        note: Option<String>,
    }

    impl Auditable for Widget {
        fn entity_type() -> &'static str {
            "Widget"
        }

        fn audit_snapshot(&self) -> FieldSnapshot {
            vec![
                ("name", FieldValue::text(&self.name)),
                ("size", self.size.into()),
                ("tags", self.tags.clone().into()),
                ("note", FieldValue::opt_text(self.note.as_deref())),
            ]
        }
    }

    fn widget() -> Widget {
        Widget {
            name: "scope-1".into(),
            size: 3,
            tags: vec!["env".into()],
            note: None,
        }
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let a = widget();
        let b = widget();
        assert!(ChangeDiffer::diff_entities(&a, &b).is_empty());
    }

    #[test]
    fn changed_fields_are_reported_in_order() {
        let old = widget();
        let mut new = widget();
        new.name = "scope-2".into();
        new.tags.push("social".into());

        let changes = ChangeDiffer::diff_entities(&old, &new);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "name");
        assert_eq!(changes[0].old_value, FieldValue::text("scope-1"));
        assert_eq!(changes[0].new_value, FieldValue::text("scope-2"));
        assert_eq!(changes[1].field, "tags");
    }

    #[test]
    fn optional_field_gaining_a_value_diffs_against_absent() {
        let old = widget();
        let mut new = widget();
        new.note = Some("restated".into());

        let changes = ChangeDiffer::diff_entities(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value, FieldValue::Absent);
        assert_eq!(changes[0].new_value, FieldValue::text("restated"));
    }

    #[test]
    fn creation_diff_lists_every_present_field() {
        let w = widget();
        let changes = ChangeDiffer::creation(&w);
        // note is Absent on both sides, so it does not appear
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.old_value == FieldValue::Absent));
    }

    #[test]
    fn collection_equality_is_by_content() {
        let a = widget();
        let mut b = widget();
        b.tags = vec!["env".into()];
        assert!(ChangeDiffer::diff_entities(&a, &b).is_empty());
    }
}
