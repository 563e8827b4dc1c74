//! Data points and their lineage-relevant fields.

use alder_audit::{Auditable, FieldSnapshot, FieldValue};
use alder_types::{DataPointId, PeriodId, SectionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured disclosure value inside a section.
///
/// A data point created by rollover always carries
/// `source_data_point_id`; an originally authored one never does. The
/// rollover fields are set together, once, by the rollover writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataPoint {
    pub id: DataPointId,
    pub section_id: SectionId,
    pub period_id: PeriodId,
    pub period_name: String,
    pub title: String,
    pub value: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_period_id: Option<PeriodId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_period_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_data_point_id: Option<DataPointId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollover_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollover_performed_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollover_performed_by_name: Option<String>,
}

impl DataPoint {
    pub fn is_rolled_over(&self) -> bool {
        self.source_data_point_id.is_some()
    }
}

impl Auditable for DataPoint {
    fn entity_type() -> &'static str {
        alder_audit::entity::DATA_POINT
    }

    fn audit_snapshot(&self) -> FieldSnapshot {
        vec![
            ("title", FieldValue::text(&self.title)),
            ("value", FieldValue::text(&self.value)),
            ("content", FieldValue::text(&self.content)),
            ("period_name", FieldValue::text(&self.period_name)),
            (
                "source_data_point_id",
                FieldValue::opt_text(self.source_data_point_id.as_ref().map(|id| id.as_str())),
            ),
        ]
    }
}

/// Input for authoring a data point from scratch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewDataPoint {
    pub section_id: SectionId,
    pub period_id: PeriodId,
    pub period_name: String,
    pub title: String,
    pub value: String,
    pub content: String,
}

/// Field-wise update; `None` keeps the current value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataPointUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_points_are_not_rolled_over() {
        let dp = DataPoint {
            id: DataPointId::new("dp-1"),
            section_id: SectionId::new("sec-1"),
            period_id: PeriodId::new("fy2024"),
            period_name: "FY 2024".into(),
            title: "Scope 1 emissions".into(),
            value: "1200".into(),
            content: "Direct emissions across all sites".into(),
            source_period_id: None,
            source_period_name: None,
            source_data_point_id: None,
            rollover_timestamp: None,
            rollover_performed_by: None,
            rollover_performed_by_name: None,
        };
        assert!(!dp.is_rolled_over());
    }
}
