use serde::{Deserialize, Serialize};

use super::{AnalysisResult, EliminationGlobalStatus, ObjectGroup, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitReportStatus {
    Deleted,
    GlobalStatusKeep,
    GlobalStatusConflict,
    NonDestroyableHasChildUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectGroupReportStatus {
    Deleted,
    PartialDetachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitReportEntry {
    pub unit_id: String,
    pub originating_agency: Option<String>,
    pub initial_operation: Option<String>,
    pub object_group_id: Option<String>,
    pub status: UnitReportStatus,
}

impl UnitReportEntry {
    pub fn new(unit: &Unit, status: UnitReportStatus) -> Self {
        Self {
            unit_id: unit.id.clone(),
            originating_agency: unit.originating_agency.clone(),
            initial_operation: unit.initial_operation.clone(),
            object_group_id: unit.object_group_id.clone(),
            status,
        }
    }

    /// Report entry for a unit that classification kept. `None` for DESTROY.
    pub fn from_analysis(unit: &Unit, analysis: &AnalysisResult) -> Option<Self> {
        let status = match analysis.global_status {
            EliminationGlobalStatus::Keep => UnitReportStatus::GlobalStatusKeep,
            EliminationGlobalStatus::Conflict => UnitReportStatus::GlobalStatusConflict,
            EliminationGlobalStatus::Destroy => return None,
        };
        Some(Self::new(unit, status))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectGroupReportEntry {
    pub object_group_id: String,
    pub originating_agency: Option<String>,
    pub initial_operation: Option<String>,
    /// Binary objects removed with the group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_ids: Vec<String>,
    /// Parent links removed from a surviving group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_parent_unit_ids: Vec<String>,
    pub total_size: u64,
    pub status: ObjectGroupReportStatus,
}

impl ObjectGroupReportEntry {
    pub fn deleted(group: &ObjectGroup) -> Self {
        Self {
            object_group_id: group.id.clone(),
            originating_agency: group.originating_agency.clone(),
            initial_operation: group.initial_operation.clone(),
            object_ids: group.object_ids(),
            deleted_parent_unit_ids: Vec::new(),
            total_size: group.total_size(),
            status: ObjectGroupReportStatus::Deleted,
        }
    }

    pub fn detached(group: &ObjectGroup, removed_parents: Vec<String>) -> Self {
        Self {
            object_group_id: group.id.clone(),
            originating_agency: group.originating_agency.clone(),
            initial_operation: group.initial_operation.clone(),
            object_ids: Vec::new(),
            deleted_parent_unit_ids: removed_parents,
            total_size: 0,
            status: ObjectGroupReportStatus::PartialDetachment,
        }
    }
}

/// A row appended to the report store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportEntry {
    Unit(UnitReportEntry),
    ObjectGroup(ObjectGroupReportEntry),
}

impl From<UnitReportEntry> for ReportEntry {
    fn from(entry: UnitReportEntry) -> Self {
        ReportEntry::Unit(entry)
    }
}

impl From<ObjectGroupReportEntry> for ReportEntry {
    fn from(entry: ObjectGroupReportEntry) -> Self {
        ReportEntry::ObjectGroup(entry)
    }
}
