//! Archive records handled by the elimination pipeline.

mod analysis;
mod register;
mod report;
mod rules;

pub use analysis::{AnalysisResult, EliminationGlobalStatus, ExtendedInfo};
pub use register::{AccessionRegisterDelta, RegisterValue};
pub use report::{
    ObjectGroupReportEntry, ObjectGroupReportStatus, ReportEntry, UnitReportEntry,
    UnitReportStatus,
};
pub use rules::{
    CategoryInheritance, FINAL_ACTION, FinalAction, InheritedProperty, InheritedRule,
    RuleCategory, UnitInheritedRules,
};

use serde::{Deserialize, Serialize};

/// Storage strategy assumed when a record does not name one.
pub const DEFAULT_STRATEGY: &str = common::config::DEFAULT_STRATEGY;

fn default_strategy() -> String {
    DEFAULT_STRATEGY.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitType {
    /// Holding or filing unit organising other units
    Structural,
    /// Unit carrying archived content
    Leaf,
}

/// An archive unit. Snapshot read once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    #[serde(default)]
    pub originating_agency: Option<String>,
    pub unit_type: UnitType,
    /// Distance from the root. Deeper units sort first.
    pub depth: u32,
    /// Direct parent unit ids
    #[serde(default)]
    pub parents: Vec<String>,
    /// Every unit id on any path up to the roots
    #[serde(default)]
    pub ancestors: Vec<String>,
    #[serde(default)]
    pub object_group_id: Option<String>,
    /// Ingest operation that created the unit
    #[serde(default)]
    pub initial_operation: Option<String>,
    #[serde(default = "default_strategy")]
    pub strategy_id: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Unit {
    pub fn new(id: impl Into<String>, depth: u32) -> Self {
        Self {
            id: id.into(),
            originating_agency: None,
            unit_type: UnitType::Leaf,
            depth,
            parents: Vec::new(),
            ancestors: Vec::new(),
            object_group_id: None,
            initial_operation: None,
            strategy_id: default_strategy(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_agency(mut self, agency: impl Into<String>) -> Self {
        self.originating_agency = Some(agency.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        if !self.ancestors.contains(&parent) {
            self.ancestors.push(parent.clone());
        }
        self.parents.push(parent);
        self
    }

    pub fn with_ancestors<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for ancestor in ancestors {
            let ancestor = ancestor.into();
            if !self.ancestors.contains(&ancestor) {
                self.ancestors.push(ancestor);
            }
        }
        self
    }

    pub fn with_object_group(mut self, object_group_id: impl Into<String>) -> Self {
        self.object_group_id = Some(object_group_id.into());
        self
    }

    pub fn with_initial_operation(mut self, operation_id: impl Into<String>) -> Self {
        self.initial_operation = Some(operation_id.into());
        self
    }

    pub fn with_type(mut self, unit_type: UnitType) -> Self {
        self.unit_type = unit_type;
        self
    }
}

/// A stored binary belonging to an object group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryObject {
    pub id: String,
    pub size: u64,
    #[serde(default = "default_strategy")]
    pub strategy_id: String,
}

/// Container of binary objects referenced by one or more units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectGroup {
    pub id: String,
    #[serde(default)]
    pub originating_agency: Option<String>,
    #[serde(default)]
    pub initial_operation: Option<String>,
    /// Units referencing this object group
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub objects: Vec<BinaryObject>,
    #[serde(default = "default_strategy")]
    pub strategy_id: String,
    /// Operations that modified the object group
    #[serde(default)]
    pub operations: Vec<String>,
}

impl ObjectGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            originating_agency: None,
            initial_operation: None,
            parents: Vec::new(),
            objects: Vec::new(),
            strategy_id: default_strategy(),
            operations: Vec::new(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.objects.iter().map(|object| object.size).sum()
    }

    pub fn object_ids(&self) -> Vec<String> {
        self.objects.iter().map(|object| object.id.clone()).collect()
    }
}
