use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EliminationGlobalStatus {
    Keep,
    Destroy,
    Conflict,
}

/// Diagnostic attached to a non-KEEP analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtendedInfo {
    /// The unit's own agency may destroy it while other agencies still need it.
    KeepAccessSp,
    /// A single parent link carries both destroyable and non-destroyable interests.
    #[serde(rename_all = "camelCase")]
    AccessLinkInconsistency {
        parent_unit_id: String,
        destroyable_originating_agencies: BTreeSet<String>,
        non_destroyable_originating_agencies: BTreeSet<String>,
    },
    /// Active hold rules prevent destruction.
    #[serde(rename_all = "camelCase")]
    HoldRule { hold_rule_ids: BTreeSet<String> },
    /// Agencies carrying both Keep and Destroy final actions.
    #[serde(rename_all = "camelCase")]
    FinalActionInconsistency {
        originating_agencies: BTreeSet<String>,
    },
}

/// Outcome of the rule inheritance analysis of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub operation_id: String,
    pub unit_id: String,
    pub global_status: EliminationGlobalStatus,
    pub destroyable_originating_agencies: BTreeSet<String>,
    pub non_destroyable_originating_agencies: BTreeSet<String>,
    #[serde(default)]
    pub extended_info: Vec<ExtendedInfo>,
}

impl AnalysisResult {
    pub fn is_destroyable(&self) -> bool {
        self.global_status == EliminationGlobalStatus::Destroy
    }
}
