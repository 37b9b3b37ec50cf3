//! Rule inheritance analysis.
//!
//! Decides, for one unit and each originating agency with an interest in it,
//! whether the agency's inherited appraisal rules allow destruction at the
//! expiration date. Pure evaluation, no I/O.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::model::{
    AnalysisResult, EliminationGlobalStatus, ExtendedInfo, FinalAction, InheritedProperty,
    InheritedRule, RuleCategory, Unit, UnitInheritedRules,
};

/// Destroyable and non-destroyable agencies of a set of rules.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct AgencyPartition {
    destroyable: BTreeSet<String>,
    non_destroyable: BTreeSet<String>,
    /// Agencies with both Keep and Destroy final actions
    inconsistent_final_action: BTreeSet<String>,
}

impl AgencyPartition {
    fn global_status(&self) -> EliminationGlobalStatus {
        match (self.destroyable.is_empty(), self.non_destroyable.is_empty()) {
            (true, _) => EliminationGlobalStatus::Keep,
            (false, true) => EliminationGlobalStatus::Destroy,
            (false, false) => EliminationGlobalStatus::Conflict,
        }
    }
}

#[derive(Default)]
struct AgencyInterest<'a> {
    rules: Vec<&'a InheritedRule>,
    final_actions: Vec<FinalAction>,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleInheritanceResolver {
    expiration_date: NaiveDate,
}

impl RuleInheritanceResolver {
    pub fn new(expiration_date: NaiveDate) -> Self {
        Self { expiration_date }
    }

    pub fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }

    /// Analyse a unit from its inherited appraisal and hold rules.
    pub fn analyze(
        &self,
        operation_id: &str,
        unit: &Unit,
        inherited: &UnitInheritedRules,
    ) -> AnalysisResult {
        self.analyze_rules(
            operation_id,
            &unit.id,
            unit.originating_agency.as_deref(),
            inherited.rules(RuleCategory::Appraisal),
            inherited.properties(RuleCategory::Appraisal),
            inherited.rules(RuleCategory::Hold),
        )
    }

    pub fn analyze_rules(
        &self,
        operation_id: &str,
        unit_id: &str,
        originating_agency: Option<&str>,
        rules: &[InheritedRule],
        properties: &[InheritedProperty],
        hold_rules: &[InheritedRule],
    ) -> AnalysisResult {
        let partition = self.partition(rules.iter(), properties.iter());
        let mut global_status = partition.global_status();
        let mut extended_info = Vec::new();

        if !partition.inconsistent_final_action.is_empty() {
            extended_info.push(ExtendedInfo::FinalActionInconsistency {
                originating_agencies: partition.inconsistent_final_action.clone(),
            });
        }

        if global_status != EliminationGlobalStatus::Keep {
            let owner_keeps_access = originating_agency
                .is_some_and(|agency| partition.destroyable.contains(agency))
                && !partition.non_destroyable.is_empty();
            if owner_keeps_access {
                extended_info.push(ExtendedInfo::KeepAccessSp);
            }

            extended_info.extend(self.access_link_inconsistencies(rules, properties));

            let active_holds: BTreeSet<String> = hold_rules
                .iter()
                .filter(|rule| rule.is_active_at(self.expiration_date))
                .map(|rule| rule.rule_id.clone())
                .collect();
            if !active_holds.is_empty() {
                global_status = EliminationGlobalStatus::Conflict;
                extended_info.push(ExtendedInfo::HoldRule {
                    hold_rule_ids: active_holds,
                });
            }
        }

        AnalysisResult {
            operation_id: operation_id.to_string(),
            unit_id: unit_id.to_string(),
            global_status,
            destroyable_originating_agencies: partition.destroyable,
            non_destroyable_originating_agencies: partition.non_destroyable,
            extended_info,
        }
    }

    fn partition<'a>(
        &self,
        rules: impl Iterator<Item = &'a InheritedRule>,
        properties: impl Iterator<Item = &'a InheritedProperty>,
    ) -> AgencyPartition {
        let mut interests: BTreeMap<&str, AgencyInterest<'a>> = BTreeMap::new();
        for rule in rules {
            interests
                .entry(rule.originating_agency.as_str())
                .or_default()
                .rules
                .push(rule);
        }
        for property in properties {
            if let Some(action) = property.final_action() {
                interests
                    .entry(property.originating_agency.as_str())
                    .or_default()
                    .final_actions
                    .push(action);
            }
        }

        let mut partition = AgencyPartition::default();
        for (agency, interest) in interests {
            let destroy = interest.final_actions.contains(&FinalAction::Destroy);
            let keep = interest.final_actions.contains(&FinalAction::Keep);
            if destroy && keep {
                partition.inconsistent_final_action.insert(agency.to_string());
            }

            let expired = !interest.rules.is_empty()
                && interest
                    .rules
                    .iter()
                    .all(|rule| !rule.is_active_at(self.expiration_date));

            if destroy && !keep && expired {
                partition.destroyable.insert(agency.to_string());
            } else {
                partition.non_destroyable.insert(agency.to_string());
            }
        }
        partition
    }

    fn access_link_inconsistencies(
        &self,
        rules: &[InheritedRule],
        properties: &[InheritedProperty],
    ) -> Vec<ExtendedInfo> {
        let direct_parents: BTreeSet<&str> = rules
            .iter()
            .flat_map(|rule| rule.paths.iter())
            .chain(properties.iter().flat_map(|property| property.paths.iter()))
            .filter_map(|path| path.get(1).map(String::as_str))
            .collect();

        direct_parents
            .into_iter()
            .filter_map(|parent| {
                let partition = self.partition(
                    rules.iter().filter(|rule| rule.inherited_through(parent)),
                    properties
                        .iter()
                        .filter(|property| property.inherited_through(parent)),
                );
                (!partition.destroyable.is_empty() && !partition.non_destroyable.is_empty())
                    .then(|| ExtendedInfo::AccessLinkInconsistency {
                        parent_unit_id: parent.to_string(),
                        destroyable_originating_agencies: partition.destroyable,
                        non_destroyable_originating_agencies: partition.non_destroyable,
                    })
            })
            .collect()
    }
}
