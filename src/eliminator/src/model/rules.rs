use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Name of the inherited property carrying the appraisal final action.
pub const FINAL_ACTION: &str = "FinalAction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleCategory {
    #[serde(rename = "AppraisalRule")]
    Appraisal,
    #[serde(rename = "HoldRule")]
    Hold,
    #[serde(rename = "AccessRule")]
    Access,
    #[serde(rename = "StorageRule")]
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalAction {
    Keep,
    Destroy,
}

impl FinalAction {
    /// Parse a final action property value. Unknown values yield `None`.
    pub fn from_property(value: &serde_json::Value) -> Option<FinalAction> {
        match value.as_str()? {
            "Keep" => Some(FinalAction::Keep),
            "Destroy" => Some(FinalAction::Destroy),
            _ => None,
        }
    }
}

/// A rule applying to a unit, declared on the unit itself or on an ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritedRule {
    pub unit_id: String,
    pub originating_agency: String,
    /// Each path runs from the unit (index 0) up to the unit declaring the rule
    pub paths: Vec<Vec<String>>,
    pub rule_id: String,
    pub category: RuleCategory,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// `None` means the rule never ends
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl InheritedRule {
    /// Whether the rule is still running at `date`.
    pub fn is_active_at(&self, date: NaiveDate) -> bool {
        self.end_date.is_none_or(|end| end > date)
    }

    /// Whether any path reaches the unit through `parent_id`.
    pub fn inherited_through(&self, parent_id: &str) -> bool {
        inherited_through(&self.paths, parent_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritedProperty {
    pub unit_id: String,
    pub originating_agency: String,
    pub paths: Vec<Vec<String>>,
    pub property_name: String,
    pub property_value: serde_json::Value,
}

impl InheritedProperty {
    pub fn final_action(&self) -> Option<FinalAction> {
        if self.property_name == FINAL_ACTION {
            FinalAction::from_property(&self.property_value)
        } else {
            None
        }
    }

    pub fn inherited_through(&self, parent_id: &str) -> bool {
        inherited_through(&self.paths, parent_id)
    }
}

fn inherited_through(paths: &[Vec<String>], parent_id: &str) -> bool {
    paths
        .iter()
        .any(|path| path.get(1).is_some_and(|id| id == parent_id))
}

/// Rules and properties of a single category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryInheritance {
    #[serde(default)]
    pub rules: Vec<InheritedRule>,
    #[serde(default)]
    pub properties: Vec<InheritedProperty>,
}

/// Everything a unit inherits, grouped by rule category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitInheritedRules {
    pub unit_id: String,
    #[serde(default)]
    pub categories: HashMap<RuleCategory, CategoryInheritance>,
}

impl UnitInheritedRules {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            categories: HashMap::new(),
        }
    }

    pub fn rules(&self, category: RuleCategory) -> &[InheritedRule] {
        self.categories
            .get(&category)
            .map(|inheritance| inheritance.rules.as_slice())
            .unwrap_or_default()
    }

    pub fn properties(&self, category: RuleCategory) -> &[InheritedProperty] {
        self.categories
            .get(&category)
            .map(|inheritance| inheritance.properties.as_slice())
            .unwrap_or_default()
    }

    pub fn with_rule(mut self, rule: InheritedRule) -> Self {
        self.categories
            .entry(rule.category)
            .or_default()
            .rules
            .push(rule);
        self
    }

    pub fn with_property(mut self, category: RuleCategory, property: InheritedProperty) -> Self {
        self.categories
            .entry(category)
            .or_default()
            .properties
            .push(property);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_final_action_parsing() {
        assert_eq!(
            FinalAction::from_property(&serde_json::json!("Destroy")),
            Some(FinalAction::Destroy)
        );
        assert_eq!(
            FinalAction::from_property(&serde_json::json!("Keep")),
            Some(FinalAction::Keep)
        );
        assert_eq!(FinalAction::from_property(&serde_json::json!("Archive")), None);
        assert_eq!(FinalAction::from_property(&serde_json::json!(1)), None);
    }

    #[test]
    fn test_rule_activity() {
        let mut rule = InheritedRule {
            unit_id: "u".into(),
            originating_agency: "A".into(),
            paths: vec![vec!["u".into(), "p".into()]],
            rule_id: "APP-1".into(),
            category: RuleCategory::Hold,
            start_date: None,
            end_date: None,
        };
        assert!(rule.is_active_at(date("2021-01-01")));

        rule.end_date = Some(date("2021-01-01"));
        assert!(!rule.is_active_at(date("2021-01-01")));
        assert!(rule.is_active_at(date("2020-12-31")));

        assert!(rule.inherited_through("p"));
        assert!(!rule.inherited_through("u"));
    }

    #[test]
    fn test_category_serialization() {
        let inherited: UnitInheritedRules = serde_json::from_value(serde_json::json!({
            "unitId": "u",
            "categories": {
                "AppraisalRule": {
                    "rules": [{
                        "unitId": "u",
                        "originatingAgency": "A",
                        "paths": [["u"]],
                        "ruleId": "APP-1",
                        "category": "AppraisalRule",
                        "endDate": "2020-01-01"
                    }]
                }
            }
        }))
        .unwrap();

        assert_eq!(inherited.rules(RuleCategory::Appraisal).len(), 1);
        assert!(inherited.rules(RuleCategory::Hold).is_empty());
        assert!(inherited.properties(RuleCategory::Appraisal).is_empty());
    }
}
