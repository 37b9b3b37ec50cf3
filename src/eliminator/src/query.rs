//! Unit selection queries.
//!
//! The query language itself belongs to the metadata service. This module only
//! carries what the pipeline needs: an immutable AST that can be validated,
//! reduced to a count query and evaluated against in-memory units.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{Unit, UnitType};

/// Maximum nesting of boolean operators accepted by [`SelectQuery::validate`].
pub const MAX_QUERY_DEPTH: usize = 16;

/// Projection used by count queries.
pub const ID_FIELD: &str = "#id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl Value {
    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::Date(b)) => parse_date(a).map(|a| a.cmp(b)),
            (Value::Date(a), Value::String(b)) => parse_date(b).map(|b| a.cmp(&b)),
            _ => None,
        }
    }

    fn from_json(value: &serde_json::Value) -> Vec<Value> {
        match value {
            serde_json::Value::String(s) => vec![Value::String(s.clone())],
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).into_iter().collect(),
            serde_json::Value::Bool(b) => vec![Value::Bool(*b)],
            serde_json::Value::Array(items) => items.iter().flat_map(Value::from_json).collect(),
            serde_json::Value::Null | serde_json::Value::Object(_) => Vec::new(),
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    // accept full timestamps by keeping the date part
    value
        .get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    Eq {
        field: String,
        value: Value,
    },
    Ne {
        field: String,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    Range {
        field: String,
        #[serde(default)]
        gte: Option<Value>,
        #[serde(default)]
        lte: Option<Value>,
    },
    Exists {
        field: String,
    },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn in_values<I, V>(field: impl Into<String>, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Query::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(
        field: impl Into<String>,
        gte: Option<impl Into<Value>>,
        lte: Option<impl Into<Value>>,
    ) -> Query {
        Query::Range {
            field: field.into(),
            gte: gte.map(Into::into),
            lte: lte.map(Into::into),
        }
    }

    pub fn exists(field: impl Into<String>) -> Query {
        Query::Exists {
            field: field.into(),
        }
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Query) -> Query {
        match self {
            Query::And(children) => Query::And(children).with(other),
            query => Query::And(vec![query, other]),
        }
    }

    /// Disjunction of `self` and `other`, flattening nested `Or`s.
    pub fn or(self, other: Query) -> Query {
        match self {
            Query::Or(children) => Query::Or(children).with(other),
            query => Query::Or(vec![query, other]),
        }
    }

    pub fn negate(self) -> Query {
        Query::Not(Box::new(self))
    }

    /// Boolean node extended with one more child. Leaves become an `And`.
    pub fn with(self, child: Query) -> Query {
        match self {
            Query::And(mut children) => {
                children.push(child);
                Query::And(children)
            }
            Query::Or(mut children) => {
                children.push(child);
                Query::Or(children)
            }
            leaf => Query::And(vec![leaf, child]),
        }
    }

    fn validate(&self, depth: usize) -> Result<(), String> {
        if depth > MAX_QUERY_DEPTH {
            return Err(format!("query nesting exceeds {MAX_QUERY_DEPTH} levels"));
        }
        match self {
            Query::Eq { field, .. }
            | Query::Ne { field, .. }
            | Query::Exists { field } => check_field(field),
            Query::In { field, values } => {
                check_field(field)?;
                if values.is_empty() {
                    return Err(format!("$in on '{field}' has no values"));
                }
                Ok(())
            }
            Query::Range { field, gte, lte } => {
                check_field(field)?;
                if gte.is_none() && lte.is_none() {
                    return Err(format!("$range on '{field}' has no bound"));
                }
                Ok(())
            }
            Query::And(children) | Query::Or(children) => {
                if children.is_empty() {
                    return Err("boolean query has no sub-query".to_string());
                }
                children
                    .iter()
                    .try_for_each(|child| child.validate(depth + 1))
            }
            Query::Not(child) => child.validate(depth + 1),
        }
    }

    /// Evaluate against a unit. Multi-valued fields match if any value does.
    pub fn matches(&self, unit: &Unit) -> bool {
        match self {
            Query::Eq { field, value } => field_values(unit, field)
                .iter()
                .any(|v| v.compare(value) == Some(Ordering::Equal)),
            Query::Ne { field, value } => !field_values(unit, field)
                .iter()
                .any(|v| v.compare(value) == Some(Ordering::Equal)),
            Query::In { field, values } => field_values(unit, field).iter().any(|v| {
                values
                    .iter()
                    .any(|candidate| v.compare(candidate) == Some(Ordering::Equal))
            }),
            Query::Range { field, gte, lte } => field_values(unit, field).iter().any(|v| {
                let above = gte.as_ref().is_none_or(|low| {
                    matches!(v.compare(low), Some(Ordering::Greater | Ordering::Equal))
                });
                let below = lte.as_ref().is_none_or(|high| {
                    matches!(v.compare(high), Some(Ordering::Less | Ordering::Equal))
                });
                above && below
            }),
            Query::Exists { field } => !field_values(unit, field).is_empty(),
            Query::And(children) => children.iter().all(|child| child.matches(unit)),
            Query::Or(children) => children.iter().any(|child| child.matches(unit)),
            Query::Not(child) => !child.matches(unit),
        }
    }
}

fn check_field(field: &str) -> Result<(), String> {
    if field.trim().is_empty() {
        Err("empty field name".to_string())
    } else {
        Ok(())
    }
}

fn field_values(unit: &Unit, field: &str) -> Vec<Value> {
    let strings = |values: &[String]| values.iter().cloned().map(Value::String).collect();
    match field {
        ID_FIELD => vec![Value::String(unit.id.clone())],
        "#originating_agency" => unit
            .originating_agency
            .clone()
            .map(Value::String)
            .into_iter()
            .collect(),
        "#unitType" => {
            let unit_type = match unit.unit_type {
                UnitType::Structural => "STRUCTURAL",
                UnitType::Leaf => "LEAF",
            };
            vec![Value::from(unit_type)]
        }
        "#depth" => vec![Value::from(unit.depth)],
        "#opi" => unit
            .initial_operation
            .clone()
            .map(Value::String)
            .into_iter()
            .collect(),
        "#object" => unit
            .object_group_id
            .clone()
            .map(Value::String)
            .into_iter()
            .collect(),
        "#unitups" => strings(&unit.parents),
        "#allunitups" => strings(&unit.ancestors),
        "#storage" => vec![Value::String(unit.strategy_id.clone())],
        _ => unit
            .metadata
            .get(field)
            .map(Value::from_json)
            .unwrap_or_default(),
    }
}

/// A selection of units: optional root units plus an optional filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Restrict to these units and their descendants
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub query: Option<Query>,
    /// Candidate threshold requested by the caller
    #[serde(default)]
    pub threshold: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub projection: Vec<String>,
}

impl SelectQuery {
    pub fn new(query: Query) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }

    pub fn with_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Reject structurally malformed selections.
    pub fn validate(&self) -> Result<(), String> {
        if self.roots.iter().any(|root| root.trim().is_empty()) {
            return Err("empty root unit id".to_string());
        }
        if self.threshold == Some(0) {
            return Err("threshold must be positive".to_string());
        }
        match &self.query {
            Some(query) => query.validate(1),
            None => Ok(()),
        }
    }

    /// Same selection reduced to a count: one id only.
    pub fn for_count(&self) -> SelectQuery {
        SelectQuery {
            roots: self.roots.clone(),
            query: self.query.clone(),
            threshold: self.threshold,
            limit: Some(1),
            offset: 0,
            projection: vec![ID_FIELD.to_string()],
        }
    }

    pub fn matches(&self, unit: &Unit) -> bool {
        let in_roots = self.roots.is_empty()
            || self
                .roots
                .iter()
                .any(|root| *root == unit.id || unit.ancestors.contains(root));
        in_roots && self.query.as_ref().is_none_or(|query| query.matches(unit))
    }
}
