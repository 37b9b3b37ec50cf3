//! In-memory implementations of the store contracts.
//!
//! Back the integration tests and the standalone runner.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    AccessionRegisterStore, LifecycleStore, MetadataStore, ReportStore, RuleInheritanceProvider,
    ScrollPage, StoreError, StoreResult, UnitSelector,
};
use crate::model::{
    AccessionRegisterDelta, AnalysisResult, ObjectGroup, ObjectGroupReportEntry, ReportEntry,
    Unit, UnitInheritedRules, UnitReportEntry,
};
use crate::query::SelectQuery;

/// Archive content loaded into an [`InMemoryArchive`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub object_groups: Vec<ObjectGroup>,
    #[serde(default)]
    pub inherited_rules: Vec<UnitInheritedRules>,
}

#[derive(Debug, Default)]
struct ArchiveState {
    units: BTreeMap<String, Unit>,
    object_groups: BTreeMap<String, ObjectGroup>,
    inherited: HashMap<String, UnitInheritedRules>,
    analyses: HashMap<String, AnalysisResult>,
    unit_lifecycles: HashSet<String>,
    object_group_lifecycles: HashSet<String>,
    /// Unit ids in deletion order
    deletion_log: Vec<String>,
}

impl ArchiveState {
    /// Matching units, deepest first.
    fn select(&self, query: &SelectQuery) -> Vec<&Unit> {
        let mut selected: Vec<&Unit> = self
            .units
            .values()
            .filter(|unit| query.matches(unit))
            .collect();
        selected.sort_by(|a, b| (Reverse(a.depth), &a.id).cmp(&(Reverse(b.depth), &b.id)));
        selected
    }
}

/// Metadata, rule inheritance and lifecycle services backed by maps.
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    state: RwLock<ArchiveState>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dataset. Every unit and object group gets a lifecycle.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut state = ArchiveState::default();
        for unit in dataset.units {
            state.unit_lifecycles.insert(unit.id.clone());
            state.units.insert(unit.id.clone(), unit);
        }
        for group in dataset.object_groups {
            state.object_group_lifecycles.insert(group.id.clone());
            state.object_groups.insert(group.id.clone(), group);
        }
        for inherited in dataset.inherited_rules {
            state.inherited.insert(inherited.unit_id.clone(), inherited);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn insert_unit(&self, unit: Unit) {
        let mut state = self.state.write().await;
        state.unit_lifecycles.insert(unit.id.clone());
        state.units.insert(unit.id.clone(), unit);
    }

    pub async fn insert_object_group(&self, group: ObjectGroup) {
        let mut state = self.state.write().await;
        state.object_group_lifecycles.insert(group.id.clone());
        state.object_groups.insert(group.id.clone(), group);
    }

    pub async fn insert_inherited_rules(&self, inherited: UnitInheritedRules) {
        let mut state = self.state.write().await;
        state.inherited.insert(inherited.unit_id.clone(), inherited);
    }

    pub async fn unit(&self, id: &str) -> Option<Unit> {
        self.state.read().await.units.get(id).cloned()
    }

    pub async fn object_group(&self, id: &str) -> Option<ObjectGroup> {
        self.state.read().await.object_groups.get(id).cloned()
    }

    pub async fn object_groups(&self) -> Vec<ObjectGroup> {
        self.state
            .read()
            .await
            .object_groups
            .values()
            .cloned()
            .collect()
    }

    pub async fn unit_count(&self) -> usize {
        self.state.read().await.units.len()
    }

    pub async fn analysis(&self, unit_id: &str) -> Option<AnalysisResult> {
        self.state.read().await.analyses.get(unit_id).cloned()
    }

    pub async fn has_unit_lifecycle(&self, id: &str) -> bool {
        self.state.read().await.unit_lifecycles.contains(id)
    }

    pub async fn has_object_group_lifecycle(&self, id: &str) -> bool {
        self.state.read().await.object_group_lifecycles.contains(id)
    }

    /// Unit ids in the order they were deleted.
    pub async fn deletion_log(&self) -> Vec<String> {
        self.state.read().await.deletion_log.clone()
    }
}

#[async_trait]
impl UnitSelector for InMemoryArchive {
    async fn count(&self, query: &SelectQuery) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.select(query).len() as u64)
    }

    async fn scroll(
        &self,
        query: &SelectQuery,
        cursor: Option<String>,
        page_size: usize,
        _keep_alive: Duration,
    ) -> StoreResult<ScrollPage> {
        let state = self.state.read().await;
        let selected = state.select(query);

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let end = match query.limit {
            Some(limit) => offset.saturating_add(usize::try_from(limit).unwrap_or(usize::MAX)),
            None => usize::MAX,
        }
        .min(selected.len());

        let position = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| StoreError::NotFound(format!("scroll cursor '{cursor}'")))?,
            None => offset,
        };
        let page_end = position.saturating_add(page_size).min(end);

        let units = selected
            .get(position..page_end)
            .unwrap_or_default()
            .iter()
            .map(|unit| (*unit).clone())
            .collect();
        let cursor = (page_end < end).then(|| page_end.to_string());

        Ok(ScrollPage { units, cursor })
    }
}

#[async_trait]
impl RuleInheritanceProvider for InMemoryArchive {
    async fn inherited_rules(
        &self,
        unit_ids: &[String],
    ) -> StoreResult<HashMap<String, UnitInheritedRules>> {
        let state = self.state.read().await;
        Ok(unit_ids
            .iter()
            .filter_map(|id| {
                state
                    .inherited
                    .get(id)
                    .map(|inherited| (id.clone(), inherited.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl MetadataStore for InMemoryArchive {
    async fn save_analysis(&self, results: Vec<AnalysisResult>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for result in results {
            if !state.units.contains_key(&result.unit_id) {
                return Err(StoreError::NotFound(format!("unit {}", result.unit_id)));
            }
            state.analyses.insert(result.unit_id.clone(), result);
        }
        Ok(())
    }

    async fn find_child_unit_ids(
        &self,
        unit_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<String>>> {
        let state = self.state.read().await;
        let requested: HashSet<&String> = unit_ids.iter().collect();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for unit in state.units.values() {
            for parent in unit.parents.iter().filter(|p| requested.contains(p)) {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(unit.id.clone());
            }
        }
        Ok(children)
    }

    async fn get_object_groups(&self, ids: &[String]) -> StoreResult<Vec<ObjectGroup>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.object_groups.get(id).cloned())
            .collect())
    }

    async fn delete_units(&self, ids: &[String]) -> StoreResult<Vec<String>> {
        let mut state = self.state.write().await;
        let mut removed = Vec::new();
        for id in ids {
            if state.units.remove(id).is_some() {
                state.analyses.remove(id);
                state.deletion_log.push(id.clone());
                removed.push(id.clone());
            }
        }
        Ok(removed)
    }

    async fn delete_object_groups(&self, ids: &[String]) -> StoreResult<Vec<String>> {
        let mut state = self.state.write().await;
        Ok(ids
            .iter()
            .filter(|id| state.object_groups.remove(id.as_str()).is_some())
            .cloned()
            .collect())
    }

    async fn detach_object_group(
        &self,
        id: &str,
        removed_parents: &[String],
        operation_id: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let group = state
            .object_groups
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("object group {id}")))?;
        group.parents.retain(|parent| !removed_parents.contains(parent));
        if !group.operations.iter().any(|op| op == operation_id) {
            group.operations.push(operation_id.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleStore for InMemoryArchive {
    async fn delete_unit_lifecycles(&self, ids: &[String]) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for id in ids {
            state.unit_lifecycles.remove(id);
        }
        Ok(())
    }

    async fn delete_object_group_lifecycles(&self, ids: &[String]) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for id in ids {
            state.object_group_lifecycles.remove(id);
        }
        Ok(())
    }
}

/// Report rows per operation, in append order.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    entries: RwLock<HashMap<String, Vec<ReportEntry>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, operation_id: &str) -> usize {
        self.entries
            .read()
            .await
            .get(operation_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn append(&self, operation_id: &str, entries: Vec<ReportEntry>) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .entry(operation_id.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }

    async fn units(
        &self,
        operation_id: &str,
    ) -> StoreResult<BoxStream<'static, StoreResult<UnitReportEntry>>> {
        let entries = self.entries.read().await;
        let units: Vec<UnitReportEntry> = entries
            .get(operation_id)
            .into_iter()
            .flatten()
            .filter_map(|entry| match entry {
                ReportEntry::Unit(unit) => Some(unit.clone()),
                ReportEntry::ObjectGroup(_) => None,
            })
            .collect();
        Ok(stream::iter(units.into_iter().map(Ok)).boxed())
    }

    async fn object_groups(
        &self,
        operation_id: &str,
    ) -> StoreResult<BoxStream<'static, StoreResult<ObjectGroupReportEntry>>> {
        let entries = self.entries.read().await;
        let groups: Vec<ObjectGroupReportEntry> = entries
            .get(operation_id)
            .into_iter()
            .flatten()
            .filter_map(|entry| match entry {
                ReportEntry::ObjectGroup(group) => Some(group.clone()),
                ReportEntry::Unit(_) => None,
            })
            .collect();
        Ok(stream::iter(groups.into_iter().map(Ok)).boxed())
    }
}

/// Applied accession register deltas, keyed by agency, ingest and elimination operation.
#[derive(Debug, Default)]
pub struct InMemoryAccessionRegister {
    deltas: RwLock<BTreeMap<(String, String, String), AccessionRegisterDelta>>,
}

impl InMemoryAccessionRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deltas(&self) -> Vec<AccessionRegisterDelta> {
        self.deltas.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl AccessionRegisterStore for InMemoryAccessionRegister {
    async fn submit(&self, delta: AccessionRegisterDelta) -> StoreResult<()> {
        let mut deltas = self.deltas.write().await;
        let key = delta.key();
        if deltas.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "register delta for agency {} ingest {} already applied by {}",
                key.0, key.1, key.2
            )));
        }
        deltas.insert(key, delta);
        Ok(())
    }
}
