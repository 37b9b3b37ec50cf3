//! Cross-store deletion of destroy candidates.
//!
//! Per batch, in this order:
//! 1. object groups left without surviving parent: lifecycles, documents, binaries
//! 2. units: lifecycles, documents, stored metadata copies
//! 3. object groups still referenced elsewhere: parent links of deleted units removed
//!
//! Every store call is delete-if-exists, so a failed batch can be replayed.
//! Only what a call actually removed is reported, so a replay never reports
//! a unit or object group twice.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use crate::metrics::EliminationMetrics;
use crate::model::{ObjectGroup, ObjectGroupReportEntry, Unit, UnitReportEntry, UnitReportStatus};
use crate::outcome::{Result, Stage, StageOutcome, StatusCode};
use crate::report::ReportSink;
use crate::spool::SpoolReader;
use crate::store::{
    BinaryStore, LifecycleStore, MetadataStore, ReportStore, object_group_backup_key, object_key,
    unit_backup_key,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub units_deleted: u64,
    /// Units kept because a child unit survives
    pub units_with_children: u64,
    pub object_groups_deleted: u64,
    pub object_groups_detached: u64,
    pub binary_objects_deleted: u64,
    pub bytes_reclaimed: u64,
}

impl DeletionSummary {
    fn merge(&mut self, other: DeletionSummary) {
        self.units_deleted += other.units_deleted;
        self.units_with_children += other.units_with_children;
        self.object_groups_deleted += other.object_groups_deleted;
        self.object_groups_detached += other.object_groups_detached;
        self.binary_objects_deleted += other.binary_objects_deleted;
        self.bytes_reclaimed += other.bytes_reclaimed;
    }

    pub fn outcome(&self) -> StageOutcome {
        let details = json!({
            "unitsDeleted": self.units_deleted,
            "unitsWithChildren": self.units_with_children,
            "objectGroupsDeleted": self.object_groups_deleted,
            "objectGroupsDetached": self.object_groups_detached,
            "binaryObjectsDeleted": self.binary_objects_deleted,
            "bytesReclaimed": self.bytes_reclaimed,
        });
        let outcome = if self.units_with_children > 0 {
            StageOutcome::warning(
                Stage::Deletion,
                format!(
                    "{} units not deleted: they still have child units",
                    self.units_with_children
                ),
            )
        } else {
            StageOutcome::ok(Stage::Deletion, format!("{} units deleted", self.units_deleted))
        };
        outcome.with_details(details)
    }
}

pub struct DeletionStage {
    metadata: Arc<dyn MetadataStore>,
    lifecycles: Arc<dyn LifecycleStore>,
    binaries: BinaryStore,
    reports: Arc<dyn ReportStore>,
    report_flush_size: usize,
    metrics: EliminationMetrics,
}

impl DeletionStage {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        lifecycles: Arc<dyn LifecycleStore>,
        binaries: BinaryStore,
        reports: Arc<dyn ReportStore>,
        report_flush_size: usize,
        metrics: EliminationMetrics,
    ) -> Self {
        Self {
            metadata,
            lifecycles,
            binaries,
            reports,
            report_flush_size,
            metrics,
        }
    }

    /// Delete every spooled candidate, `batch_size` units per batch, in spool order.
    pub async fn delete_spool(
        &self,
        operation_id: &str,
        spool: &Path,
        batch_size: usize,
    ) -> Result<DeletionSummary> {
        let started = Instant::now();
        let mut reader = SpoolReader::open(spool).await?;
        let mut summary = DeletionSummary::default();
        let mut batch_index = 0;

        while let Some(records) = reader.next_batch(batch_size).await? {
            batch_index += 1;
            tracing::info!(
                operation_id = %operation_id,
                batch = batch_index,
                batch_size = records.len(),
                "Processing deletion batch"
            );
            let units: Vec<Unit> = records.into_iter().map(|record| record.unit).collect();
            summary.merge(self.delete_batch(operation_id, &units).await?);
        }

        self.metrics
            .record_duration_ms(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        tracing::info!(
            operation_id = %operation_id,
            batches = batch_index,
            units_deleted = summary.units_deleted,
            units_with_children = summary.units_with_children,
            object_groups_deleted = summary.object_groups_deleted,
            object_groups_detached = summary.object_groups_detached,
            bytes_reclaimed = summary.bytes_reclaimed,
            "Deletion complete"
        );
        Ok(summary)
    }

    /// Delete one batch of candidates, ordered deepest-first.
    pub async fn delete_batch(&self, operation_id: &str, units: &[Unit]) -> Result<DeletionSummary> {
        let mut sink = ReportSink::new(
            Arc::clone(&self.reports),
            operation_id,
            self.report_flush_size,
        );
        let processed = self.process_batch(operation_id, units, &mut sink).await;
        let closed = sink.close().await;
        let summary = processed?;
        closed?;

        self.metrics.record_units_deleted(summary.units_deleted);
        self.metrics
            .record_units_with_children(summary.units_with_children);
        self.metrics
            .record_object_groups_deleted(summary.object_groups_deleted);
        self.metrics
            .record_object_groups_detached(summary.object_groups_detached);
        self.metrics
            .record_binary_objects_deleted(summary.binary_objects_deleted);
        self.metrics.record_bytes_reclaimed(summary.bytes_reclaimed);
        Ok(summary)
    }

    async fn process_batch(
        &self,
        operation_id: &str,
        units: &[Unit],
        sink: &mut ReportSink,
    ) -> Result<DeletionSummary> {
        let mut summary = DeletionSummary::default();
        if units.is_empty() {
            return Ok(summary);
        }

        let ids: Vec<String> = units.iter().map(|unit| unit.id.clone()).collect();
        let children = self.metadata.find_child_unit_ids(&ids).await?;

        // children precede their parents, so one pass settles the whole batch
        let mut deletable: HashSet<&str> = HashSet::new();
        let mut to_delete: Vec<&Unit> = Vec::new();
        for unit in units {
            let surviving_child = children.get(&unit.id).and_then(|children| {
                children
                    .iter()
                    .find(|child| !deletable.contains(child.as_str()))
            });
            match surviving_child {
                Some(child) => {
                    tracing::warn!(
                        operation_id = %operation_id,
                        unit_id = %unit.id,
                        child_id = %child,
                        "Unit has a surviving child unit, not deleted"
                    );
                    sink.push(UnitReportEntry::new(
                        unit,
                        UnitReportStatus::NonDestroyableHasChildUnits,
                    ))
                    .await?;
                    summary.units_with_children += 1;
                }
                None => {
                    deletable.insert(unit.id.as_str());
                    to_delete.push(unit);
                }
            }
        }
        if to_delete.is_empty() {
            return Ok(summary);
        }

        let group_ids: Vec<String> = to_delete
            .iter()
            .filter_map(|unit| unit.object_group_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let groups = if group_ids.is_empty() {
            Vec::new()
        } else {
            self.metadata.get_object_groups(&group_ids).await?
        };
        let (orphans, shared): (Vec<ObjectGroup>, Vec<ObjectGroup>) =
            groups.into_iter().partition(|group| {
                group
                    .parents
                    .iter()
                    .all(|parent| deletable.contains(parent.as_str()))
            });

        self.delete_object_groups(&orphans, sink, &mut summary).await?;
        self.delete_units(&to_delete, sink, &mut summary).await?;
        self.detach_object_groups(operation_id, &shared, &deletable, sink, &mut summary)
            .await?;

        Ok(summary)
    }

    async fn delete_object_groups(
        &self,
        groups: &[ObjectGroup],
        sink: &mut ReportSink,
        summary: &mut DeletionSummary,
    ) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = groups.iter().map(|group| group.id.clone()).collect();

        self.lifecycles.delete_object_group_lifecycles(&ids).await?;
        let removed: HashSet<String> = self
            .metadata
            .delete_object_groups(&ids)
            .await?
            .into_iter()
            .collect();

        for group in groups {
            for object in &group.objects {
                self.binaries
                    .delete(&object.strategy_id, &object_key(&object.id))
                    .await?;
            }
            self.binaries
                .delete(&group.strategy_id, &object_group_backup_key(&group.id))
                .await?;
            if !removed.contains(&group.id) {
                continue;
            }
            tracing::debug!(
                object_group_id = %group.id,
                objects = group.objects.len(),
                "Deleted object group"
            );
            summary.object_groups_deleted += 1;
            summary.binary_objects_deleted += group.objects.len() as u64;
            summary.bytes_reclaimed += group.objects.iter().map(|object| object.size).sum::<u64>();
            sink.push(ObjectGroupReportEntry::deleted(group)).await?;
        }
        Ok(())
    }

    async fn delete_units(
        &self,
        units: &[&Unit],
        sink: &mut ReportSink,
        summary: &mut DeletionSummary,
    ) -> Result<()> {
        let ids: Vec<String> = units.iter().map(|unit| unit.id.clone()).collect();

        self.lifecycles.delete_unit_lifecycles(&ids).await?;
        let removed: HashSet<String> = self
            .metadata
            .delete_units(&ids)
            .await?
            .into_iter()
            .collect();

        for unit in units {
            self.binaries
                .delete(&unit.strategy_id, &unit_backup_key(&unit.id))
                .await?;
            // already gone: reported by the run that removed it
            if !removed.contains(&unit.id) {
                continue;
            }
            sink.push(UnitReportEntry::new(unit, UnitReportStatus::Deleted))
                .await?;
            summary.units_deleted += 1;
        }
        Ok(())
    }

    async fn detach_object_groups(
        &self,
        operation_id: &str,
        groups: &[ObjectGroup],
        deleted: &HashSet<&str>,
        sink: &mut ReportSink,
        summary: &mut DeletionSummary,
    ) -> Result<()> {
        for group in groups {
            let removed: Vec<String> = group
                .parents
                .iter()
                .filter(|parent| deleted.contains(parent.as_str()))
                .cloned()
                .collect();
            if removed.is_empty() {
                continue;
            }
            self.metadata
                .detach_object_group(&group.id, &removed, operation_id)
                .await?;
            tracing::debug!(
                object_group_id = %group.id,
                removed_parents = removed.len(),
                "Detached object group"
            );
            sink.push(ObjectGroupReportEntry::detached(group, removed))
                .await?;
            summary.object_groups_detached += 1;
        }
        Ok(())
    }

    /// Stage entry point. Any failure is FATAL.
    pub async fn run(&self, operation_id: &str, spool: &Path, batch_size: usize) -> StageOutcome {
        match self.delete_spool(operation_id, spool, batch_size).await {
            Ok(summary) => summary.outcome(),
            Err(e) => {
                tracing::error!(operation_id = %operation_id, error = %e, "Deletion failed");
                let mut outcome = StageOutcome::from_error(Stage::Deletion, &e);
                outcome.status = StatusCode::Fatal;
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::CompensationStage;
    use crate::model::{BinaryObject, ObjectGroupReportStatus};
    use crate::store::{
        Dataset, InMemoryAccessionRegister, InMemoryArchive, InMemoryReportStore,
        MockLifecycleStore, StoreError,
    };
    use common::storage::StrategyStores;
    use futures::TryStreamExt;
    use object_store::memory::InMemory;
    use object_store::{ObjectStore, PutPayload};

    struct Fixture {
        archive: Arc<InMemoryArchive>,
        reports: Arc<InMemoryReportStore>,
        binaries: BinaryStore,
        store: Arc<dyn ObjectStore>,
    }

    impl Fixture {
        async fn new(dataset: Dataset) -> Self {
            let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
            for group in &dataset.object_groups {
                for object in &group.objects {
                    store
                        .put(&object_key(&object.id), PutPayload::from(vec![0u8; object.size as usize]))
                        .await
                        .unwrap();
                }
            }
            let mut stores = StrategyStores::new();
            stores.insert("default".to_string(), Arc::clone(&store));
            Self {
                archive: Arc::new(InMemoryArchive::from_dataset(dataset)),
                reports: Arc::new(InMemoryReportStore::new()),
                binaries: BinaryStore::new(stores),
                store,
            }
        }

        fn stage(&self) -> DeletionStage {
            DeletionStage::new(
                self.archive.clone(),
                self.archive.clone(),
                self.binaries.clone(),
                self.reports.clone(),
                2,
                EliminationMetrics::new(),
            )
        }

        async fn unit_entries(&self) -> Vec<UnitReportEntry> {
            self.reports
                .units("op-1")
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap()
        }

        async fn group_entries(&self) -> Vec<ObjectGroupReportEntry> {
            self.reports
                .object_groups("op-1")
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap()
        }
    }

    fn group(id: &str, parents: &[&str], objects: &[(&str, u64)]) -> ObjectGroup {
        let mut group = ObjectGroup::new(id);
        group.parents = parents.iter().map(|p| p.to_string()).collect();
        group.objects = objects
            .iter()
            .map(|(id, size)| BinaryObject {
                id: id.to_string(),
                size: *size,
                strategy_id: "default".into(),
            })
            .collect();
        group
    }

    #[tokio::test]
    async fn test_orphan_group_deleted_with_binaries() {
        let fixture = Fixture::new(Dataset {
            units: vec![Unit::new("u1", 1).with_object_group("og-1")],
            object_groups: vec![group("og-1", &["u1"], &[("obj-1", 10), ("obj-2", 5)])],
            inherited_rules: vec![],
        })
        .await;

        let summary = fixture
            .stage()
            .delete_batch("op-1", &[Unit::new("u1", 1).with_object_group("og-1")])
            .await
            .unwrap();

        assert_eq!(summary.units_deleted, 1);
        assert_eq!(summary.object_groups_deleted, 1);
        assert_eq!(summary.binary_objects_deleted, 2);
        assert_eq!(summary.bytes_reclaimed, 15);

        assert!(fixture.archive.unit("u1").await.is_none());
        assert!(fixture.archive.object_group("og-1").await.is_none());
        assert!(!fixture.archive.has_unit_lifecycle("u1").await);
        assert!(!fixture.archive.has_object_group_lifecycle("og-1").await);
        assert!(fixture.store.head(&object_key("obj-1")).await.is_err());

        let groups = fixture.group_entries().await;
        assert_eq!(groups[0].status, ObjectGroupReportStatus::Deleted);
        assert_eq!(groups[0].object_ids, vec!["obj-1", "obj-2"]);
    }

    #[tokio::test]
    async fn test_shared_group_is_detached() {
        let unit = Unit::new("u1", 1).with_object_group("og-1");
        let fixture = Fixture::new(Dataset {
            units: vec![unit.clone(), Unit::new("u2", 1).with_object_group("og-1")],
            object_groups: vec![group("og-1", &["u1", "u2"], &[("obj-1", 10)])],
            inherited_rules: vec![],
        })
        .await;

        let summary = fixture.stage().delete_batch("op-1", &[unit]).await.unwrap();

        assert_eq!(summary.object_groups_detached, 1);
        assert_eq!(summary.object_groups_deleted, 0);
        let og = fixture.archive.object_group("og-1").await.unwrap();
        assert_eq!(og.parents, vec!["u2"]);
        assert_eq!(og.operations, vec!["op-1"]);
        assert!(fixture.store.head(&object_key("obj-1")).await.is_ok());

        let groups = fixture.group_entries().await;
        assert_eq!(groups[0].status, ObjectGroupReportStatus::PartialDetachment);
        assert_eq!(groups[0].deleted_parent_unit_ids, vec!["u1"]);
    }

    #[tokio::test]
    async fn test_group_shared_within_batch_is_deleted() {
        let units = vec![
            Unit::new("u1", 1).with_object_group("og-1"),
            Unit::new("u2", 1).with_object_group("og-1"),
        ];
        let fixture = Fixture::new(Dataset {
            units: units.clone(),
            object_groups: vec![group("og-1", &["u1", "u2"], &[("obj-1", 10)])],
            inherited_rules: vec![],
        })
        .await;

        let summary = fixture.stage().delete_batch("op-1", &units).await.unwrap();
        assert_eq!(summary.object_groups_deleted, 1);
        assert_eq!(summary.object_groups_detached, 0);
    }

    #[tokio::test]
    async fn test_unit_with_surviving_child_is_kept() {
        let parent = Unit::new("parent", 0);
        let fixture = Fixture::new(Dataset {
            units: vec![parent.clone(), Unit::new("kept-child", 1).with_parent("parent")],
            ..Default::default()
        })
        .await;

        let summary = fixture.stage().delete_batch("op-1", &[parent]).await.unwrap();

        assert_eq!(summary.units_deleted, 0);
        assert_eq!(summary.units_with_children, 1);
        assert!(fixture.archive.unit("parent").await.is_some());
        let entries = fixture.unit_entries().await;
        assert_eq!(entries[0].status, UnitReportStatus::NonDestroyableHasChildUnits);
        assert_eq!(summary.outcome().status, StatusCode::Warning);
    }

    #[tokio::test]
    async fn test_children_in_same_batch_unblock_parent() {
        let units = vec![
            Unit::new("leaf", 2).with_parent("mid"),
            Unit::new("mid", 1).with_parent("root"),
            Unit::new("root", 0),
        ];
        let fixture = Fixture::new(Dataset {
            units: units.clone(),
            ..Default::default()
        })
        .await;

        let summary = fixture.stage().delete_batch("op-1", &units).await.unwrap();

        assert_eq!(summary.units_deleted, 3);
        assert_eq!(fixture.archive.unit_count().await, 0);
        assert_eq!(fixture.reports.len("op-1").await, 3);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let unit = Unit::new("u1", 1).with_object_group("og-1");
        let fixture = Fixture::new(Dataset {
            units: vec![unit.clone()],
            object_groups: vec![group("og-1", &["u1"], &[("obj-1", 10)])],
            inherited_rules: vec![],
        })
        .await;
        let stage = fixture.stage();

        stage.delete_batch("op-1", &[unit.clone()]).await.unwrap();
        let reported = fixture.reports.len("op-1").await;
        let replay = stage.delete_batch("op-1", &[unit]).await.unwrap();

        assert_eq!(replay, DeletionSummary::default());
        assert_eq!(fixture.reports.len("op-1").await, reported);
        assert_eq!(fixture.unit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_batch_is_compensated_once() {
        let unit = Unit::new("u1", 1)
            .with_agency("AG-A")
            .with_initial_operation("ingest-1");
        let fixture = Fixture::new(Dataset {
            units: vec![unit.clone()],
            ..Default::default()
        })
        .await;
        let stage = fixture.stage();

        stage.delete_batch("op-1", &[unit.clone()]).await.unwrap();
        stage.delete_batch("op-1", &[unit]).await.unwrap();

        let compensation = CompensationStage::new(
            fixture.reports.clone(),
            Arc::new(InMemoryAccessionRegister::new()),
            EliminationMetrics::new(),
        );
        let deltas = compensation.prepare("op-1").await.unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].total_units.deleted, 1);
    }

    #[tokio::test]
    async fn test_replay_after_partial_detach_reports_nothing_new() {
        let unit = Unit::new("u1", 1).with_object_group("og-1");
        let fixture = Fixture::new(Dataset {
            units: vec![unit.clone(), Unit::new("u2", 1).with_object_group("og-1")],
            object_groups: vec![group("og-1", &["u1", "u2"], &[("obj-1", 10)])],
            inherited_rules: vec![],
        })
        .await;
        let stage = fixture.stage();

        stage.delete_batch("op-1", &[unit.clone()]).await.unwrap();
        let replay = stage.delete_batch("op-1", &[unit]).await.unwrap();

        assert_eq!(replay.object_groups_detached, 0);
        assert_eq!(fixture.group_entries().await.len(), 1);
        let og = fixture.archive.object_group("og-1").await.unwrap();
        assert_eq!(og.parents, vec!["u2"]);
    }

    #[tokio::test]
    async fn test_lifecycle_failure_is_fatal_before_documents_are_touched() {
        let unit = Unit::new("u1", 1);
        let fixture = Fixture::new(Dataset {
            units: vec![unit.clone()],
            ..Default::default()
        })
        .await;
        let mut lifecycles = MockLifecycleStore::new();
        lifecycles
            .expect_delete_unit_lifecycles()
            .returning(|_| Err(StoreError::Unavailable("lifecycle".into())));

        let stage = DeletionStage::new(
            fixture.archive.clone(),
            Arc::new(lifecycles),
            fixture.binaries.clone(),
            fixture.reports.clone(),
            10,
            EliminationMetrics::new(),
        );

        let error = stage.delete_batch("op-1", &[unit]).await.unwrap_err();
        assert_eq!(error.status(), StatusCode::Fatal);
        assert!(fixture.archive.unit("u1").await.is_some());
    }

    #[tokio::test]
    async fn test_missing_spool_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let fixture = Fixture::new(Dataset::default()).await;

        let outcome = fixture
            .stage()
            .run("op-1", &dir.path().join("absent.jsonl"), 10)
            .await;
        assert_eq!(outcome.status, StatusCode::Fatal);
    }
}
