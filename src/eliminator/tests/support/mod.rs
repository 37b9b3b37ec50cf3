#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use common::Configuration;
use common::storage::StrategyStores;
use eliminator::model::{
    BinaryObject, FINAL_ACTION, InheritedProperty, InheritedRule, ObjectGroup, RuleCategory,
    UnitInheritedRules,
};
use eliminator::pipeline::PipelineStores;
use eliminator::store::{
    BinaryStore, Dataset, InMemoryAccessionRegister, InMemoryArchive, InMemoryReportStore,
    object_key,
};
use eliminator::EliminationPipeline;
use object_store::memory::InMemory;
use object_store::{ObjectStore, PutPayload};

pub const TODAY: &str = "2024-03-15";
pub const EXPIRATION: &str = "2021-01-01";

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn path(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub fn appraisal(unit_id: &str, agency: &str, end: Option<&str>, paths: &[&[&str]]) -> InheritedRule {
    InheritedRule {
        unit_id: unit_id.into(),
        originating_agency: agency.into(),
        paths: paths.iter().map(|p| path(p)).collect(),
        rule_id: format!("APP-{agency}"),
        category: RuleCategory::Appraisal,
        start_date: None,
        end_date: end.map(date),
    }
}

pub fn final_action(unit_id: &str, agency: &str, action: &str, paths: &[&[&str]]) -> InheritedProperty {
    InheritedProperty {
        unit_id: unit_id.into(),
        originating_agency: agency.into(),
        paths: paths.iter().map(|p| path(p)).collect(),
        property_name: FINAL_ACTION.into(),
        property_value: serde_json::json!(action),
    }
}

/// Rules making `unit_id` destroyable for `agency` at [`EXPIRATION`].
pub fn expired(unit_id: &str, agency: &str) -> UnitInheritedRules {
    UnitInheritedRules::new(unit_id)
        .with_rule(appraisal(unit_id, agency, Some("2020-01-01"), &[&[unit_id]]))
        .with_property(
            RuleCategory::Appraisal,
            final_action(unit_id, agency, "Destroy", &[&[unit_id]]),
        )
}

/// Rules keeping `unit_id` for `agency` at [`EXPIRATION`].
pub fn running(unit_id: &str, agency: &str) -> UnitInheritedRules {
    UnitInheritedRules::new(unit_id)
        .with_rule(appraisal(unit_id, agency, None, &[&[unit_id]]))
        .with_property(
            RuleCategory::Appraisal,
            final_action(unit_id, agency, "Destroy", &[&[unit_id]]),
        )
}

pub fn object_group(id: &str, agency: &str, parents: &[&str], objects: &[(&str, u64)]) -> ObjectGroup {
    let mut group = ObjectGroup::new(id);
    group.originating_agency = Some(agency.into());
    group.initial_operation = Some("ingest-1".into());
    group.parents = path(parents);
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

pub struct Harness {
    pub pipeline: EliminationPipeline,
    pub archive: Arc<InMemoryArchive>,
    pub reports: Arc<InMemoryReportStore>,
    pub register: Arc<InMemoryAccessionRegister>,
    pub binaries: Arc<dyn ObjectStore>,
}

impl Harness {
    /// Load `dataset` and store a payload for every binary object it declares.
    pub async fn new(dataset: Dataset, config: &Configuration) -> Self {
        let binaries: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        for group in &dataset.object_groups {
            for object in &group.objects {
                binaries
                    .put(
                        &object_key(&object.id),
                        PutPayload::from(vec![0u8; object.size as usize]),
                    )
                    .await
                    .unwrap();
            }
        }
        let mut stores = StrategyStores::new();
        stores.insert("default".into(), Arc::clone(&binaries));

        let archive = Arc::new(InMemoryArchive::from_dataset(dataset));
        let reports = Arc::new(InMemoryReportStore::new());
        let register = Arc::new(InMemoryAccessionRegister::new());
        let pipeline = EliminationPipeline::new(
            config,
            PipelineStores::in_memory(
                archive.clone(),
                reports.clone(),
                register.clone(),
                BinaryStore::new(stores),
            ),
        )
        .unwrap();

        Self {
            pipeline,
            archive,
            reports,
            register,
            binaries,
        }
    }

    pub async fn report_document(&self, location: &str) -> serde_json::Value {
        let bytes = self
            .binaries
            .get(&object_store::path::Path::from(location))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
