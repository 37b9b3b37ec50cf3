//! Accession register correction after deletion.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::json;

use crate::metrics::EliminationMetrics;
use crate::model::{
    AccessionRegisterDelta, ObjectGroupReportStatus, RegisterValue, UnitReportStatus,
};
use crate::outcome::{EliminationError, Result, Stage, StageOutcome};
use crate::store::{AccessionRegisterStore, ReportStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The same delta was submitted by an earlier run of the operation
    AlreadyApplied,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompensationSummary {
    pub applied: u64,
    pub already_applied: u64,
}

impl CompensationSummary {
    pub fn outcome(&self) -> StageOutcome {
        StageOutcome::ok(
            Stage::Compensation,
            format!("{} register deltas applied", self.applied),
        )
        .with_details(json!({
            "applied": self.applied,
            "alreadyApplied": self.already_applied,
        }))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Totals {
    units: u64,
    object_groups: u64,
    objects: u64,
    bytes: u64,
}

impl Totals {
    fn is_empty(&self) -> bool {
        *self == Totals::default()
    }
}

pub struct CompensationStage {
    reports: Arc<dyn ReportStore>,
    register: Arc<dyn AccessionRegisterStore>,
    metrics: EliminationMetrics,
}

impl CompensationStage {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        register: Arc<dyn AccessionRegisterStore>,
        metrics: EliminationMetrics,
    ) -> Self {
        Self {
            reports,
            register,
            metrics,
        }
    }

    /// One delta per (originating agency, ingest operation) of the deleted population.
    pub async fn prepare(&self, operation_id: &str) -> Result<Vec<AccessionRegisterDelta>> {
        let mut totals: BTreeMap<(String, String), Totals> = BTreeMap::new();

        let mut units = self.reports.units(operation_id).await?;
        while let Some(entry) = units.try_next().await? {
            if entry.status != UnitReportStatus::Deleted {
                continue;
            }
            match (entry.originating_agency, entry.initial_operation) {
                (Some(agency), Some(ingest)) => {
                    totals.entry((agency, ingest)).or_default().units += 1;
                }
                _ => tracing::warn!(
                    operation_id = %operation_id,
                    unit_id = %entry.unit_id,
                    "Deleted unit has no agency or ingest operation, register not corrected"
                ),
            }
        }

        let mut groups = self.reports.object_groups(operation_id).await?;
        while let Some(entry) = groups.try_next().await? {
            if entry.status != ObjectGroupReportStatus::Deleted {
                continue;
            }
            match (entry.originating_agency, entry.initial_operation) {
                (Some(agency), Some(ingest)) => {
                    let total = totals.entry((agency, ingest)).or_default();
                    total.object_groups += 1;
                    total.objects += entry.object_ids.len() as u64;
                    total.bytes += entry.total_size;
                }
                _ => tracing::warn!(
                    operation_id = %operation_id,
                    object_group_id = %entry.object_group_id,
                    "Deleted object group has no agency or ingest operation, register not corrected"
                ),
            }
        }

        Ok(totals
            .into_iter()
            .filter(|(_, total)| !total.is_empty())
            .map(|((agency, ingest), total)| AccessionRegisterDelta {
                originating_agency: agency,
                initial_operation: ingest,
                operation_id: operation_id.to_string(),
                total_units: RegisterValue::eliminated(total.units),
                total_object_groups: RegisterValue::eliminated(total.object_groups),
                total_objects: RegisterValue::eliminated(total.objects),
                object_size: RegisterValue::eliminated(total.bytes),
            })
            .collect())
    }

    /// Submit one delta. A conflict means it is already applied.
    pub async fn apply(&self, delta: AccessionRegisterDelta) -> Result<ApplyOutcome> {
        let agency = delta.originating_agency.clone();
        let ingest = delta.initial_operation.clone();

        match self.register.submit(delta).await {
            Ok(()) => {
                self.metrics.record_register_delta_applied();
                tracing::debug!(agency = %agency, ingest = %ingest, "Applied register delta");
                Ok(ApplyOutcome::Applied)
            }
            Err(StoreError::Conflict(reason)) => {
                tracing::info!(
                    agency = %agency,
                    ingest = %ingest,
                    reason = %reason,
                    "Register delta already applied"
                );
                Ok(ApplyOutcome::AlreadyApplied)
            }
            Err(e) => Err(EliminationError::Consistency(format!(
                "register update failed for agency {agency}, ingest {ingest}: {e}"
            ))),
        }
    }

    pub async fn compensate(&self, operation_id: &str) -> Result<CompensationSummary> {
        let mut summary = CompensationSummary::default();
        for delta in self.prepare(operation_id).await? {
            match self.apply(delta).await? {
                ApplyOutcome::Applied => summary.applied += 1,
                ApplyOutcome::AlreadyApplied => summary.already_applied += 1,
            }
        }
        tracing::info!(
            operation_id = %operation_id,
            applied = summary.applied,
            already_applied = summary.already_applied,
            "Accession register compensated"
        );
        Ok(summary)
    }

    /// Stage entry point. Any failure is FATAL.
    pub async fn run(&self, operation_id: &str) -> StageOutcome {
        match self.compensate(operation_id).await {
            Ok(summary) => summary.outcome(),
            Err(e) => {
                tracing::error!(operation_id = %operation_id, error = %e, "Compensation failed");
                StageOutcome::from_error(Stage::Compensation, &e)
            }
        }
    }
}
