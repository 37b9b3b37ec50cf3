//! Classification of the selected units.
//!
//! Streams the selection deepest-first, resolves inherited rules page by page
//! and sorts every unit into the destroy-candidate spool (action runs), the
//! report store (KEEP/CONFLICT units of action runs) or the analysis index
//! (analysis runs).

use std::sync::Arc;

use common::EliminationConfig;
use serde_json::json;

use crate::analysis::RuleInheritanceResolver;
use crate::metrics::EliminationMetrics;
use crate::model::{EliminationGlobalStatus, UnitInheritedRules, UnitReportEntry};
use crate::outcome::{EliminationError, Result, Stage, StageOutcome, StatusCode};
use crate::report::ReportSink;
use crate::request::{EliminationMode, ValidatedRequest};
use crate::spool::{Spool, SpoolRecord, SpoolWriter};
use crate::store::{MetadataStore, ReportStore, RuleInheritanceProvider, UnitScroll, UnitSelector};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub analyzed: u64,
    pub destroyable: u64,
    /// KEEP and CONFLICT units
    pub non_destroyable: u64,
    pub conflicts: u64,
    /// Destroy candidates of an action run
    pub spool: Option<Spool>,
}

impl ClassificationSummary {
    /// OK only when every candidate is destroyable.
    pub fn status(&self) -> StatusCode {
        if self.destroyable > 0 && self.non_destroyable == 0 {
            StatusCode::Ok
        } else {
            StatusCode::Warning
        }
    }

    pub fn outcome(&self) -> StageOutcome {
        let message = match self.status() {
            StatusCode::Ok => "All selected units are destroyable".to_string(),
            _ if self.destroyable == 0 => "No destroyable unit found".to_string(),
            _ => format!("{} selected units are not destroyable", self.non_destroyable),
        };
        StageOutcome::new(Stage::Classification, self.status(), message).with_details(json!({
            "analyzed": self.analyzed,
            "destroyable": self.destroyable,
            "nonDestroyable": self.non_destroyable,
            "conflicts": self.conflicts,
        }))
    }
}

pub struct ClassificationStage {
    selector: Arc<dyn UnitSelector>,
    rules: Arc<dyn RuleInheritanceProvider>,
    metadata: Arc<dyn MetadataStore>,
    reports: Arc<dyn ReportStore>,
    config: EliminationConfig,
    metrics: EliminationMetrics,
}

impl ClassificationStage {
    pub fn new(
        selector: Arc<dyn UnitSelector>,
        rules: Arc<dyn RuleInheritanceProvider>,
        metadata: Arc<dyn MetadataStore>,
        reports: Arc<dyn ReportStore>,
        config: EliminationConfig,
        metrics: EliminationMetrics,
    ) -> Self {
        Self {
            selector,
            rules,
            metadata,
            reports,
            config,
            metrics,
        }
    }

    pub async fn classify(
        &self,
        request: &ValidatedRequest,
        mode: EliminationMode,
    ) -> Result<ClassificationSummary> {
        tracing::info!(
            operation_id = %request.operation_id,
            expiration_date = %request.expiration_date,
            mode = ?mode,
            "Starting unit classification"
        );

        let mut spool = match mode {
            EliminationMode::Action => {
                Some(SpoolWriter::create(&self.config.workspace_dir, &request.operation_id).await?)
            }
            EliminationMode::Analysis => None,
        };
        let mut sink = ReportSink::new(
            Arc::clone(&self.reports),
            request.operation_id.clone(),
            self.config.report_flush_size,
        );

        let scanned = self.scan(request, spool.as_mut(), &mut sink).await;
        let closed = sink.close().await;
        let mut summary = scanned?;
        closed?;

        if let Some(writer) = spool {
            summary.spool = Some(writer.finish().await?);
        }

        tracing::info!(
            operation_id = %request.operation_id,
            analyzed = summary.analyzed,
            destroyable = summary.destroyable,
            non_destroyable = summary.non_destroyable,
            conflicts = summary.conflicts,
            "Unit classification complete"
        );
        Ok(summary)
    }

    async fn scan(
        &self,
        request: &ValidatedRequest,
        mut spool: Option<&mut SpoolWriter>,
        sink: &mut ReportSink,
    ) -> Result<ClassificationSummary> {
        let resolver = RuleInheritanceResolver::new(request.expiration_date);
        let mut scroll = UnitScroll::new(
            Arc::clone(&self.selector),
            request.query.clone(),
            self.config.scroll_batch_size,
            self.config.scroll_timeout,
        );
        let no_rules = UnitInheritedRules::default();
        let mut summary = ClassificationSummary::default();
        let mut last_depth: Option<u32> = None;

        while let Some(units) = scroll.next_batch().await? {
            let ids: Vec<String> = units.iter().map(|unit| unit.id.clone()).collect();
            let inherited = self.rules.inherited_rules(&ids).await?;
            let mut analyses = Vec::new();

            for unit in &units {
                if last_depth.is_some_and(|depth| unit.depth > depth) {
                    return Err(EliminationError::Consistency(format!(
                        "unit {} at depth {} returned after a shallower unit",
                        unit.id, unit.depth
                    )));
                }
                last_depth = Some(unit.depth);

                let rules = inherited.get(&unit.id).unwrap_or(&no_rules);
                let analysis = resolver.analyze(&request.operation_id, unit, rules);
                tracing::debug!(
                    unit_id = %unit.id,
                    status = ?analysis.global_status,
                    "Unit analysed"
                );

                summary.analyzed += 1;
                match analysis.global_status {
                    EliminationGlobalStatus::Destroy => summary.destroyable += 1,
                    EliminationGlobalStatus::Keep => summary.non_destroyable += 1,
                    EliminationGlobalStatus::Conflict => {
                        summary.non_destroyable += 1;
                        summary.conflicts += 1;
                    }
                }

                match spool.as_deref_mut() {
                    Some(writer) if analysis.is_destroyable() => {
                        writer.append(&SpoolRecord::from(unit)).await?;
                    }
                    Some(_) => {
                        if let Some(entry) = UnitReportEntry::from_analysis(unit, &analysis) {
                            sink.push(entry).await?;
                        }
                    }
                    None => analyses.push(analysis),
                }
            }

            if !analyses.is_empty() {
                self.metadata.save_analysis(analyses).await?;
            }
        }

        self.metrics.record_units_analyzed(summary.analyzed);
        self.metrics.record_destroyable(summary.destroyable);
        self.metrics.record_non_destroyable(summary.non_destroyable);
        self.metrics.record_conflicts(summary.conflicts);
        Ok(summary)
    }

    /// Stage entry point.
    pub async fn run(&self, request: &ValidatedRequest, mode: EliminationMode) -> StageOutcome {
        match self.classify(request, mode).await {
            Ok(summary) => summary.outcome(),
            Err(e) => {
                tracing::error!(operation_id = %request.operation_id, error = %e, "Classification failed");
                StageOutcome::from_error(Stage::Classification, &e)
            }
        }
    }
}
