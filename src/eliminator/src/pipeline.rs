//! Sequencing of the elimination stages for one operation.
//!
//! ```text
//! Validating -> ThresholdChecked -> Classifying -> DestroyReady     -> Deleting -> Compensating -> Reporting -> Completed
//!                                               \-> NothingToDestroy ------------------------------/
//! ```
//!
//! Analysis runs stop once classification settled. Any KO or FATAL stage
//! outcome moves the run to `Failed`.

use std::sync::Arc;

use chrono::NaiveDate;
use common::{Configuration, EliminationConfig};
use serde::Serialize;

use crate::classification::ClassificationStage;
use crate::compensation::CompensationStage;
use crate::deletion::DeletionStage;
use crate::metrics::{EliminationMetrics, MetricsSummary};
use crate::outcome::{EliminationError, Result, Stage, StageOutcome, StatusCode};
use crate::report::{ReportStage, ReportSummary};
use crate::request::{EliminationMode, EliminationRequest};
use crate::spool::remove_spool;
use crate::store::{
    AccessionRegisterStore, BinaryStore, InMemoryAccessionRegister, InMemoryArchive,
    InMemoryReportStore, LifecycleStore, MetadataStore, ReportStore, RuleInheritanceProvider,
    UnitSelector,
};
use crate::threshold::ThresholdGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Validating,
    ThresholdChecked,
    Classifying,
    DestroyReady,
    NothingToDestroy,
    Deleting,
    Compensating,
    Reporting,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Validating, ThresholdChecked)
            | (ThresholdChecked, Classifying)
            | (Classifying, DestroyReady | NothingToDestroy)
            | (DestroyReady, Deleting)
            | (NothingToDestroy, Reporting)
            | (Deleting, Compensating)
            | (Compensating, Reporting)
            | (Reporting, Completed) => true,
            _ => false,
        }
    }
}

/// Collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineStores {
    pub selector: Arc<dyn UnitSelector>,
    pub rules: Arc<dyn RuleInheritanceProvider>,
    pub metadata: Arc<dyn MetadataStore>,
    pub lifecycles: Arc<dyn LifecycleStore>,
    pub reports: Arc<dyn ReportStore>,
    pub register: Arc<dyn AccessionRegisterStore>,
    pub binaries: BinaryStore,
}

impl PipelineStores {
    /// Every document service backed by one in-memory archive.
    pub fn in_memory(
        archive: Arc<InMemoryArchive>,
        reports: Arc<InMemoryReportStore>,
        register: Arc<InMemoryAccessionRegister>,
        binaries: BinaryStore,
    ) -> Self {
        Self {
            selector: archive.clone(),
            rules: archive.clone(),
            metadata: archive.clone(),
            lifecycles: archive,
            reports,
            register,
            binaries,
        }
    }
}

/// What happened to one operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub operation_id: String,
    pub mode: EliminationMode,
    pub state: PipelineState,
    /// Most severe stage status
    pub status: StatusCode,
    pub outcomes: Vec<StageOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportSummary>,
    pub metrics: MetricsSummary,
}

type Step<T> = std::result::Result<T, (Stage, EliminationError)>;

fn at<T>(stage: Stage, result: Result<T>) -> Step<T> {
    result.map_err(|e| (stage, e))
}

impl PipelineRun {
    fn new(operation_id: &str, mode: EliminationMode) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            mode,
            state: PipelineState::Validating,
            status: StatusCode::Ok,
            outcomes: Vec::new(),
            report_location: None,
            report: None,
            metrics: MetricsSummary::default(),
        }
    }

    fn record(&mut self, outcome: StageOutcome) {
        self.status = self.status.combine(outcome.status);
        self.outcomes.push(outcome);
    }

    fn advance(&mut self, next: PipelineState) -> Step<()> {
        if !self.state.can_transition_to(next) {
            return Err((
                self.outcomes.last().map_or(Stage::Validation, |o| o.stage),
                EliminationError::Consistency(format!(
                    "invalid pipeline transition {:?} -> {next:?}",
                    self.state
                )),
            ));
        }
        tracing::debug!(
            operation_id = %self.operation_id,
            from = ?self.state,
            to = ?next,
            "Pipeline transition"
        );
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, outcome: StageOutcome) {
        tracing::error!(
            operation_id = %self.operation_id,
            stage = %outcome.stage,
            status = %outcome.status,
            message = %outcome.message,
            "Elimination run failed"
        );
        self.record(outcome);
        self.state = PipelineState::Failed;
    }
}

pub struct EliminationPipeline {
    config: EliminationConfig,
    selector: Arc<dyn UnitSelector>,
    classification: ClassificationStage,
    deletion: DeletionStage,
    compensation: CompensationStage,
    report: ReportStage,
    metrics: EliminationMetrics,
}

impl EliminationPipeline {
    /// Fails when the report strategy has no object store.
    pub fn new(config: &Configuration, stores: PipelineStores) -> Result<Self> {
        let elimination = config.elimination.clone();
        let metrics = EliminationMetrics::new();
        let archive = stores.binaries.strategy(&config.storage.report_strategy)?;

        Ok(Self {
            selector: Arc::clone(&stores.selector),
            classification: ClassificationStage::new(
                Arc::clone(&stores.selector),
                stores.rules,
                Arc::clone(&stores.metadata),
                Arc::clone(&stores.reports),
                elimination.clone(),
                metrics.clone(),
            ),
            deletion: DeletionStage::new(
                stores.metadata,
                stores.lifecycles,
                stores.binaries,
                Arc::clone(&stores.reports),
                elimination.report_flush_size,
                metrics.clone(),
            ),
            compensation: CompensationStage::new(
                Arc::clone(&stores.reports),
                stores.register,
                metrics.clone(),
            ),
            report: ReportStage::new(stores.reports, archive, elimination.report_prefix.clone()),
            config: elimination,
            metrics,
        })
    }

    pub fn metrics(&self) -> &EliminationMetrics {
        &self.metrics
    }

    /// Run `request` to completion, or until a stage blocks it.
    pub async fn run(
        &self,
        request: &EliminationRequest,
        mode: EliminationMode,
        today: NaiveDate,
    ) -> PipelineRun {
        let mut run = PipelineRun::new(&request.operation_id, mode);
        tracing::info!(
            operation_id = %request.operation_id,
            mode = ?mode,
            expiration_date = %request.expiration_date,
            "Starting elimination run"
        );

        let driven = self.drive(&mut run, request, mode, today).await;
        // a failed deletion keeps its spool so the batches can be replayed
        let keep_spool = matches!(driven, Err((Stage::Deletion, _)));
        if let Err((stage, e)) = driven {
            run.fail(StageOutcome::from_error(stage, &e));
        }
        let classified = run
            .outcomes
            .iter()
            .any(|outcome| outcome.stage == Stage::Classification);
        if mode == EliminationMode::Action && classified && !keep_spool {
            self.discard_spool(&run.operation_id).await;
        }
        run.metrics = self.metrics.summary();

        tracing::info!(
            operation_id = %run.operation_id,
            state = ?run.state,
            status = %run.status,
            "Elimination run finished"
        );
        run
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        request: &EliminationRequest,
        mode: EliminationMode,
        today: NaiveDate,
    ) -> Step<()> {
        let validated = at(Stage::Validation, request.validate(today))?;
        run.record(StageOutcome::ok(Stage::Validation, "Elimination request is valid"));

        let guard = ThresholdGuard::new(
            Arc::clone(&self.selector),
            mode.default_threshold(&self.config),
        );
        let check = at(Stage::ThresholdCheck, guard.check(&validated.query).await)?;
        run.record(check.outcome());
        run.advance(PipelineState::ThresholdChecked)?;

        run.advance(PipelineState::Classifying)?;
        let summary = at(
            Stage::Classification,
            self.classification.classify(&validated, mode).await,
        )?;
        run.record(summary.outcome());

        let next = if summary.destroyable > 0 {
            PipelineState::DestroyReady
        } else {
            PipelineState::NothingToDestroy
        };
        run.advance(next)?;
        if mode == EliminationMode::Analysis {
            return Ok(());
        }
        let spool = summary.spool.filter(|_| next == PipelineState::DestroyReady);

        if let Some(spool) = spool {
            run.advance(PipelineState::Deleting)?;
            let deleted = at(
                Stage::Deletion,
                self.deletion
                    .delete_spool(
                        &validated.operation_id,
                        &spool.path,
                        self.config.distribution_batch_size,
                    )
                    .await,
            )?;
            run.record(deleted.outcome());

            run.advance(PipelineState::Compensating)?;
            let compensated = at(
                Stage::Compensation,
                self.compensation.compensate(&validated.operation_id).await,
            )?;
            run.record(compensated.outcome());
        }

        run.advance(PipelineState::Reporting)?;
        let archived = at(
            Stage::Report,
            self.report.archive(&validated.operation_id).await,
        )?;
        run.record(StageOutcome::ok(Stage::Report, "Elimination report archived"));
        run.report_location = Some(archived.location.to_string());
        run.report = Some(archived.summary);
        run.advance(PipelineState::Completed)?;
        Ok(())
    }

    async fn discard_spool(&self, operation_id: &str) {
        if let Err(e) = remove_spool(&self.config.workspace_dir, operation_id).await {
            tracing::warn!(operation_id = %operation_id, error = %e, "Failed to remove spool");
        }
    }
}
