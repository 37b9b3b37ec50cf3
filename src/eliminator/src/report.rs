//! Elimination report: buffered accumulation and final archival.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::TryStreamExt;
use futures::stream::BoxStream;
use object_store::ObjectStore;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use crate::model::{ObjectGroupReportStatus, ReportEntry, UnitReportStatus};
use crate::outcome::{EliminationError, Result, Stage, StageOutcome};
use crate::store::{ReportStore, StoreError, StoreResult};

/// Buffers report entries and appends them to the report store in batches.
///
/// Call [`ReportSink::close`] on every exit path; entries still buffered when
/// the sink is dropped are lost.
pub struct ReportSink {
    store: Arc<dyn ReportStore>,
    operation_id: String,
    flush_size: usize,
    buffer: Vec<ReportEntry>,
    appended: u64,
}

impl ReportSink {
    pub fn new(store: Arc<dyn ReportStore>, operation_id: impl Into<String>, flush_size: usize) -> Self {
        let flush_size = flush_size.max(1);
        Self {
            store,
            operation_id: operation_id.into(),
            flush_size,
            buffer: Vec::with_capacity(flush_size),
            appended: 0,
        }
    }

    pub async fn push(&mut self, entry: impl Into<ReportEntry>) -> StoreResult<()> {
        self.buffer.push(entry.into());
        if self.buffer.len() >= self.flush_size {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> StoreResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.flush_size));
        let len = batch.len() as u64;
        self.store.append(&self.operation_id, batch).await?;
        self.appended += len;
        tracing::debug!(
            operation_id = %self.operation_id,
            entries = len,
            "Flushed report entries"
        );
        Ok(())
    }

    /// Flush what is left. Returns the number of entries appended over the sink's life.
    pub async fn close(mut self) -> StoreResult<u64> {
        self.flush().await?;
        Ok(self.appended)
    }
}

impl Drop for ReportSink {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            tracing::warn!(
                operation_id = %self.operation_id,
                entries = self.buffer.len(),
                "Report sink dropped with unflushed entries"
            );
        }
    }
}

/// Archive key of an operation's report.
pub fn report_location(prefix: &str, operation_id: &str) -> Path {
    Path::from(format!("{}/{operation_id}.json", prefix.trim_matches('/')))
}

/// Entry counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub units: BTreeMap<UnitReportStatus, u64>,
    pub object_groups: BTreeMap<ObjectGroupReportStatus, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedReport {
    pub location: Path,
    pub summary: ReportSummary,
}

/// Streams the report store of an operation into one JSON document on the archive store.
pub struct ReportStage {
    reports: Arc<dyn ReportStore>,
    archive: Arc<dyn ObjectStore>,
    prefix: String,
}

fn archive_error(error: std::io::Error) -> EliminationError {
    EliminationError::Store(StoreError::ObjectStore(object_store::Error::Generic {
        store: "report archive",
        source: Box::new(error),
    }))
}

async fn write_json<T: Serialize + ?Sized>(writer: &mut BufWriter, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    writer.write_all(&bytes).await.map_err(archive_error)
}

async fn write_raw(writer: &mut BufWriter, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).await.map_err(archive_error)
}

/// Write `entries` as a JSON array, counting them by `status`.
async fn write_array<T, S>(
    writer: &mut BufWriter,
    mut entries: BoxStream<'static, StoreResult<T>>,
    counts: &mut BTreeMap<S, u64>,
    status: impl Fn(&T) -> S,
) -> Result<()>
where
    T: Serialize,
    S: Ord,
{
    write_raw(writer, b"[").await?;
    let mut first = true;
    while let Some(entry) = entries.try_next().await? {
        if !first {
            write_raw(writer, b",").await?;
        }
        first = false;
        write_json(writer, &entry).await?;
        *counts.entry(status(&entry)).or_default() += 1;
    }
    write_raw(writer, b"]").await
}

impl ReportStage {
    pub fn new(reports: Arc<dyn ReportStore>, archive: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            reports,
            archive,
            prefix: prefix.into(),
        }
    }

    pub async fn archive(&self, operation_id: &str) -> Result<ArchivedReport> {
        let location = report_location(&self.prefix, operation_id);
        let mut writer = BufWriter::new(Arc::clone(&self.archive), location.clone());

        let summary = match self.write_report(&mut writer, operation_id).await {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!(error = %abort, location = %location, "Failed to abort report upload");
                }
                return Err(e);
            }
        };
        writer.shutdown().await.map_err(archive_error)?;

        tracing::info!(
            operation_id = %operation_id,
            location = %location,
            units = summary.units.values().sum::<u64>(),
            object_groups = summary.object_groups.values().sum::<u64>(),
            "Archived elimination report"
        );
        Ok(ArchivedReport { location, summary })
    }

    async fn write_report(&self, writer: &mut BufWriter, operation_id: &str) -> Result<ReportSummary> {
        let mut summary = ReportSummary::default();

        write_raw(writer, b"{\"operationId\":").await?;
        write_json(writer, operation_id).await?;

        write_raw(writer, b",\"units\":").await?;
        let units = self.reports.units(operation_id).await?;
        write_array(writer, units, &mut summary.units, |entry| entry.status).await?;

        write_raw(writer, b",\"objectGroups\":").await?;
        let groups = self.reports.object_groups(operation_id).await?;
        write_array(writer, groups, &mut summary.object_groups, |entry| entry.status).await?;

        write_raw(writer, b",\"summary\":").await?;
        write_json(writer, &summary).await?;
        write_raw(writer, b"}").await?;

        Ok(summary)
    }

    /// Stage entry point. Any failure is FATAL.
    pub async fn run(&self, operation_id: &str) -> StageOutcome {
        match self.archive(operation_id).await {
            Ok(report) => StageOutcome::ok(Stage::Report, "Elimination report archived").with_details(json!({
                "location": report.location.to_string(),
                "summary": report.summary,
            })),
            Err(e) => {
                tracing::error!(operation_id = %operation_id, error = %e, "Report archival failed");
                StageOutcome::from_error(Stage::Report, &e)
            }
        }
    }
}
