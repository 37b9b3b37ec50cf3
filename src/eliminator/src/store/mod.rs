//! Contracts of the services the pipeline talks to.
//!
//! The metadata, lifecycle, report and accession register services are opaque
//! collaborators; only the calls the pipeline needs are modelled here. Binary
//! payloads go through `object_store`, one store per storage strategy.

mod binary;
mod memory;
mod scroll;

pub use binary::{BinaryStore, object_group_backup_key, object_key, unit_backup_key};
pub use memory::{Dataset, InMemoryAccessionRegister, InMemoryArchive, InMemoryReportStore};
pub use scroll::UnitScroll;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::model::{
    AccessionRegisterDelta, AnalysisResult, ObjectGroup, ObjectGroupReportEntry, ReportEntry,
    Unit, UnitInheritedRules, UnitReportEntry,
};
use crate::query::SelectQuery;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unknown storage strategy: {0}")]
    UnknownStrategy(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of a unit scroll. `cursor` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollPage {
    pub units: Vec<Unit>,
    pub cursor: Option<String>,
}

/// Selection query execution.
///
/// Scroll pages are ordered deepest-first: a unit is never returned before any
/// of its descendants matching the same selection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UnitSelector: Send + Sync {
    async fn count(&self, query: &SelectQuery) -> StoreResult<u64>;

    /// `keep_alive` is how long the selector should hold the cursor open between pages.
    async fn scroll(
        &self,
        query: &SelectQuery,
        cursor: Option<String>,
        page_size: usize,
        keep_alive: Duration,
    ) -> StoreResult<ScrollPage>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleInheritanceProvider: Send + Sync {
    /// Inherited rules of every requested unit. Units without rules may be absent.
    async fn inherited_rules(
        &self,
        unit_ids: &[String],
    ) -> StoreResult<HashMap<String, UnitInheritedRules>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Index analysis results on their units, replacing earlier ones of the same operation.
    async fn save_analysis(&self, results: Vec<AnalysisResult>) -> StoreResult<()>;

    /// Direct children of each requested unit that still exist.
    async fn find_child_unit_ids(
        &self,
        unit_ids: &[String],
    ) -> StoreResult<HashMap<String, Vec<String>>>;

    async fn get_object_groups(&self, ids: &[String]) -> StoreResult<Vec<ObjectGroup>>;

    /// Delete if exists. Returns the ids this call removed.
    async fn delete_units(&self, ids: &[String]) -> StoreResult<Vec<String>>;

    /// Delete if exists. Returns the ids this call removed.
    async fn delete_object_groups(&self, ids: &[String]) -> StoreResult<Vec<String>>;

    /// Remove parent links and record the operation on a surviving object group.
    async fn detach_object_group(
        &self,
        id: &str,
        removed_parents: &[String],
        operation_id: &str,
    ) -> StoreResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn delete_unit_lifecycles(&self, ids: &[String]) -> StoreResult<()>;

    async fn delete_object_group_lifecycles(&self, ids: &[String]) -> StoreResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn append(&self, operation_id: &str, entries: Vec<ReportEntry>) -> StoreResult<()>;

    /// Unit entries in append order.
    async fn units(
        &self,
        operation_id: &str,
    ) -> StoreResult<BoxStream<'static, StoreResult<UnitReportEntry>>>;

    /// Object group entries in append order.
    async fn object_groups(
        &self,
        operation_id: &str,
    ) -> StoreResult<BoxStream<'static, StoreResult<ObjectGroupReportEntry>>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessionRegisterStore: Send + Sync {
    /// Apply a delta. Fails with [`StoreError::Conflict`] if it was already applied.
    async fn submit(&self, delta: AccessionRegisterDelta) -> StoreResult<()>;
}
