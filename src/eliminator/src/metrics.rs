//! Elimination Metrics
//!
//! Thread-safe counters shared by the stages of an elimination run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe metrics for tracking elimination operations
#[derive(Debug, Clone)]
pub struct EliminationMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Units run through the rule inheritance resolver
    units_analyzed: AtomicU64,
    /// Units classified DESTROY
    units_destroyable: AtomicU64,
    /// Units classified KEEP or CONFLICT
    units_non_destroyable: AtomicU64,
    /// Units classified CONFLICT
    units_conflicted: AtomicU64,
    units_deleted: AtomicU64,
    /// Units kept back because they still have children
    units_with_children: AtomicU64,
    object_groups_deleted: AtomicU64,
    object_groups_detached: AtomicU64,
    binary_objects_deleted: AtomicU64,
    bytes_reclaimed: AtomicU64,
    /// Accession register deltas applied (conflicts excluded)
    register_deltas_applied: AtomicU64,
    total_duration_ms: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub units_analyzed: u64,
    pub units_destroyable: u64,
    pub units_non_destroyable: u64,
    pub units_conflicted: u64,
    pub units_deleted: u64,
    pub units_with_children: u64,
    pub object_groups_deleted: u64,
    pub object_groups_detached: u64,
    pub binary_objects_deleted: u64,
    pub bytes_reclaimed: u64,
    pub register_deltas_applied: u64,
    pub total_duration_ms: u64,
}

impl Default for EliminationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EliminationMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn record_units_analyzed(&self, count: u64) {
        self.inner.units_analyzed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_destroyable(&self, count: u64) {
        self.inner
            .units_destroyable
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_non_destroyable(&self, count: u64) {
        self.inner
            .units_non_destroyable
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_conflicts(&self, count: u64) {
        self.inner
            .units_conflicted
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_units_deleted(&self, count: u64) {
        self.inner.units_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_units_with_children(&self, count: u64) {
        self.inner
            .units_with_children
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_object_groups_deleted(&self, count: u64) {
        self.inner
            .object_groups_deleted
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_object_groups_detached(&self, count: u64) {
        self.inner
            .object_groups_detached
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_binary_objects_deleted(&self, count: u64) {
        self.inner
            .binary_objects_deleted
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record bytes reclaimed
    pub fn record_bytes_reclaimed(&self, bytes: u64) {
        self.inner
            .bytes_reclaimed
            .fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_register_delta_applied(&self) {
        self.inner
            .register_deltas_applied
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record operation duration
    pub fn record_duration_ms(&self, duration_ms: u64) {
        self.inner
            .total_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn units_analyzed(&self) -> u64 {
        self.inner.units_analyzed.load(Ordering::Relaxed)
    }

    pub fn units_deleted(&self) -> u64 {
        self.inner.units_deleted.load(Ordering::Relaxed)
    }

    pub fn object_groups_deleted(&self) -> u64 {
        self.inner.object_groups_deleted.load(Ordering::Relaxed)
    }

    pub fn bytes_reclaimed(&self) -> u64 {
        self.inner.bytes_reclaimed.load(Ordering::Relaxed)
    }

    /// Snapshot all counters and log them.
    pub fn summary(&self) -> MetricsSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let inner = &self.inner;
        let summary = MetricsSummary {
            units_analyzed: load(&inner.units_analyzed),
            units_destroyable: load(&inner.units_destroyable),
            units_non_destroyable: load(&inner.units_non_destroyable),
            units_conflicted: load(&inner.units_conflicted),
            units_deleted: load(&inner.units_deleted),
            units_with_children: load(&inner.units_with_children),
            object_groups_deleted: load(&inner.object_groups_deleted),
            object_groups_detached: load(&inner.object_groups_detached),
            binary_objects_deleted: load(&inner.binary_objects_deleted),
            bytes_reclaimed: load(&inner.bytes_reclaimed),
            register_deltas_applied: load(&inner.register_deltas_applied),
            total_duration_ms: load(&inner.total_duration_ms),
        };

        tracing::info!(
            units_analyzed = summary.units_analyzed,
            units_destroyable = summary.units_destroyable,
            units_non_destroyable = summary.units_non_destroyable,
            units_deleted = summary.units_deleted,
            object_groups_deleted = summary.object_groups_deleted,
            object_groups_detached = summary.object_groups_detached,
            bytes_reclaimed = summary.bytes_reclaimed,
            duration_ms = summary.total_duration_ms,
            "Elimination metrics"
        );

        summary
    }
}
