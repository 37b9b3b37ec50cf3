//! Admission control on the number of selected units.

use std::sync::Arc;

use serde_json::json;

use crate::outcome::{EliminationError, Result, Stage, StageOutcome, StatusCode};
use crate::query::SelectQuery;
use crate::store::UnitSelector;

/// Result of a successful threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdCheck {
    pub found: u64,
    /// Requested threshold, or the default one
    pub threshold: u64,
    pub status: StatusCode,
}

impl ThresholdCheck {
    pub fn outcome(&self) -> StageOutcome {
        let details = json!({ "threshold": self.threshold, "found": self.found });
        let outcome = match self.status {
            StatusCode::Warning => StageOutcome::warning(
                Stage::ThresholdCheck,
                format!(
                    "Found {} units, above the default threshold but within the requested threshold {}",
                    self.found, self.threshold
                ),
            ),
            status => StageOutcome::new(
                Stage::ThresholdCheck,
                status,
                format!("Found {} units", self.found),
            ),
        };
        outcome.with_details(details)
    }
}

/// Compare a unit count with the requested and default thresholds.
///
/// Above the effective threshold (requested, else default) is a KO; above the
/// default one only is a WARNING.
pub fn evaluate(found: u64, requested: Option<u64>, default_threshold: u64) -> Result<ThresholdCheck> {
    let threshold = requested.unwrap_or(default_threshold);
    if found > threshold {
        return Err(EliminationError::ThresholdExceeded { threshold, found });
    }
    let status = if found > default_threshold {
        StatusCode::Warning
    } else {
        StatusCode::Ok
    };
    Ok(ThresholdCheck {
        found,
        threshold,
        status,
    })
}

pub struct ThresholdGuard {
    selector: Arc<dyn UnitSelector>,
    default_threshold: u64,
}

impl ThresholdGuard {
    pub fn new(selector: Arc<dyn UnitSelector>, default_threshold: u64) -> Self {
        Self {
            selector,
            default_threshold,
        }
    }

    pub async fn check(&self, query: &SelectQuery) -> Result<ThresholdCheck> {
        let found = self.selector.count(&query.for_count()).await?;
        let check = evaluate(found, query.threshold, self.default_threshold)?;

        tracing::info!(
            found = check.found,
            threshold = check.threshold,
            default_threshold = self.default_threshold,
            status = %check.status,
            "Threshold check complete"
        );
        Ok(check)
    }

    /// Stage entry point.
    pub async fn run(&self, query: &SelectQuery) -> StageOutcome {
        match self.check(query).await {
            Ok(check) => check.outcome(),
            Err(e) => {
                tracing::warn!(error = %e, "Threshold check rejected the selection");
                StageOutcome::from_error(Stage::ThresholdCheck, &e)
            }
        }
    }
}
