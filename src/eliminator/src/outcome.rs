//! Stage outcomes and the error taxonomy of the elimination pipeline.
//!
//! Internally every stage works with `Result<_, EliminationError>`. At the stage
//! boundary the error is folded into a [`StageOutcome`], which is the only value
//! handed to the caller deciding whether to proceed, retry or halt.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::store::StoreError;

/// Severity of a stage outcome. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Warning,
    Ko,
    Fatal,
}

impl StatusCode {
    /// Most severe of the two statuses.
    pub fn combine(self, other: StatusCode) -> StatusCode {
        self.max(other)
    }

    /// Whether the run must stop after a stage with this status.
    pub fn is_blocking(self) -> bool {
        self >= StatusCode::Ko
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::Warning => "WARNING",
            StatusCode::Ko => "KO",
            StatusCode::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Validation,
    ThresholdCheck,
    Classification,
    Deletion,
    Compensation,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "ELIMINATION_VALIDATION",
            Stage::ThresholdCheck => "ELIMINATION_THRESHOLD_CHECK",
            Stage::Classification => "ELIMINATION_CLASSIFICATION",
            Stage::Deletion => "ELIMINATION_DELETION",
            Stage::Compensation => "ELIMINATION_ACCESSION_REGISTER",
            Stage::Report => "ELIMINATION_REPORT",
        };
        f.write_str(name)
    }
}

/// Result of one pipeline stage as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StatusCode,
    pub message: String,
    /// Free-form event details
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl StageOutcome {
    pub fn new(stage: Stage, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn ok(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, StatusCode::Ok, message)
    }

    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, StatusCode::Warning, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Classify an error raised inside `stage`.
    pub fn from_error(stage: Stage, error: &EliminationError) -> Self {
        let status = error.status();
        let outcome = Self::new(stage, status, error.to_string());
        match error {
            EliminationError::ThresholdExceeded { threshold, found } => {
                outcome.with_details(json!({ "threshold": threshold, "found": found }))
            }
            _ => outcome.with_details(json!({ "error": error.to_string() })),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EliminationError {
    #[error("Invalid elimination request: {0}")]
    InvalidRequest(String),

    #[error("Could not parse expiration date '{0}'")]
    InvalidDate(String),

    #[error("Expiration date {0} is in the future")]
    FutureDate(NaiveDate),

    #[error("Too many units found. Threshold={threshold}, found={found}")]
    ThresholdExceeded { threshold: u64, found: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Spool I/O error: {0}")]
    Spool(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("[Consistency ERROR] {0}")]
    Consistency(String),
}

impl EliminationError {
    /// Input and business rule failures are KO, everything technical is FATAL.
    pub fn status(&self) -> StatusCode {
        match self {
            EliminationError::InvalidRequest(_)
            | EliminationError::InvalidDate(_)
            | EliminationError::FutureDate(_)
            | EliminationError::ThresholdExceeded { .. } => StatusCode::Ko,
            EliminationError::Store(_)
            | EliminationError::Spool(_)
            | EliminationError::Serialization(_)
            | EliminationError::Consistency(_) => StatusCode::Fatal,
        }
    }
}

pub type Result<T, E = EliminationError> = std::result::Result<T, E>;
