use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::outcome::{EliminationError, Result};
use crate::query::SelectQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EliminationMode {
    /// Annotate units with their analysis, delete nothing
    Analysis,
    /// Spool destroy candidates and delete them
    Action,
}

impl EliminationMode {
    /// Threshold applying when the selection does not request one.
    pub fn default_threshold(self, config: &common::EliminationConfig) -> u64 {
        match self {
            EliminationMode::Analysis => config.analysis_threshold,
            EliminationMode::Action => config.action_threshold,
        }
    }
}

/// Elimination request as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EliminationRequest {
    pub operation_id: String,
    /// Reference date for rule end dates, `YYYY-MM-DD`
    pub expiration_date: String,
    pub query: SelectQuery,
}

/// Request whose date and selection passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub operation_id: String,
    pub expiration_date: NaiveDate,
    pub query: SelectQuery,
}

impl EliminationRequest {
    pub fn new(
        operation_id: impl Into<String>,
        expiration_date: impl Into<String>,
        query: SelectQuery,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            expiration_date: expiration_date.into(),
            query,
        }
    }

    /// Check the request against `today`.
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedRequest> {
        if self.operation_id.trim().is_empty() {
            return Err(EliminationError::InvalidRequest(
                "missing operation id".to_string(),
            ));
        }

        let expiration_date = NaiveDate::parse_from_str(self.expiration_date.trim(), "%Y-%m-%d")
            .map_err(|_| EliminationError::InvalidDate(self.expiration_date.clone()))?;
        if expiration_date > today {
            return Err(EliminationError::FutureDate(expiration_date));
        }

        self.query
            .validate()
            .map_err(EliminationError::InvalidRequest)?;

        Ok(ValidatedRequest {
            operation_id: self.operation_id.clone(),
            expiration_date,
            query: self.query.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::StatusCode;
    use crate::query::Query;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let request = EliminationRequest::new("op-1", "2021-01-01", SelectQuery::default());
        let validated = request.validate(today()).unwrap();
        assert_eq!(
            validated.expiration_date,
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_expiration_today_is_accepted() {
        let request = EliminationRequest::new("op-1", "2024-03-15", SelectQuery::default());
        assert!(request.validate(today()).is_ok());
    }

    #[test]
    fn test_invalid_inputs_are_ko() {
        let cases = [
            EliminationRequest::new("op-1", "15/03/2021", SelectQuery::default()),
            EliminationRequest::new("op-1", "2024-03-16", SelectQuery::default()),
            EliminationRequest::new("op-1", "2021-01-01", SelectQuery::new(Query::exists(""))),
            EliminationRequest::new(" ", "2021-01-01", SelectQuery::default()),
        ];

        for request in cases {
            let error = request.validate(today()).unwrap_err();
            assert_eq!(error.status(), StatusCode::Ko, "{error}");
        }
    }

    #[test]
    fn test_future_date_error() {
        let request = EliminationRequest::new("op-1", "2030-01-01", SelectQuery::default());
        assert!(matches!(
            request.validate(today()),
            Err(EliminationError::FutureDate(_))
        ));
    }
}
