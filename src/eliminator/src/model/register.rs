use serde::{Deserialize, Serialize};

/// One accession register counter movement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterValue {
    pub ingested: i64,
    pub deleted: i64,
    pub remained: i64,
}

impl RegisterValue {
    /// Movement for `count` eliminated items: nothing ingested, all deleted, remaining decreased.
    pub fn eliminated(count: u64) -> Self {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        Self {
            ingested: 0,
            deleted: count,
            remained: -count,
        }
    }
}

/// Correction of the accession register of one agency and ingest operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessionRegisterDelta {
    pub originating_agency: String,
    /// Ingest operation whose register is corrected
    pub initial_operation: String,
    /// Elimination operation applying the delta
    pub operation_id: String,
    pub total_units: RegisterValue,
    pub total_object_groups: RegisterValue,
    pub total_objects: RegisterValue,
    pub object_size: RegisterValue,
}

impl AccessionRegisterDelta {
    /// Identity under which re-application is detected.
    pub fn key(&self) -> (String, String, String) {
        (
            self.originating_agency.clone(),
            self.initial_operation.clone(),
            self.operation_id.clone(),
        )
    }
}
