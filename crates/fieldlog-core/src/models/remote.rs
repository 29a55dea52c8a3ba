//! Row shape exchanged with the remote operation store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::Operation;
use crate::errors::FieldlogResult;

/// One row from a pull or the push channel. `payload` is a serialized
/// `Operation`; `updated_at` is the server arrival timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub entity: String,
    pub id: String,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RemoteRow {
    /// Build the row a remote store records for a submitted operation.
    pub fn from_operation(operation: &Operation, updated_at: DateTime<Utc>) -> FieldlogResult<Self> {
        Ok(Self {
            entity: operation.kind.entity_name().to_string(),
            id: operation.kind.entity_id(),
            payload: serde_json::to_value(operation)?,
            updated_at,
            updated_by: Some(operation.client_id.clone()),
            deleted_at: None,
        })
    }

    pub fn operation(&self) -> FieldlogResult<Operation> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Acknowledgement of a durable remote write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub operation_id: String,
    pub server_timestamp: DateTime<Utc>,
}
