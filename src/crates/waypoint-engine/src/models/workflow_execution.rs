use super::{
    decode_json, decode_optional_json, decode_optional_time, decode_status, decode_time,
    ExecutionStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Metadata key under which answered interventions accumulate
pub const HUMAN_INTERVENTIONS_KEY: &str = "human_interventions";

/// One run of a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub metadata: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// Answered interventions recorded on this run, oldest first
    pub fn human_interventions(&self) -> Vec<HumanInterventionRecord> {
        self.metadata
            .get(HUMAN_INTERVENTIONS_KEY)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl<'r> FromRow<'r, SqliteRow> for WorkflowExecution {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            status: decode_status(row, "status")?,
            input_data: decode_json(row, "input_data")?,
            output_data: decode_optional_json(row, "output_data")?,
            metadata: decode_json(row, "metadata")?,
            started_at: decode_time(row, "started_at")?,
            finished_at: decode_optional_time(row, "finished_at")?,
            updated_at: decode_time(row, "updated_at")?,
        })
    }
}

/// Audit entry appended to a run's metadata when it resumes after a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanInterventionRecord {
    pub request_id: String,
    pub node_execution_id: String,
    pub requested_at: DateTime<Utc>,
    pub responded_at: DateTime<Utc>,
    pub response_data: Value,
    pub notes: Option<String>,
}

/// Append `record` to the intervention history inside `metadata`
pub(crate) fn append_intervention(
    metadata: &mut Value,
    record: &HumanInterventionRecord,
) -> Result<(), serde_json::Error> {
    let entry = serde_json::to_value(record)?;
    if !metadata.is_object() {
        *metadata = Value::Object(Default::default());
    }
    if let Some(map) = metadata.as_object_mut() {
        let history = map
            .entry(HUMAN_INTERVENTIONS_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        match history.as_array_mut() {
            Some(items) => items.push(entry),
            None => *history = Value::Array(vec![entry]),
        }
    }
    Ok(())
}
