use super::{
    decode_json, decode_optional_json, decode_optional_time, decode_status, decode_time, NodeStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// One invocation attempt of a node within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: String,
    pub workflow_execution_id: String,
    pub node_id: String,
    pub status: NodeStatus,
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Successor the node routed to explicitly, `END` included
    pub next_node_id: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for NodeExecution {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_execution_id: row.try_get("workflow_execution_id")?,
            node_id: row.try_get("node_id")?,
            status: decode_status(row, "status")?,
            input_data: decode_json(row, "input_data")?,
            output_data: decode_optional_json(row, "output_data")?,
            error: row.try_get("error")?,
            started_at: decode_time(row, "started_at")?,
            finished_at: decode_optional_time(row, "finished_at")?,
            next_node_id: row.try_get("next_node_id")?,
        })
    }
}
