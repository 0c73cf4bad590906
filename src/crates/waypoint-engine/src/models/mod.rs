//! Persistent records
//!
//! Records are decoded straight from SQLite rows. JSON payloads are stored as
//! TEXT and timestamps as fixed-width UTC RFC3339 strings with microsecond
//! precision, so that string order equals time order inside SQL.

mod intervention;
mod node_execution;
mod status;
mod workflow_execution;

pub use intervention::{
    InterventionDetail, InterventionRequest, InterventionResponse, NewInterventionRequest,
    DEFAULT_EXPIRES_IN_MINUTES, DEFAULT_PRIORITY,
};
pub use node_execution::NodeExecution;
pub use status::{ExecutionStatus, InterventionStatus, NodeStatus, ParseStatusError};
pub(crate) use workflow_execution::append_intervention;
pub use workflow_execution::{HumanInterventionRecord, WorkflowExecution, HUMAN_INTERVENTIONS_KEY};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Current time truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

/// Stored representation of a timestamp
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

fn column_error(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

pub(crate) fn decode_json(row: &SqliteRow, column: &str) -> Result<Value, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| column_error(column, e))
}

pub(crate) fn decode_optional_json(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Value>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| serde_json::from_str(&raw).map_err(|e| column_error(column, e)))
        .transpose()
}

pub(crate) fn decode_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse_timestamp(&raw).map_err(|e| column_error(column, e))
}

pub(crate) fn decode_optional_time(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| parse_timestamp(&raw).map_err(|e| column_error(column, e)))
        .transpose()
}

pub(crate) fn decode_status<S>(row: &SqliteRow, column: &str) -> Result<S, sqlx::Error>
where
    S: FromStr<Err = ParseStatusError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| column_error(column, e))
}
