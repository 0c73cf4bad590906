use super::{decode_json, decode_optional_json, decode_status, decode_time, InterventionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Priority used when none is given
pub const DEFAULT_PRIORITY: i64 = 1;

/// Minutes until a request expires when no expiry is given
pub const DEFAULT_EXPIRES_IN_MINUTES: i64 = 60;

/// A question put to a human on behalf of a paused node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRequest {
    pub id: String,
    pub node_execution_id: String,
    pub status: InterventionStatus,
    pub prompt: String,
    pub context_data: Value,
    pub options: Option<Value>,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl InterventionRequest {
    /// Whether the request can no longer be answered at `at`
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at <= at
    }

    /// Status as observed at `at`: a past-due `PENDING` request reads as
    /// `EXPIRED` even before anything rewrites the row
    pub fn status_at(&self, at: DateTime<Utc>) -> InterventionStatus {
        match self.status {
            InterventionStatus::Pending if self.is_expired_at(at) => InterventionStatus::Expired,
            status => status,
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for InterventionRequest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            node_execution_id: row.try_get("node_execution_id")?,
            status: decode_status(row, "status")?,
            prompt: row.try_get("prompt")?,
            context_data: decode_json(row, "context_data")?,
            options: decode_optional_json(row, "options")?,
            priority: row.try_get("priority")?,
            created_at: decode_time(row, "created_at")?,
            expires_at: decode_time(row, "expires_at")?,
        })
    }
}

/// A request together with the run and node it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionDetail {
    #[serde(flatten)]
    pub request: InterventionRequest,
    pub workflow_execution_id: String,
    pub workflow_id: String,
    pub node_id: String,
}

impl<'r> FromRow<'r, SqliteRow> for InterventionDetail {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            request: InterventionRequest::from_row(row)?,
            workflow_execution_id: row.try_get("workflow_execution_id")?,
            workflow_id: row.try_get("workflow_id")?,
            node_id: row.try_get("node_id")?,
        })
    }
}

/// A human's answer; immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionResponse {
    pub id: String,
    pub request_id: String,
    pub user_id: String,
    pub response_data: Value,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for InterventionResponse {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            user_id: row.try_get("user_id")?,
            response_data: decode_json(row, "response_data")?,
            notes: row.try_get("notes")?,
            created_at: decode_time(row, "created_at")?,
        })
    }
}

/// Parameters of a new intervention request
#[derive(Debug, Clone, PartialEq)]
pub struct NewInterventionRequest {
    pub node_execution_id: String,
    pub prompt: String,
    pub context_data: Value,
    pub options: Option<Value>,
    pub priority: i64,
    pub expires_in_minutes: i64,
}

impl NewInterventionRequest {
    /// Request with empty context and default priority and expiry
    pub fn new(node_execution_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            node_execution_id: node_execution_id.into(),
            prompt: prompt.into(),
            context_data: Value::Object(Default::default()),
            options: None,
            priority: DEFAULT_PRIORITY,
            expires_in_minutes: DEFAULT_EXPIRES_IN_MINUTES,
        }
    }

    pub fn with_context(mut self, context_data: Value) -> Self {
        self.context_data = context_data;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_expires_in_minutes(mut self, minutes: i64) -> Self {
        self.expires_in_minutes = minutes;
        self
    }
}
