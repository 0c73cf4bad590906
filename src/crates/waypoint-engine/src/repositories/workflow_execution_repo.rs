//! Workflow execution repository

use super::placeholders;
use crate::error::EngineResult;
use crate::models::{format_timestamp, ExecutionStatus, WorkflowExecution};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqliteConnection;

/// Data access for `workflow_executions`
pub struct WorkflowExecutionRepository;

impl WorkflowExecutionRepository {
    /// Insert a new run
    pub async fn insert(conn: &mut SqliteConnection, execution: &WorkflowExecution) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO workflow_executions
                (id, workflow_id, status, input_data, output_data, metadata, started_at, finished_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(execution.status.as_str())
        .bind(serde_json::to_string(&execution.input_data)?)
        .bind(execution.output_data.as_ref().map(serde_json::to_string).transpose()?)
        .bind(serde_json::to_string(&execution.metadata)?)
        .bind(format_timestamp(&execution.started_at))
        .bind(execution.finished_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&execution.updated_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Get a run by id
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> EngineResult<Option<WorkflowExecution>> {
        let execution = sqlx::query_as::<_, WorkflowExecution>(
            "SELECT * FROM workflow_executions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(execution)
    }

    /// Most recent runs first, optionally filtered by status
    pub async fn list(
        conn: &mut SqliteConnection,
        status: Option<ExecutionStatus>,
        limit: i64,
    ) -> EngineResult<Vec<WorkflowExecution>> {
        let executions = match status {
            Some(status) => {
                sqlx::query_as::<_, WorkflowExecution>(
                    "SELECT * FROM workflow_executions WHERE status = ?
                     ORDER BY started_at DESC, rowid DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query_as::<_, WorkflowExecution>(
                    "SELECT * FROM workflow_executions ORDER BY started_at DESC, rowid DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&mut *conn)
                .await?
            }
        };
        Ok(executions)
    }

    /// Move a run from one of `from` to `to`
    ///
    /// Sources that cannot legally reach `to` are ignored.
    pub async fn transition(
        conn: &mut SqliteConnection,
        id: &str,
        from: &[ExecutionStatus],
        to: ExecutionStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let sources: Vec<ExecutionStatus> = from
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(to))
            .collect();
        if sources.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "UPDATE workflow_executions SET status = ?, updated_at = ?
             WHERE id = ? AND status IN ({})",
            placeholders(sources.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(format_timestamp(&now))
            .bind(id);
        for source in &sources {
            query = query.bind(source.as_str());
        }

        Ok(query.execute(&mut *conn).await?.rows_affected() == 1)
    }

    /// Move a run to a terminal status, recording its output
    pub async fn finish(
        conn: &mut SqliteConnection,
        id: &str,
        to: ExecutionStatus,
        output: Option<&Value>,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        Self::finish_from(conn, id, &ExecutionStatus::sources_for(to), to, output, now).await
    }

    /// Move a run from one of `sources` to a terminal status
    ///
    /// Unlike [`finish`](Self::finish), `sources` are taken as given.
    pub async fn finish_from(
        conn: &mut SqliteConnection,
        id: &str,
        sources: &[ExecutionStatus],
        to: ExecutionStatus,
        output: Option<&Value>,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        debug_assert!(to.is_terminal());
        if sources.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "UPDATE workflow_executions
             SET status = ?, output_data = COALESCE(?, output_data), finished_at = ?, updated_at = ?
             WHERE id = ? AND status IN ({})",
            placeholders(sources.len())
        );

        let stamp = format_timestamp(&now);
        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(output.map(serde_json::to_string).transpose()?)
            .bind(&stamp)
            .bind(&stamp)
            .bind(id);
        for source in sources {
            query = query.bind(source.as_str());
        }

        Ok(query.execute(&mut *conn).await?.rows_affected() == 1)
    }

    /// Replace a run's metadata
    pub async fn update_metadata(
        conn: &mut SqliteConnection,
        id: &str,
        metadata: &Value,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        sqlx::query("UPDATE workflow_executions SET metadata = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(metadata)?)
            .bind(format_timestamp(&now))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
