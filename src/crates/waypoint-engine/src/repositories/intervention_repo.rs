//! Intervention request/response repository

use crate::error::EngineResult;
use crate::models::{
    format_timestamp, InterventionDetail, InterventionRequest, InterventionResponse,
};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

const DETAIL_SELECT: &str = "
    SELECT r.id, r.node_execution_id, r.status, r.prompt, r.context_data, r.options,
           r.priority, r.created_at, r.expires_at,
           n.workflow_execution_id, n.node_id, w.workflow_id
    FROM intervention_requests r
    JOIN node_executions n ON n.id = r.node_execution_id
    JOIN workflow_executions w ON w.id = n.workflow_execution_id";

/// Data access for `intervention_requests` and `intervention_responses`
pub struct InterventionRepository;

impl InterventionRepository {
    /// Insert a request
    pub async fn insert_request(conn: &mut SqliteConnection, request: &InterventionRequest) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO intervention_requests
                (id, node_execution_id, status, prompt, context_data, options, priority, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(&request.node_execution_id)
        .bind(request.status.as_str())
        .bind(&request.prompt)
        .bind(serde_json::to_string(&request.context_data)?)
        .bind(request.options.as_ref().map(serde_json::to_string).transpose()?)
        .bind(request.priority)
        .bind(format_timestamp(&request.created_at))
        .bind(format_timestamp(&request.expires_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Get a request by id
    pub async fn get_request(conn: &mut SqliteConnection, id: &str) -> EngineResult<Option<InterventionRequest>> {
        let request = sqlx::query_as::<_, InterventionRequest>(
            "SELECT * FROM intervention_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(request)
    }

    /// Get a request joined with its run and node
    pub async fn get_detail(conn: &mut SqliteConnection, id: &str) -> EngineResult<Option<InterventionDetail>> {
        let sql = format!("{} WHERE r.id = ?", DETAIL_SELECT);
        let detail = sqlx::query_as::<_, InterventionDetail>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(detail)
    }

    /// Open, unexpired requests: highest priority first, then oldest first
    pub async fn list_pending(conn: &mut SqliteConnection, now: DateTime<Utc>) -> EngineResult<Vec<InterventionDetail>> {
        let sql = format!(
            "{} WHERE r.status = 'PENDING' AND r.expires_at > ?
             ORDER BY r.priority DESC, r.created_at ASC, r.rowid ASC",
            DETAIL_SELECT
        );
        let pending = sqlx::query_as::<_, InterventionDetail>(&sql)
            .bind(format_timestamp(&now))
            .fetch_all(&mut *conn)
            .await?;
        Ok(pending)
    }

    /// Flip an open, unexpired request to `ANSWERED`
    pub async fn mark_answered(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> EngineResult<bool> {
        let result = sqlx::query(
            "UPDATE intervention_requests SET status = 'ANSWERED'
             WHERE id = ? AND status = 'PENDING' AND expires_at > ?",
        )
        .bind(id)
        .bind(format_timestamp(&now))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Flip every past-due open request to `EXPIRED`
    pub async fn expire_overdue(conn: &mut SqliteConnection, now: DateTime<Utc>) -> EngineResult<u64> {
        let result = sqlx::query(
            "UPDATE intervention_requests SET status = 'EXPIRED'
             WHERE status = 'PENDING' AND expires_at <= ?",
        )
        .bind(format_timestamp(&now))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Expire the open request of a node execution, if any
    pub async fn expire_pending_for_node(conn: &mut SqliteConnection, node_execution_id: &str) -> EngineResult<u64> {
        let result = sqlx::query(
            "UPDATE intervention_requests SET status = 'EXPIRED'
             WHERE node_execution_id = ? AND status = 'PENDING'",
        )
        .bind(node_execution_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Expire every open request of a run
    pub async fn expire_pending_for_execution(
        conn: &mut SqliteConnection,
        workflow_execution_id: &str,
    ) -> EngineResult<u64> {
        let result = sqlx::query(
            "UPDATE intervention_requests SET status = 'EXPIRED'
             WHERE status = 'PENDING'
               AND node_execution_id IN (
                   SELECT id FROM node_executions WHERE workflow_execution_id = ?
               )",
        )
        .bind(workflow_execution_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert a response
    pub async fn insert_response(conn: &mut SqliteConnection, response: &InterventionResponse) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO intervention_responses (id, request_id, user_id, response_data, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&response.id)
        .bind(&response.request_id)
        .bind(&response.user_id)
        .bind(serde_json::to_string(&response.response_data)?)
        .bind(&response.notes)
        .bind(format_timestamp(&response.created_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Response recorded for a request
    pub async fn get_response(
        conn: &mut SqliteConnection,
        request_id: &str,
    ) -> EngineResult<Option<InterventionResponse>> {
        let response = sqlx::query_as::<_, InterventionResponse>(
            "SELECT * FROM intervention_responses WHERE request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(response)
    }
}
