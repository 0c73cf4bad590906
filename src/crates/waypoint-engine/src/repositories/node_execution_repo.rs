//! Node execution repository

use super::placeholders;
use crate::error::EngineResult;
use crate::models::{format_timestamp, NodeExecution, NodeStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqliteConnection;

/// Data access for `node_executions`
pub struct NodeExecutionRepository;

impl NodeExecutionRepository {
    /// Insert a node execution
    pub async fn insert(conn: &mut SqliteConnection, node: &NodeExecution) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO node_executions
                (id, workflow_execution_id, node_id, status, input_data, output_data, error, started_at, finished_at,
                 next_node_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&node.id)
        .bind(&node.workflow_execution_id)
        .bind(&node.node_id)
        .bind(node.status.as_str())
        .bind(serde_json::to_string(&node.input_data)?)
        .bind(node.output_data.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&node.error)
        .bind(format_timestamp(&node.started_at))
        .bind(node.finished_at.as_ref().map(format_timestamp))
        .bind(&node.next_node_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Get a node execution by id
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> EngineResult<Option<NodeExecution>> {
        let node = sqlx::query_as::<_, NodeExecution>("SELECT * FROM node_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(node)
    }

    /// All node executions of a run in start order
    pub async fn list_by_execution(
        conn: &mut SqliteConnection,
        workflow_execution_id: &str,
    ) -> EngineResult<Vec<NodeExecution>> {
        let nodes = sqlx::query_as::<_, NodeExecution>(
            "SELECT * FROM node_executions WHERE workflow_execution_id = ?
             ORDER BY started_at ASC, rowid ASC",
        )
        .bind(workflow_execution_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(nodes)
    }

    /// The checkpoint of a run: its most recently finished `COMPLETED` node
    pub async fn latest_completed(
        conn: &mut SqliteConnection,
        workflow_execution_id: &str,
    ) -> EngineResult<Option<NodeExecution>> {
        let node = sqlx::query_as::<_, NodeExecution>(
            "SELECT * FROM node_executions
             WHERE workflow_execution_id = ? AND status = 'COMPLETED'
             ORDER BY finished_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(workflow_execution_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(node)
    }

    /// Move a node to a non-terminal status if its current status allows it
    pub async fn set_status(conn: &mut SqliteConnection, id: &str, to: NodeStatus) -> EngineResult<bool> {
        debug_assert!(!to.is_terminal());
        let sources = NodeStatus::sources_for(to);
        let sql = format!(
            "UPDATE node_executions SET status = ? WHERE id = ? AND status IN ({})",
            placeholders(sources.len())
        );

        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(id);
        for source in &sources {
            query = query.bind(source.as_str());
        }
        Ok(query.execute(&mut *conn).await?.rows_affected() == 1)
    }

    /// Mark a running node of the given run `PAUSED`
    pub async fn pause(
        conn: &mut SqliteConnection,
        id: &str,
        workflow_execution_id: &str,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            "UPDATE node_executions SET status = 'PAUSED'
             WHERE id = ? AND workflow_execution_id = ? AND status = 'RUNNING'",
        )
        .bind(id)
        .bind(workflow_execution_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a node `COMPLETED` with the output it produced and the successor
    /// it routed to, if it chose one
    pub async fn complete(
        conn: &mut SqliteConnection,
        id: &str,
        output: &Value,
        next_node_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let sources = NodeStatus::sources_for(NodeStatus::Completed);
        let sql = format!(
            "UPDATE node_executions SET status = 'COMPLETED', output_data = ?, next_node_id = ?, finished_at = ?
             WHERE id = ? AND status IN ({})",
            placeholders(sources.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(serde_json::to_string(output)?)
            .bind(next_node_id)
            .bind(format_timestamp(&now))
            .bind(id);
        for source in &sources {
            query = query.bind(source.as_str());
        }
        Ok(query.execute(&mut *conn).await?.rows_affected() == 1)
    }

    /// Mark a suspended node `COMPLETED`, keeping the output recorded for it
    ///
    /// A node resumed without a recorded response passes its input through.
    /// A `RUNNING` node is still owned by its traversal and is left alone.
    pub async fn complete_suspended(
        conn: &mut SqliteConnection,
        id: &str,
        workflow_execution_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let sources = [NodeStatus::Paused, NodeStatus::WaitingForHuman, NodeStatus::Resuming];
        let sql = format!(
            "UPDATE node_executions
             SET status = 'COMPLETED', output_data = COALESCE(output_data, input_data), finished_at = ?
             WHERE id = ? AND workflow_execution_id = ? AND status IN ({})",
            placeholders(sources.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(format_timestamp(&now))
            .bind(id)
            .bind(workflow_execution_id);
        for source in &sources {
            query = query.bind(source.as_str());
        }
        Ok(query.execute(&mut *conn).await?.rows_affected() == 1)
    }

    /// Record a human response as the node's output and mark it `RESUMING`
    pub async fn record_response(conn: &mut SqliteConnection, id: &str, output: &Value) -> EngineResult<bool> {
        let result = sqlx::query(
            "UPDATE node_executions SET status = 'RESUMING', output_data = ?
             WHERE id = ? AND status = 'WAITING_FOR_HUMAN'",
        )
        .bind(serde_json::to_string(output)?)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fail every node of a run whose status is one of `statuses`
    pub async fn fail_where_status(
        conn: &mut SqliteConnection,
        workflow_execution_id: &str,
        statuses: &[NodeStatus],
        error: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE node_executions SET status = 'FAILED', error = ?, finished_at = ?
             WHERE workflow_execution_id = ? AND status IN ({})",
            placeholders(statuses.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(error)
            .bind(format_timestamp(&now))
            .bind(workflow_execution_id);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }
}
