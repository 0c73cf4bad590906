//! Checkpoint store
//!
//! The durable record of runs, node invocations and interventions. Every
//! method that changes more than one row runs in a single transaction, and
//! every status change is conditional on the current status, so concurrent
//! callers observe a transition at most once.
//!
//! Transactions issue a write before any read. SQLite's deferred transactions
//! cannot upgrade a read snapshot that another writer has since invalidated,
//! while a first write simply waits for the lock.

use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    self, append_intervention, ExecutionStatus, HumanInterventionRecord, InterventionDetail,
    InterventionRequest, InterventionResponse, InterventionStatus, NewInterventionRequest,
    NodeExecution, NodeStatus, WorkflowExecution,
};
use crate::repositories::{
    InterventionRepository, NodeExecutionRepository, WorkflowExecutionRepository,
};
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Node statuses that mean "not finished"
const ACTIVE_NODE_STATUSES: &[NodeStatus] = &[
    NodeStatus::Running,
    NodeStatus::Paused,
    NodeStatus::WaitingForHuman,
    NodeStatus::Resuming,
];

/// Durable state behind the controller and the intervention manager
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Record a new run in `CREATED`
    async fn create_execution(&self, workflow_id: &str, input: Value) -> EngineResult<WorkflowExecution>;

    /// Get a run
    async fn get_execution(&self, id: &str) -> EngineResult<Option<WorkflowExecution>>;

    /// Most recent runs first
    async fn list_executions(
        &self,
        status: Option<ExecutionStatus>,
        limit: i64,
    ) -> EngineResult<Vec<WorkflowExecution>>;

    /// Move a run from one of `from` to `to`; false when the run is elsewhere
    async fn transition_execution(
        &self,
        id: &str,
        from: &[ExecutionStatus],
        to: ExecutionStatus,
    ) -> EngineResult<bool>;

    /// Move a run to a terminal status. When `node_error` is given, nodes
    /// still `RUNNING` are failed with it in the same transaction.
    async fn finish_execution(
        &self,
        id: &str,
        to: ExecutionStatus,
        output: Option<Value>,
        node_error: Option<String>,
    ) -> EngineResult<bool>;

    /// `PAUSED` run to a terminal status, for a traversal that ended after
    /// the run was paused from outside. When `node_error` is given, nodes
    /// still `RUNNING` or `PAUSED` are failed with it. Open requests of the
    /// run expire.
    async fn settle_paused_execution(
        &self,
        id: &str,
        to: ExecutionStatus,
        output: Option<Value>,
        node_error: Option<String>,
    ) -> EngineResult<bool>;

    /// `RUNNING`/`CREATED` run to `PAUSED`, and the named running node of
    /// that run to `PAUSED`
    async fn pause_execution(&self, id: &str, node_execution_id: Option<&str>) -> EngineResult<bool>;

    /// `PAUSED` run to `RUNNING`, completing the suspended node and appending
    /// `record` to the run's intervention history
    async fn resume_execution(
        &self,
        id: &str,
        node_execution_id: &str,
        record: Option<HumanInterventionRecord>,
    ) -> EngineResult<bool>;

    /// Non-terminal run to `CANCELLED`, failing its unfinished nodes and
    /// expiring its open requests
    async fn cancel_execution(&self, id: &str) -> EngineResult<bool>;

    /// Record a node invocation in `RUNNING`
    async fn start_node(&self, workflow_execution_id: &str, node_id: &str, input: Value) -> EngineResult<NodeExecution>;

    /// Mark a node `COMPLETED` with its output and the successor it routed
    /// to explicitly, if any
    async fn complete_node(
        &self,
        node_execution_id: &str,
        output: &Value,
        next_node_id: Option<&str>,
    ) -> EngineResult<bool>;

    /// Fail nodes left `RUNNING` by an interrupted traversal
    async fn abandon_running_nodes(&self, workflow_execution_id: &str, reason: &str) -> EngineResult<u64>;

    /// Get a node execution
    async fn get_node(&self, node_execution_id: &str) -> EngineResult<Option<NodeExecution>>;

    /// Node executions of a run in start order
    async fn list_nodes(&self, workflow_execution_id: &str) -> EngineResult<Vec<NodeExecution>>;

    /// Most recently finished `COMPLETED` node of a run
    async fn latest_completed_node(&self, workflow_execution_id: &str) -> EngineResult<Option<NodeExecution>>;

    /// Open a request for a node execution, moving it to `WAITING_FOR_HUMAN`
    async fn create_intervention(&self, request: NewInterventionRequest) -> EngineResult<InterventionRequest>;

    /// Get a request with its run and node
    async fn get_intervention(&self, id: &str) -> EngineResult<Option<InterventionDetail>>;

    /// Open, unexpired requests in queue order
    async fn pending_interventions(&self) -> EngineResult<Vec<InterventionDetail>>;

    /// Answer an open, unexpired request; `None` when there is none
    async fn submit_response(
        &self,
        request_id: &str,
        user_id: &str,
        response_data: Value,
        notes: Option<String>,
    ) -> EngineResult<Option<InterventionResponse>>;

    /// Response recorded for a request
    async fn get_response(&self, request_id: &str) -> EngineResult<Option<InterventionResponse>>;

    /// Flip past-due open requests to `EXPIRED`
    async fn expire_overdue(&self) -> EngineResult<u64>;
}

/// [`CheckpointStore`] on SQLite
#[derive(Clone, Debug)]
pub struct SqliteCheckpointStore {
    db: Database,
}

impl SqliteCheckpointStore {
    /// Wrap an opened, migrated database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn create_execution(&self, workflow_id: &str, input: Value) -> EngineResult<WorkflowExecution> {
        let now = models::now();
        let execution = WorkflowExecution {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: ExecutionStatus::Created,
            input_data: input,
            output_data: None,
            metadata: Value::Object(Default::default()),
            started_at: now,
            finished_at: None,
            updated_at: now,
        };

        let mut conn = self.db.pool().acquire().await?;
        WorkflowExecutionRepository::insert(&mut conn, &execution).await?;
        debug!(execution_id = %execution.id, workflow_id = %workflow_id, "Workflow execution created");
        Ok(execution)
    }

    async fn get_execution(&self, id: &str) -> EngineResult<Option<WorkflowExecution>> {
        let mut conn = self.db.pool().acquire().await?;
        WorkflowExecutionRepository::get_by_id(&mut conn, id).await
    }

    async fn list_executions(
        &self,
        status: Option<ExecutionStatus>,
        limit: i64,
    ) -> EngineResult<Vec<WorkflowExecution>> {
        let mut conn = self.db.pool().acquire().await?;
        WorkflowExecutionRepository::list(&mut conn, status, limit).await
    }

    async fn transition_execution(
        &self,
        id: &str,
        from: &[ExecutionStatus],
        to: ExecutionStatus,
    ) -> EngineResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        WorkflowExecutionRepository::transition(&mut conn, id, from, to, models::now()).await
    }

    async fn finish_execution(
        &self,
        id: &str,
        to: ExecutionStatus,
        output: Option<Value>,
        node_error: Option<String>,
    ) -> EngineResult<bool> {
        if !to.is_terminal() {
            return Err(EngineError::InvalidInput(format!("{} is not a terminal status", to)));
        }
        let now = models::now();
        let mut tx = self.db.pool().begin().await?;

        if !WorkflowExecutionRepository::finish(&mut tx, id, to, output.as_ref(), now).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(error) = node_error {
            NodeExecutionRepository::fail_where_status(&mut tx, id, &[NodeStatus::Running], &error, now)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn settle_paused_execution(
        &self,
        id: &str,
        to: ExecutionStatus,
        output: Option<Value>,
        node_error: Option<String>,
    ) -> EngineResult<bool> {
        if !to.is_terminal() {
            return Err(EngineError::InvalidInput(format!("{} is not a terminal status", to)));
        }
        let now = models::now();
        let mut tx = self.db.pool().begin().await?;

        if !WorkflowExecutionRepository::finish_from(&mut tx, id, &[ExecutionStatus::Paused], to, output.as_ref(), now)
            .await?
        {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(error) = node_error {
            NodeExecutionRepository::fail_where_status(
                &mut tx,
                id,
                &[NodeStatus::Running, NodeStatus::Paused],
                &error,
                now,
            )
            .await?;
        }
        InterventionRepository::expire_pending_for_execution(&mut tx, id).await?;

        tx.commit().await?;
        debug!(execution_id = %id, status = %to, "Paused workflow execution settled");
        Ok(true)
    }

    async fn pause_execution(&self, id: &str, node_execution_id: Option<&str>) -> EngineResult<bool> {
        let now = models::now();
        let mut tx = self.db.pool().begin().await?;

        let paused = WorkflowExecutionRepository::transition(
            &mut tx,
            id,
            &[ExecutionStatus::Created, ExecutionStatus::Running],
            ExecutionStatus::Paused,
            now,
        )
        .await?;
        if !paused {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(node_execution_id) = node_execution_id {
            if !NodeExecutionRepository::pause(&mut tx, node_execution_id, id).await? {
                warn!(
                    execution_id = %id,
                    node_execution_id = %node_execution_id,
                    "Node execution is not running in this workflow execution; only the run was paused"
                );
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn resume_execution(
        &self,
        id: &str,
        node_execution_id: &str,
        record: Option<HumanInterventionRecord>,
    ) -> EngineResult<bool> {
        let now = models::now();
        let mut tx = self.db.pool().begin().await?;

        let resumed = WorkflowExecutionRepository::transition(
            &mut tx,
            id,
            &[ExecutionStatus::Paused],
            ExecutionStatus::Running,
            now,
        )
        .await?;
        if !resumed {
            tx.rollback().await?;
            return Ok(false);
        }

        if !NodeExecutionRepository::complete_suspended(&mut tx, node_execution_id, id, now).await? {
            let already_completed = NodeExecutionRepository::get_by_id(&mut tx, node_execution_id)
                .await?
                .map(|n| n.workflow_execution_id == id && n.status == NodeStatus::Completed)
                .unwrap_or(false);
            if !already_completed {
                tx.rollback().await?;
                return Ok(false);
            }
        }
        InterventionRepository::expire_pending_for_node(&mut tx, node_execution_id).await?;

        if let Some(record) = record {
            let mut metadata = WorkflowExecutionRepository::get_by_id(&mut tx, id)
                .await?
                .map(|e| e.metadata)
                .unwrap_or_else(|| Value::Object(Default::default()));
            append_intervention(&mut metadata, &record)?;
            WorkflowExecutionRepository::update_metadata(&mut tx, id, &metadata, now).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn cancel_execution(&self, id: &str) -> EngineResult<bool> {
        let now = models::now();
        let mut tx = self.db.pool().begin().await?;

        if !WorkflowExecutionRepository::finish(&mut tx, id, ExecutionStatus::Cancelled, None, now).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        NodeExecutionRepository::fail_where_status(&mut tx, id, ACTIVE_NODE_STATUSES, "cancelled", now)
            .await?;
        InterventionRepository::expire_pending_for_execution(&mut tx, id).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn start_node(&self, workflow_execution_id: &str, node_id: &str, input: Value) -> EngineResult<NodeExecution> {
        let node = NodeExecution {
            id: Uuid::new_v4().to_string(),
            workflow_execution_id: workflow_execution_id.to_string(),
            node_id: node_id.to_string(),
            status: NodeStatus::Running,
            input_data: input,
            output_data: None,
            error: None,
            started_at: models::now(),
            finished_at: None,
            next_node_id: None,
        };

        let mut conn = self.db.pool().acquire().await?;
        NodeExecutionRepository::insert(&mut conn, &node).await?;
        Ok(node)
    }

    async fn complete_node(
        &self,
        node_execution_id: &str,
        output: &Value,
        next_node_id: Option<&str>,
    ) -> EngineResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        NodeExecutionRepository::complete(&mut conn, node_execution_id, output, next_node_id, models::now()).await
    }

    async fn abandon_running_nodes(&self, workflow_execution_id: &str, reason: &str) -> EngineResult<u64> {
        let mut conn = self.db.pool().acquire().await?;
        NodeExecutionRepository::fail_where_status(
            &mut conn,
            workflow_execution_id,
            &[NodeStatus::Running],
            reason,
            models::now(),
        )
        .await
    }

    async fn get_node(&self, node_execution_id: &str) -> EngineResult<Option<NodeExecution>> {
        let mut conn = self.db.pool().acquire().await?;
        NodeExecutionRepository::get_by_id(&mut conn, node_execution_id).await
    }

    async fn list_nodes(&self, workflow_execution_id: &str) -> EngineResult<Vec<NodeExecution>> {
        let mut conn = self.db.pool().acquire().await?;
        NodeExecutionRepository::list_by_execution(&mut conn, workflow_execution_id).await
    }

    async fn latest_completed_node(&self, workflow_execution_id: &str) -> EngineResult<Option<NodeExecution>> {
        let mut conn = self.db.pool().acquire().await?;
        NodeExecutionRepository::latest_completed(&mut conn, workflow_execution_id).await
    }

    async fn create_intervention(&self, request: NewInterventionRequest) -> EngineResult<InterventionRequest> {
        if request.expires_in_minutes < 0 {
            return Err(EngineError::InvalidInput(format!(
                "expires_in_minutes must not be negative (got {})",
                request.expires_in_minutes
            )));
        }

        let now = models::now();
        let mut tx = self.db.pool().begin().await?;

        let waiting = NodeExecutionRepository::set_status(
            &mut tx,
            &request.node_execution_id,
            NodeStatus::WaitingForHuman,
        )
        .await?;
        if !waiting {
            match NodeExecutionRepository::get_by_id(&mut tx, &request.node_execution_id).await? {
                None => {
                    tx.rollback().await?;
                    return Err(EngineError::not_found("NodeExecution", &request.node_execution_id));
                }
                Some(node) if node.status != NodeStatus::WaitingForHuman => {
                    tx.rollback().await?;
                    return Err(EngineError::invalid_state(
                        "NodeExecution",
                        &request.node_execution_id,
                        node.status,
                        NodeStatus::WaitingForHuman,
                    ));
                }
                Some(_) => {}
            }
        }

        let created = InterventionRequest {
            id: Uuid::new_v4().to_string(),
            node_execution_id: request.node_execution_id,
            status: InterventionStatus::Pending,
            prompt: request.prompt,
            context_data: request.context_data,
            options: request.options,
            priority: request.priority,
            created_at: now,
            expires_at: now + Duration::minutes(request.expires_in_minutes),
        };
        InterventionRepository::insert_request(&mut tx, &created).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_intervention(&self, id: &str) -> EngineResult<Option<InterventionDetail>> {
        let mut conn = self.db.pool().acquire().await?;
        InterventionRepository::get_detail(&mut conn, id).await
    }

    async fn pending_interventions(&self) -> EngineResult<Vec<InterventionDetail>> {
        let mut conn = self.db.pool().acquire().await?;
        InterventionRepository::list_pending(&mut conn, models::now()).await
    }

    async fn submit_response(
        &self,
        request_id: &str,
        user_id: &str,
        response_data: Value,
        notes: Option<String>,
    ) -> EngineResult<Option<InterventionResponse>> {
        let now = models::now();
        let mut tx = self.db.pool().begin().await?;

        if !InterventionRepository::mark_answered(&mut tx, request_id, now).await? {
            tx.rollback().await?;
            return Ok(None);
        }
        let Some(request) = InterventionRepository::get_request(&mut tx, request_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        let response = InterventionResponse {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            response_data,
            notes,
            created_at: now,
        };
        InterventionRepository::insert_response(&mut tx, &response).await?;

        if !NodeExecutionRepository::record_response(
            &mut tx,
            &request.node_execution_id,
            &response.response_data,
        )
        .await?
        {
            warn!(
                request_id = %request_id,
                node_execution_id = %request.node_execution_id,
                "Node execution was not waiting for a human; response recorded without node output"
            );
        }

        tx.commit().await?;
        Ok(Some(response))
    }

    async fn get_response(&self, request_id: &str) -> EngineResult<Option<InterventionResponse>> {
        let mut conn = self.db.pool().acquire().await?;
        InterventionRepository::get_response(&mut conn, request_id).await
    }

    async fn expire_overdue(&self) -> EngineResult<u64> {
        let mut conn = self.db.pool().acquire().await?;
        InterventionRepository::expire_overdue(&mut conn, models::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteCheckpointStore {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        SqliteCheckpointStore::new(db)
    }

    #[tokio::test]
    async fn test_create_and_get_execution() {
        let store = store().await;
        let created = store.create_execution("wf", json!({"x": 1})).await.unwrap();
        let fetched = store.get_execution(&created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.status, ExecutionStatus::Created);
        assert!(store.get_execution("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_refuses_illegal_moves() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();

        assert!(!store
            .transition_execution(&run.id, &[ExecutionStatus::Paused], ExecutionStatus::Running)
            .await
            .unwrap());
        assert!(store
            .transition_execution(&run.id, &[ExecutionStatus::Created], ExecutionStatus::Running)
            .await
            .unwrap());
        assert!(store
            .finish_execution(&run.id, ExecutionStatus::Completed, Some(json!(1)), None)
            .await
            .unwrap());
        // Terminal: nothing moves it any more.
        assert!(!store
            .transition_execution(&run.id, ExecutionStatus::ALL, ExecutionStatus::Running)
            .await
            .unwrap());
        assert!(!store.cancel_execution(&run.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_finish_fails_running_nodes() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();
        store
            .transition_execution(&run.id, &[ExecutionStatus::Created], ExecutionStatus::Running)
            .await
            .unwrap();
        let done = store.start_node(&run.id, "a", json!({})).await.unwrap();
        store.complete_node(&done.id, &json!({"a": 1}), None).await.unwrap();
        let stuck = store.start_node(&run.id, "b", json!({"a": 1})).await.unwrap();

        store
            .finish_execution(&run.id, ExecutionStatus::Failed, Some(json!({"error": "boom"})), Some("boom".into()))
            .await
            .unwrap();

        let nodes = store.list_nodes(&run.id).await.unwrap();
        assert_eq!(nodes[0].status, NodeStatus::Completed);
        assert_eq!(nodes[1].id, stuck.id);
        assert_eq!(nodes[1].status, NodeStatus::Failed);
        assert_eq!(nodes[1].error.as_deref(), Some("boom"));
        assert!(nodes[1].finished_at.is_some());
    }

    #[tokio::test]
    async fn test_settle_paused_run_fails_open_nodes() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();
        store
            .transition_execution(&run.id, &[ExecutionStatus::Created], ExecutionStatus::Running)
            .await
            .unwrap();
        let node = store.start_node(&run.id, "a", json!({})).await.unwrap();
        assert!(store.pause_execution(&run.id, Some(&node.id)).await.unwrap());

        // The regular path only finishes a running run.
        assert!(!store
            .finish_execution(&run.id, ExecutionStatus::Failed, None, Some("kaput".into()))
            .await
            .unwrap());
        assert!(store
            .settle_paused_execution(
                &run.id,
                ExecutionStatus::Failed,
                Some(json!({"error": "kaput"})),
                Some("kaput".into()),
            )
            .await
            .unwrap());

        let run_after = store.get_execution(&run.id).await.unwrap().unwrap();
        assert_eq!(run_after.status, ExecutionStatus::Failed);
        assert_eq!(run_after.output_data, Some(json!({"error": "kaput"})));
        let node_after = store.get_node(&node.id).await.unwrap().unwrap();
        assert_eq!(node_after.status, NodeStatus::Failed);
        assert_eq!(node_after.error.as_deref(), Some("kaput"));

        assert!(!store
            .settle_paused_execution(&run.id, ExecutionStatus::Error, None, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_completion_keeps_chosen_successor() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();
        let routed = store.start_node(&run.id, "a", json!({})).await.unwrap();
        assert!(store.complete_node(&routed.id, &json!({"a": 1}), Some("c")).await.unwrap());

        let checkpoint = store.latest_completed_node(&run.id).await.unwrap().unwrap();
        assert_eq!(checkpoint.id, routed.id);
        assert_eq!(checkpoint.next_node_id.as_deref(), Some("c"));

        let plain = store.start_node(&run.id, "c", json!({"a": 1})).await.unwrap();
        assert!(store.complete_node(&plain.id, &json!({"c": 1}), None).await.unwrap());
        assert_eq!(store.get_node(&plain.id).await.unwrap().unwrap().next_node_id, None);
    }

    #[tokio::test]
    async fn test_intervention_lifecycle() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();
        store
            .transition_execution(&run.id, &[ExecutionStatus::Created], ExecutionStatus::Running)
            .await
            .unwrap();
        let node = store.start_node(&run.id, "review", json!({"draft": "v1"})).await.unwrap();
        assert!(store.pause_execution(&run.id, Some(&node.id)).await.unwrap());

        let request = store
            .create_intervention(
                NewInterventionRequest::new(&node.id, "Approve?").with_context(json!({"draft": "v1"})),
            )
            .await
            .unwrap();
        assert_eq!(
            store.get_node(&node.id).await.unwrap().unwrap().status,
            NodeStatus::WaitingForHuman
        );

        let response = store
            .submit_response(&request.id, "alice", json!({"approved": true}), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.user_id, "alice");

        let node_after = store.get_node(&node.id).await.unwrap().unwrap();
        assert_eq!(node_after.status, NodeStatus::Resuming);
        assert_eq!(node_after.output_data, Some(json!({"approved": true})));

        // A second answer is refused and creates nothing.
        assert!(store
            .submit_response(&request.id, "bob", json!({"approved": false}), None)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.get_response(&request.id).await.unwrap().unwrap().user_id,
            "alice"
        );
    }

    #[tokio::test]
    async fn test_create_intervention_for_missing_node() {
        let store = store().await;
        let err = store
            .create_intervention(NewInterventionRequest::new("nope", "Approve?"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_resume_completes_node_and_records_history() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();
        let node = store.start_node(&run.id, "review", json!({"in": 1})).await.unwrap();
        store.pause_execution(&run.id, Some(&node.id)).await.unwrap();

        let at = models::now();
        let record = HumanInterventionRecord {
            request_id: "req".into(),
            node_execution_id: node.id.clone(),
            requested_at: at,
            responded_at: at,
            response_data: json!({"ok": true}),
            notes: Some("looks good".into()),
        };
        assert!(store.resume_execution(&run.id, &node.id, Some(record.clone())).await.unwrap());

        let run_after = store.get_execution(&run.id).await.unwrap().unwrap();
        assert_eq!(run_after.status, ExecutionStatus::Running);
        assert_eq!(run_after.human_interventions(), vec![record]);

        let node_after = store.get_node(&node.id).await.unwrap().unwrap();
        assert_eq!(node_after.status, NodeStatus::Completed);
        // No response was recorded on the node, so its input passes through.
        assert_eq!(node_after.output_data, Some(json!({"in": 1})));

        // Only a paused run resumes.
        assert!(!store.resume_execution(&run.id, &node.id, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_resume_leaves_running_node_alone() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();
        store
            .transition_execution(&run.id, &[ExecutionStatus::Created], ExecutionStatus::Running)
            .await
            .unwrap();
        let node = store.start_node(&run.id, "a", json!({"in": 1})).await.unwrap();
        assert!(store.pause_execution(&run.id, None).await.unwrap());

        assert!(!store.resume_execution(&run.id, &node.id, None).await.unwrap());
        assert_eq!(
            store.get_execution(&run.id).await.unwrap().unwrap().status,
            ExecutionStatus::Paused
        );
        let node_after = store.get_node(&node.id).await.unwrap().unwrap();
        assert_eq!(node_after.status, NodeStatus::Running);
        assert_eq!(node_after.output_data, None);
    }

    #[tokio::test]
    async fn test_cancel_cleans_up_run() {
        let store = store().await;
        let run = store.create_execution("wf", json!({})).await.unwrap();
        let node = store.start_node(&run.id, "review", json!({})).await.unwrap();
        store.pause_execution(&run.id, Some(&node.id)).await.unwrap();
        let request = store
            .create_intervention(NewInterventionRequest::new(&node.id, "Approve?"))
            .await
            .unwrap();

        assert!(store.cancel_execution(&run.id).await.unwrap());

        let run_after = store.get_execution(&run.id).await.unwrap().unwrap();
        assert_eq!(run_after.status, ExecutionStatus::Cancelled);
        assert!(run_after.finished_at.is_some());
        assert_eq!(
            store.get_node(&node.id).await.unwrap().unwrap().status,
            NodeStatus::Failed
        );
        let detail = store.get_intervention(&request.id).await.unwrap().unwrap();
        assert_eq!(detail.request.status, InterventionStatus::Expired);
        assert!(store.pending_interventions().await.unwrap().is_empty());
    }
}
