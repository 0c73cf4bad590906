//! Common test utilities and setup
#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use waypoint_engine::{
    CheckpointStore, Database, EngineResult, ExecutionController, ExecutionStatus, NodeExecution, RunOutcome,
    SqliteCheckpointStore, WorkflowExecution,
};
use waypoint_graph::{
    handler_fn, BoxError, EdgeSpec, GraphBuilder, GraphDefinition, GraphRegistry, NodeHandler, NodeResult,
    NodeSpec,
};

/// A migrated database in a temp dir with a controller over it
pub struct Harness {
    pub dir: TempDir,
    pub db: Database,
    pub store: Arc<dyn CheckpointStore>,
    pub registry: Arc<GraphRegistry>,
    pub controller: Arc<ExecutionController>,
}

pub async fn setup() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::initialize(dir.path().join("waypoint.db"))
        .await
        .expect("Failed to create test database");
    let store: Arc<dyn CheckpointStore> = Arc::new(SqliteCheckpointStore::new(db.clone()));
    let registry = Arc::new(GraphRegistry::new());
    let controller = Arc::new(ExecutionController::new(
        Arc::clone(&store),
        Arc::clone(&registry) as Arc<dyn waypoint_graph::GraphCatalog>,
    ));

    Harness {
        dir,
        db,
        store,
        registry,
        controller,
    }
}

/// Appends `tag` to the `path` array of the state
pub fn append(tag: &'static str) -> Arc<dyn NodeHandler> {
    handler_fn(move |mut state: Value| async move {
        let mut path = state
            .get("path")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        path.push(json!(tag));
        if !state.is_object() {
            state = json!({});
        }
        state["path"] = json!(path);
        Ok(NodeResult::State(state))
    })
}

/// Like [`append`], counting its invocations
pub fn counted(tag: &'static str, calls: Arc<AtomicUsize>) -> Arc<dyn NodeHandler> {
    let inner = append(tag);
    handler_fn(move |state: Value| {
        let inner = Arc::clone(&inner);
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            inner.call(state).await
        }
    })
}

/// Wraps the input as `{"received": input}`
pub fn receive() -> Arc<dyn NodeHandler> {
    handler_fn(|state: Value| async move { Ok(NodeResult::State(json!({ "received": state }))) })
}

/// Always fails
pub fn fail(message: &'static str) -> Arc<dyn NodeHandler> {
    handler_fn(move |_state: Value| async move { Err(BoxError::from(message)) })
}

/// Blocks until `gate` is notified, then answers with `answer(state)`
pub fn gated<F>(gate: &Arc<Notify>, answer: F) -> Arc<dyn NodeHandler>
where
    F: Fn(Value) -> Result<NodeResult, BoxError> + Send + Sync + 'static,
{
    let gate = Arc::clone(gate);
    let answer = Arc::new(answer);
    handler_fn(move |state: Value| {
        let gate = Arc::clone(&gate);
        let answer = Arc::clone(&answer);
        async move {
            gate.notified().await;
            (*answer)(state)
        }
    })
}

/// `a -> b`
pub fn linear_graph(registry: &GraphRegistry) {
    let def = GraphDefinition::new("linear")
        .with_node(NodeSpec::new("a"))
        .with_node(NodeSpec::new("b"))
        .with_edge(EdgeSpec::new("a", "b"));
    registry.register(
        GraphBuilder::new(def)
            .handler("a", append("a"))
            .handler("b", append("b"))
            .compile()
            .expect("linear graph compiles"),
    );
}

/// `draft -> review (human) -> publish`
pub fn review_graph(registry: &GraphRegistry) {
    review_graph_with(registry, NodeSpec::human("review"));
}

/// `draft -> <review> -> publish` with a custom review node
pub fn review_graph_with(registry: &GraphRegistry, review: NodeSpec) {
    let review_id = review.id.clone();
    let def = GraphDefinition::new("review")
        .with_node(NodeSpec::new("draft"))
        .with_node(review)
        .with_node(NodeSpec::new("publish"))
        .with_edge(EdgeSpec::new("draft", review_id.clone()))
        .with_edge(EdgeSpec::new(review_id, "publish"));
    registry.register(
        GraphBuilder::new(def)
            .handler("draft", append("draft"))
            .handler("publish", receive())
            .compile()
            .expect("review graph compiles"),
    );
}

/// `a -> boom`, where `boom` fails
pub fn failing_graph(registry: &GraphRegistry) {
    let def = GraphDefinition::new("failing")
        .with_node(NodeSpec::new("a"))
        .with_node(NodeSpec::new("boom"))
        .with_edge(EdgeSpec::new("a", "boom"));
    registry.register(
        GraphBuilder::new(def)
            .handler("a", append("a"))
            .handler("boom", fail("kaput"))
            .compile()
            .expect("failing graph compiles"),
    );
}

/// Poll until the run reaches `status`
pub async fn wait_for_status(
    store: &Arc<dyn CheckpointStore>,
    execution_id: &str,
    status: ExecutionStatus,
) -> WorkflowExecution {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let execution = store
            .get_execution(execution_id)
            .await
            .expect("store query")
            .expect("execution exists");
        if execution.status == status {
            return execution;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "execution {} stuck in {} waiting for {}",
            execution_id,
            execution.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Traverse a run on its own task
pub fn spawn_run(h: &Harness, execution_id: &str, resume: bool) -> JoinHandle<EngineResult<RunOutcome>> {
    let controller = Arc::clone(&h.controller);
    let execution_id = execution_id.to_string();
    tokio::spawn(async move { controller.run(&execution_id, resume).await })
}

/// Poll until the run's first node execution is recorded
pub async fn first_node(store: &Arc<dyn CheckpointStore>, execution_id: &str) -> NodeExecution {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let nodes = store.list_nodes(execution_id).await.expect("store query");
        if let Some(node) = nodes.into_iter().next() {
            return node;
        }
        assert!(tokio::time::Instant::now() < deadline, "no node of {} started", execution_id);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
