//! # waypoint-engine
//!
//! Resumable execution of workflow graphs with durable checkpoints and
//! human-in-the-loop pauses.
//!
//! ## Features
//!
//! - **Durable runs** - every run, node invocation and intervention is
//!   recorded in SQLite as it happens
//! - **Human nodes** - a run suspends at a human node, raises an intervention
//!   request and resumes with the human's answer as the node's output
//! - **Crash recovery** - a run re-enters after its latest completed node and
//!   never re-executes finished work
//! - **Dual-location config** - user-level and project-level TOML with
//!   environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use std::sync::Arc;
//! use waypoint_engine::{EngineConfig, WorkflowService};
//! use waypoint_graph::{handler_fn, EdgeSpec, GraphBuilder, GraphDefinition, GraphRegistry, NodeResult, NodeSpec};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let definition = GraphDefinition::new("review")
//!     .with_node(NodeSpec::new("draft"))
//!     .with_node(NodeSpec::human("approve"))
//!     .with_edge(EdgeSpec::new("draft", "approve"));
//! let graph = GraphBuilder::new(definition)
//!     .handler("draft", handler_fn(|input| async move { Ok(NodeResult::State(input)) }))
//!     .compile()?;
//!
//! let registry = Arc::new(GraphRegistry::new());
//! registry.register(graph);
//!
//! let service = WorkflowService::from_config(&EngineConfig::default(), registry).await?;
//! service.install_signal_handlers();
//! service.spawn_expiry_sweeper();
//! let execution_id = service.start_execution("review", json!({"text": "hello"})).await?;
//!
//! for pending in service.get_pending_interventions().await? {
//!     service
//!         .respond_and_resume(&pending.request.id, "alice", json!({"approved": true}), None)
//!         .await?;
//! }
//! # let _ = execution_id;
//! service.shutdown_coordinator().wait_for_shutdown().await;
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod events;
pub mod expiry;
pub mod intervention;
pub mod models;
pub mod repositories;
pub mod service;
pub mod shutdown;
pub mod store;

pub use config::{ConfigLoader, EngineConfig};
pub use controller::{ControllerSettings, ExecutionController, RunOutcome};
pub use db::Database;
pub use error::{EngineError, EngineResult};
pub use events::{EventLogger, ExecutionEvent};
pub use expiry::ExpirySweeper;
pub use intervention::InterventionManager;
pub use models::{
    ExecutionStatus, HumanInterventionRecord, InterventionDetail, InterventionRequest,
    InterventionResponse, InterventionStatus, NewInterventionRequest, NodeExecution, NodeStatus,
    WorkflowExecution,
};
pub use service::WorkflowService;
pub use shutdown::ShutdownCoordinator;
pub use store::{CheckpointStore, SqliteCheckpointStore};
