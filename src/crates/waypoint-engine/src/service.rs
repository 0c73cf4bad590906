//! Workflow service
//!
//! The surface applications call: start runs in the background and poll
//! them, pause/resume/cancel them, and work the intervention queue. Runs are
//! dispatched onto their own tokio tasks, at most
//! `execution.max_concurrent_runs` traversing at once.

use crate::config::{EngineConfig, InterventionConfig};
use crate::controller::{ControllerSettings, ExecutionController, RunOutcome};
use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventLogger, ExecutionEvent};
use crate::expiry::ExpirySweeper;
use crate::models::{
    InterventionDetail, InterventionRequest, NewInterventionRequest, NodeExecution, WorkflowExecution,
};
use crate::shutdown::ShutdownCoordinator;
use crate::store::SqliteCheckpointStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use waypoint_graph::GraphCatalog;

/// Application-facing entry point of the engine
#[derive(Debug, Clone)]
pub struct WorkflowService {
    controller: Arc<ExecutionController>,
    permits: Arc<Semaphore>,
    max_concurrent_runs: u32,
    sweep_interval: Duration,
    shutdown: ShutdownCoordinator,
}

impl WorkflowService {
    /// Service running at most `max_concurrent_runs` traversals at once
    ///
    /// The limit is clamped to what a semaphore can hold and to `u32`, the
    /// width `shutdown` drains permits in.
    pub fn new(controller: Arc<ExecutionController>, max_concurrent_runs: usize) -> Self {
        let max_concurrent_runs = u32::try_from(max_concurrent_runs.clamp(1, Semaphore::MAX_PERMITS))
            .unwrap_or(u32::MAX);
        Self {
            controller,
            permits: Arc::new(Semaphore::new(max_concurrent_runs as usize)),
            max_concurrent_runs,
            sweep_interval: Duration::from_secs(InterventionConfig::default().sweep_interval_secs),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// How often the expiry sweeper runs
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Open the configured database, migrate it and wire a service around it
    pub async fn from_config(config: &EngineConfig, catalog: Arc<dyn GraphCatalog>) -> EngineResult<Self> {
        let db = Database::from_config(&config.database).await?;
        db.run_migrations().await?;

        let controller = ExecutionController::with_settings(
            Arc::new(SqliteCheckpointStore::new(db)),
            catalog,
            ControllerSettings::from_config(config),
            EventLogger::default(),
        );
        Ok(Self::new(Arc::new(controller), config.execution.max_concurrent_runs)
            .with_sweep_interval(Duration::from_secs(config.interventions.sweep_interval_secs)))
    }

    /// Effective cap on concurrent traversals
    pub fn max_concurrent_runs(&self) -> u32 {
        self.max_concurrent_runs
    }

    pub fn controller(&self) -> &Arc<ExecutionController> {
        &self.controller
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Receive every execution event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.controller.events().subscribe()
    }

    /// Create a run and traverse it in the background
    pub async fn start_execution(&self, workflow_id: &str, input_data: Value) -> EngineResult<String> {
        let execution_id = self.controller.start(workflow_id, input_data).await?;
        self.dispatch(execution_id.clone(), false);
        Ok(execution_id)
    }

    /// Create a run and traverse it on the calling task
    pub async fn execute(&self, workflow_id: &str, input_data: Value) -> EngineResult<(String, RunOutcome)> {
        let execution_id = self.controller.start(workflow_id, input_data).await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EngineError::InvalidInput("service is shut down".to_string()))?;
        let outcome = self.controller.run(&execution_id, false).await?;
        Ok((execution_id, outcome))
    }

    pub async fn get_execution(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>> {
        self.controller.get_execution(execution_id).await
    }

    pub async fn list_node_executions(&self, execution_id: &str) -> EngineResult<Vec<NodeExecution>> {
        self.controller.list_node_executions(execution_id).await
    }

    pub async fn pause_execution(&self, execution_id: &str, node_execution_id: Option<&str>) -> EngineResult<bool> {
        self.controller.pause(execution_id, node_execution_id).await
    }

    /// Resume a paused run; traversal continues in the background
    pub async fn resume_execution(
        &self,
        execution_id: &str,
        node_execution_id: &str,
        intervention_request_id: Option<&str>,
    ) -> EngineResult<bool> {
        let resumed = self
            .controller
            .prepare_resume(execution_id, node_execution_id, intervention_request_id)
            .await?;
        if resumed {
            self.dispatch(execution_id.to_string(), true);
        }
        Ok(resumed)
    }

    pub async fn cancel_execution(&self, execution_id: &str) -> EngineResult<bool> {
        self.controller.cancel(execution_id).await
    }

    pub async fn create_intervention_request(
        &self,
        request: NewInterventionRequest,
    ) -> EngineResult<InterventionRequest> {
        self.controller
            .interventions()
            .create_intervention_request(request)
            .await
    }

    pub async fn get_pending_interventions(&self) -> EngineResult<Vec<InterventionDetail>> {
        self.controller.interventions().get_pending_interventions().await
    }

    pub async fn get_intervention_request(&self, request_id: &str) -> EngineResult<Option<InterventionDetail>> {
        self.controller
            .interventions()
            .get_intervention_request(request_id)
            .await
    }

    pub async fn submit_response(
        &self,
        request_id: &str,
        user_id: &str,
        response_data: Value,
        notes: Option<String>,
    ) -> EngineResult<bool> {
        self.controller
            .interventions()
            .submit_response(request_id, user_id, response_data, notes)
            .await
    }

    /// Answer a request and resume its run in the background
    ///
    /// False when the request could not be answered or its run is no longer
    /// paused.
    pub async fn respond_and_resume(
        &self,
        request_id: &str,
        user_id: &str,
        response_data: Value,
        notes: Option<String>,
    ) -> EngineResult<bool> {
        if !self
            .submit_response(request_id, user_id, response_data, notes)
            .await?
        {
            return Ok(false);
        }
        let Some(detail) = self.get_intervention_request(request_id).await? else {
            return Ok(false);
        };
        self.resume_execution(
            &detail.workflow_execution_id,
            &detail.request.node_execution_id,
            Some(request_id),
        )
        .await
    }

    /// Start the background expiry sweeper; it stops on shutdown
    pub fn spawn_expiry_sweeper(&self) -> JoinHandle<()> {
        ExpirySweeper::new(
            self.controller.interventions().clone(),
            self.sweep_interval,
            self.shutdown.clone(),
        )
        .spawn()
    }

    /// Request shutdown on SIGINT or SIGTERM
    pub fn install_signal_handlers(&self) -> JoinHandle<()> {
        self.shutdown.install_signal_handlers()
    }

    /// Stop dispatching and wait for traversing runs to settle
    pub async fn shutdown(&self) {
        self.shutdown.request_shutdown();
        match self.permits.acquire_many(self.max_concurrent_runs).await {
            Ok(_all) => info!("All workflow runs settled"),
            Err(_) => warn!("Run permits already closed"),
        }
        self.permits.close();
    }

    fn dispatch(&self, execution_id: String, resume: bool) -> JoinHandle<()> {
        let controller = Arc::clone(&self.controller);
        let permits = Arc::clone(&self.permits);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(execution_id = %execution_id, "Service shut down; run not dispatched");
                return;
            };
            if shutdown.is_shutdown_requested() {
                warn!(execution_id = %execution_id, "Shutdown requested; run not dispatched");
                return;
            }

            match controller.run(&execution_id, resume).await {
                Ok(outcome) => info!(
                    execution_id = %execution_id,
                    status = %outcome.status(),
                    "Workflow run settled"
                ),
                Err(e) => error!(execution_id = %execution_id, error = %e, "Workflow run failed"),
            }
        })
    }
}
