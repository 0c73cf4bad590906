//! Execution controller
//!
//! Drives one run of a workflow graph against the checkpoint store:
//!
//! 1. `start` records the run in `CREATED`.
//! 2. `run` moves it to `RUNNING`, binds the graph from the catalog and
//!    invokes it, while a listener loop consumes the graph's node lifecycle
//!    events on the same task. Every `node:start` is persisted before the
//!    node runs; every `node:end` completes the matching row.
//! 3. A human node suspends the run: the listener pauses run and node, opens
//!    an intervention request and tells the graph to halt.
//! 4. `resume` records the human's answer as the suspended node's output and
//!    re-enters traversal after the latest completed node, at the successor
//!    that node chose, or where its edges lead.
//!
//! Node failures end the run in `FAILED`, engine failures in `ERROR`; both
//! store the error and its source chain as the run's output. A traversal that
//! ends after an operator paused the run still settles it.
//!
//! At most one traversal per run is live on a controller. `resume` waits for
//! a live one to halt before touching the run.

use crate::config::EngineConfig;
use crate::error::{error_report, EngineError, EngineResult};
use crate::events::{EventLogger, ExecutionEvent};
use crate::intervention::InterventionManager;
use crate::models::{
    ExecutionStatus, HumanInterventionRecord, NewInterventionRequest, NodeExecution, WorkflowExecution,
    DEFAULT_EXPIRES_IN_MINUTES, DEFAULT_PRIORITY,
};
use crate::store::CheckpointStore;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use waypoint_graph::event::{self, NodeEvent, NodeEventReceiver};
use waypoint_graph::{
    Directive, GraphCatalog, GraphDefinition, GraphError, Invocation, InvokeOutcome, NodeSpec,
};

const ABANDONED: &str = "abandoned by an interrupted run";

/// How a call to [`ExecutionController::run`] ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The graph reached its end
    Completed { output: Value },
    /// The run is suspended; at a human node both ids are set
    Paused {
        node_execution_id: Option<String>,
        request_id: Option<String>,
    },
    /// A node failed
    Failed { error: String },
    /// The engine failed
    Errored { error: String },
    /// The run was cancelled while traversing
    Cancelled,
}

impl RunOutcome {
    /// Status the run was left in
    pub fn status(&self) -> ExecutionStatus {
        match self {
            RunOutcome::Completed { .. } => ExecutionStatus::Completed,
            RunOutcome::Paused { .. } => ExecutionStatus::Paused,
            RunOutcome::Failed { .. } => ExecutionStatus::Failed,
            RunOutcome::Errored { .. } => ExecutionStatus::Error,
            RunOutcome::Cancelled => ExecutionStatus::Cancelled,
        }
    }
}

/// Tunables of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Capacity of the node event channel
    pub event_buffer: usize,
    /// Request priority when a human node sets none
    pub default_priority: i64,
    /// Request expiry when a human node sets none
    pub default_expires_in_minutes: i64,
    /// Engine-wide cap on node invocations per traversal
    pub max_steps: Option<usize>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            event_buffer: 32,
            default_priority: DEFAULT_PRIORITY,
            default_expires_in_minutes: DEFAULT_EXPIRES_IN_MINUTES,
            max_steps: None,
        }
    }
}

impl ControllerSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            event_buffer: config.execution.event_buffer,
            default_priority: config.interventions.default_priority,
            default_expires_in_minutes: config.interventions.default_expires_in_minutes,
            max_steps: Some(config.execution.max_steps),
        }
    }
}

/// Why the listener told the graph to halt
#[derive(Debug)]
enum HaltReason {
    /// Suspended at a human node
    Human {
        node_execution_id: String,
        request_id: String,
    },
    /// Paused from outside
    Paused,
    /// Moved to another status from outside
    Stopped(ExecutionStatus),
}

/// What the listener saw during one traversal
#[derive(Debug, Default)]
struct Traversal {
    /// node id -> node execution id of its running invocation
    running: HashMap<String, String>,
    halt: Option<HaltReason>,
    fatal: Option<EngineError>,
}

/// Runs with a live traversal, each with the signal raised when it ends
type LiveRuns = Mutex<HashMap<String, Arc<Notify>>>;

/// Marks a run as traversing until dropped
struct TraversalLease<'a> {
    live: &'a LiveRuns,
    execution_id: String,
    done: Arc<Notify>,
}

impl Drop for TraversalLease<'_> {
    fn drop(&mut self) {
        self.live.lock().remove(&self.execution_id);
        self.done.notify_waiters();
    }
}

/// State machine driving workflow runs
pub struct ExecutionController {
    store: Arc<dyn CheckpointStore>,
    catalog: Arc<dyn GraphCatalog>,
    interventions: InterventionManager,
    events: EventLogger,
    settings: ControllerSettings,
    live: LiveRuns,
}

impl std::fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ExecutionController {
    /// Controller with default settings
    pub fn new(store: Arc<dyn CheckpointStore>, catalog: Arc<dyn GraphCatalog>) -> Self {
        Self::with_settings(store, catalog, ControllerSettings::default(), EventLogger::default())
    }

    pub fn with_settings(
        store: Arc<dyn CheckpointStore>,
        catalog: Arc<dyn GraphCatalog>,
        settings: ControllerSettings,
        events: EventLogger,
    ) -> Self {
        let interventions = InterventionManager::new(Arc::clone(&store), events.clone());
        Self {
            store,
            catalog,
            interventions,
            events,
            settings,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn interventions(&self) -> &InterventionManager {
        &self.interventions
    }

    pub fn events(&self) -> &EventLogger {
        &self.events
    }

    /// Record a new run of `workflow_id` without executing it
    pub async fn start(&self, workflow_id: &str, input: Value) -> EngineResult<String> {
        if self.catalog.definition(workflow_id).is_none() {
            return Err(EngineError::GraphNotFound(workflow_id.to_string()));
        }
        let execution = self.store.create_execution(workflow_id, input).await?;
        info!(execution_id = %execution.id, workflow_id = %workflow_id, "Workflow execution created");
        Ok(execution.id)
    }

    /// Traverse a run until it completes, fails or suspends
    ///
    /// A fresh run (`resume = false`) must be `CREATED` or `RUNNING`; a
    /// resumed run must be `PAUSED` or `RUNNING`, the latter covering a
    /// process that died mid-traversal. Anything else is `InvalidState` and
    /// changes nothing, as is a run this controller is already traversing.
    pub async fn run(&self, execution_id: &str, resume: bool) -> EngineResult<RunOutcome> {
        let Some(_lease) = self.lease(execution_id) else {
            return Err(EngineError::invalid_state(
                "WorkflowExecution",
                execution_id,
                "RUNNING (live traversal)",
                ExecutionStatus::Running,
            ));
        };
        let execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found("WorkflowExecution", execution_id))?;

        let allowed: &[ExecutionStatus] = if resume {
            &[ExecutionStatus::Paused, ExecutionStatus::Running]
        } else {
            &[ExecutionStatus::Created, ExecutionStatus::Running]
        };
        if !allowed.contains(&execution.status) {
            return Err(EngineError::invalid_state(
                "WorkflowExecution",
                execution_id,
                execution.status,
                ExecutionStatus::Running,
            ));
        }
        if !self
            .store
            .transition_execution(execution_id, allowed, ExecutionStatus::Running)
            .await?
        {
            let current = self.current_status(execution_id).await?;
            return Err(EngineError::invalid_state(
                "WorkflowExecution",
                execution_id,
                current.map(|s| s.to_string()).unwrap_or_else(|| "MISSING".to_string()),
                ExecutionStatus::Running,
            ));
        }

        info!(
            execution_id = %execution_id,
            workflow_id = %execution.workflow_id,
            resume,
            "Workflow execution running"
        );
        self.events
            .log(ExecutionEvent::workflow_started(execution_id, &execution.workflow_id, resume));

        let traversal = self.traverse(&execution, resume).await;
        self.settle(execution_id, traversal).await
    }

    /// Pause a `CREATED` or `RUNNING` run, and the named node with it
    ///
    /// False when the run is not pausable; nothing is touched then. A run
    /// that is traversing stops before its next node starts.
    pub async fn pause(&self, execution_id: &str, node_execution_id: Option<&str>) -> EngineResult<bool> {
        let paused = self.store.pause_execution(execution_id, node_execution_id).await?;
        if paused {
            info!(execution_id = %execution_id, node_execution_id = ?node_execution_id, "Workflow execution paused");
            self.events.log(ExecutionEvent::workflow_paused(
                execution_id,
                node_execution_id.map(str::to_string),
            ));
        } else {
            debug!(execution_id = %execution_id, "Workflow execution is not pausable");
        }
        Ok(paused)
    }

    /// Resume a `PAUSED` run after `node_execution_id` and traverse it
    ///
    /// Returns whether the run was resumed; how the traversal then ends is
    /// recorded on the run and logged.
    pub async fn resume(
        &self,
        execution_id: &str,
        node_execution_id: &str,
        request_id: Option<&str>,
    ) -> EngineResult<bool> {
        if !self.prepare_resume(execution_id, node_execution_id, request_id).await? {
            return Ok(false);
        }

        match self.run(execution_id, true).await {
            Ok(outcome) => {
                info!(execution_id = %execution_id, status = %outcome.status(), "Resumed traversal finished")
            }
            Err(e) => error!(execution_id = %execution_id, error = %e, "Resumed traversal failed"),
        }
        Ok(true)
    }

    /// The transactional half of [`resume`](Self::resume): complete the
    /// suspended node, record the intervention and set the run `RUNNING`,
    /// without traversing
    ///
    /// A run paused mid-node is resumed only once its traversal has halted;
    /// until then this waits.
    pub async fn prepare_resume(
        &self,
        execution_id: &str,
        node_execution_id: &str,
        request_id: Option<&str>,
    ) -> EngineResult<bool> {
        self.traversal_settled(execution_id).await;
        if self.current_status(execution_id).await? != Some(ExecutionStatus::Paused) {
            debug!(execution_id = %execution_id, "Workflow execution is not paused");
            return Ok(false);
        }

        let record = match request_id {
            Some(request_id) => self.intervention_record(request_id, node_execution_id).await?,
            None => None,
        };
        let resumed = self
            .store
            .resume_execution(execution_id, node_execution_id, record)
            .await?;

        if resumed {
            info!(
                execution_id = %execution_id,
                node_execution_id = %node_execution_id,
                request_id = ?request_id,
                "Workflow execution resumed"
            );
            self.events
                .log(ExecutionEvent::workflow_resumed(execution_id, node_execution_id));
        }
        Ok(resumed)
    }

    /// Cancel a non-terminal run
    pub async fn cancel(&self, execution_id: &str) -> EngineResult<bool> {
        let cancelled = self.store.cancel_execution(execution_id).await?;
        if cancelled {
            info!(execution_id = %execution_id, "Workflow execution cancelled");
            self.events.log(ExecutionEvent::workflow_cancelled(execution_id));
        }
        Ok(cancelled)
    }

    pub async fn get_execution(&self, execution_id: &str) -> EngineResult<Option<WorkflowExecution>> {
        self.store.get_execution(execution_id).await
    }

    /// Node executions of a run in start order
    pub async fn list_node_executions(&self, execution_id: &str) -> EngineResult<Vec<NodeExecution>> {
        self.store.list_nodes(execution_id).await
    }

    async fn current_status(&self, execution_id: &str) -> EngineResult<Option<ExecutionStatus>> {
        Ok(self.store.get_execution(execution_id).await?.map(|e| e.status))
    }

    fn lease(&self, execution_id: &str) -> Option<TraversalLease<'_>> {
        let mut live = self.live.lock();
        if live.contains_key(execution_id) {
            return None;
        }
        let done = Arc::new(Notify::new());
        live.insert(execution_id.to_string(), Arc::clone(&done));
        Some(TraversalLease {
            live: &self.live,
            execution_id: execution_id.to_string(),
            done,
        })
    }

    /// Wait until no traversal of `execution_id` is live
    async fn traversal_settled(&self, execution_id: &str) {
        loop {
            let done = {
                let live = self.live.lock();
                live.get(execution_id).cloned()
            };
            let Some(done) = done else {
                return;
            };
            let notified = done.notified();
            tokio::pin!(notified);
            // Registered before the re-check, so a lease dropped in between
            // still wakes us.
            notified.as_mut().enable();
            let still_live = {
                let live = self.live.lock();
                live.get(execution_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &done))
            };
            if still_live {
                debug!(execution_id = %execution_id, "Waiting for the live traversal to halt");
                notified.await;
            }
        }
    }

    async fn intervention_record(
        &self,
        request_id: &str,
        node_execution_id: &str,
    ) -> EngineResult<Option<HumanInterventionRecord>> {
        let Some(detail) = self.store.get_intervention(request_id).await? else {
            warn!(request_id = %request_id, "Unknown intervention request; resuming without it");
            return Ok(None);
        };
        let Some(response) = self.store.get_response(request_id).await? else {
            debug!(request_id = %request_id, "Intervention request has no response");
            return Ok(None);
        };

        Ok(Some(HumanInterventionRecord {
            request_id: request_id.to_string(),
            node_execution_id: node_execution_id.to_string(),
            requested_at: detail.request.created_at,
            responded_at: response.created_at,
            response_data: response.response_data,
            notes: response.notes,
        }))
    }

    async fn traverse(
        &self,
        execution: &WorkflowExecution,
        resume: bool,
    ) -> EngineResult<(waypoint_graph::Result<InvokeOutcome>, Traversal)> {
        let definition = self
            .catalog
            .definition(&execution.workflow_id)
            .ok_or_else(|| EngineError::GraphNotFound(execution.workflow_id.clone()))?;
        let graph = self
            .catalog
            .invocable(&execution.workflow_id)
            .ok_or_else(|| EngineError::GraphNotFound(execution.workflow_id.clone()))?;

        let mut invocation = if resume {
            self.resume_point(execution).await?
        } else {
            Invocation::fresh(execution.input_data.clone())
        };
        if let Some(max_steps) = self.settings.max_steps {
            invocation = invocation.with_max_steps(max_steps);
        }

        let (sender, receiver) = event::channel(self.settings.event_buffer);
        // The sender moves into the graph, so the listener ends when it returns.
        let (outcome, traversal) = tokio::join!(
            graph.invoke(invocation, sender),
            self.track_events(&execution.id, &definition, receiver)
        );
        Ok((outcome, traversal))
    }

    /// Where a resumed traversal re-enters, and with which state
    async fn resume_point(&self, execution: &WorkflowExecution) -> EngineResult<Invocation> {
        let abandoned = self.store.abandon_running_nodes(&execution.id, ABANDONED).await?;
        if abandoned > 0 {
            warn!(execution_id = %execution.id, count = abandoned, "Failed node executions left running");
        }

        Ok(match self.store.latest_completed_node(&execution.id).await? {
            Some(checkpoint) => {
                debug!(execution_id = %execution.id, after = %checkpoint.node_id, "Resuming from checkpoint");
                let state = checkpoint.output_data.unwrap_or(checkpoint.input_data);
                let invocation = Invocation::resume_after(checkpoint.node_id, state);
                match checkpoint.next_node_id {
                    Some(next) => invocation.with_goto(next),
                    None => invocation,
                }
            }
            None => Invocation::fresh(execution.input_data.clone()),
        })
    }

    async fn track_events(
        &self,
        execution_id: &str,
        definition: &GraphDefinition,
        mut receiver: NodeEventReceiver,
    ) -> Traversal {
        let mut traversal = Traversal::default();

        while let Some(event) = receiver.recv().await {
            match event {
                NodeEvent::Started { node, inputs, reply } => {
                    let directive = if traversal.fatal.is_some() || traversal.halt.is_some() {
                        Directive::Halt
                    } else {
                        match self
                            .on_node_started(execution_id, definition, &node, inputs, &mut traversal)
                            .await
                        {
                            Ok(directive) => directive,
                            Err(e) => {
                                error!(execution_id = %execution_id, node = %node, error = %e, "Failed to record node start");
                                traversal.fatal = Some(e);
                                Directive::Halt
                            }
                        }
                    };
                    // Err means the graph already gave up on this node.
                    let _ = reply.send(directive);
                }
                NodeEvent::Finished { node, outputs, goto } => {
                    if traversal.fatal.is_some() {
                        continue;
                    }
                    if let Err(e) = self
                        .on_node_finished(execution_id, &node, &outputs, goto.as_deref(), &mut traversal)
                        .await
                    {
                        error!(execution_id = %execution_id, node = %node, error = %e, "Failed to record node completion");
                        traversal.fatal = Some(e);
                    }
                }
            }
        }

        traversal
    }

    async fn on_node_started(
        &self,
        execution_id: &str,
        definition: &GraphDefinition,
        node: &str,
        inputs: Value,
        traversal: &mut Traversal,
    ) -> EngineResult<Directive> {
        match self.current_status(execution_id).await? {
            Some(ExecutionStatus::Running) => {}
            Some(ExecutionStatus::Paused) => {
                debug!(execution_id = %execution_id, node = %node, "Run paused; halting before node");
                traversal.halt = Some(HaltReason::Paused);
                return Ok(Directive::Halt);
            }
            Some(other) => {
                debug!(execution_id = %execution_id, node = %node, status = %other, "Run stopped; halting before node");
                traversal.halt = Some(HaltReason::Stopped(other));
                return Ok(Directive::Halt);
            }
            None => return Err(EngineError::not_found("WorkflowExecution", execution_id)),
        }

        let node_execution = self.store.start_node(execution_id, node, inputs.clone()).await?;
        debug!(execution_id = %execution_id, node = %node, node_execution_id = %node_execution.id, "Node started");
        self.events.log(ExecutionEvent::node_started(execution_id, &node_execution.id, node));
        traversal
            .running
            .insert(node.to_string(), node_execution.id.clone());

        if !definition.is_human_node(node) {
            return Ok(Directive::Proceed);
        }
        self.suspend_at_human_node(execution_id, definition, node, node_execution, inputs, traversal)
            .await
    }

    async fn suspend_at_human_node(
        &self,
        execution_id: &str,
        definition: &GraphDefinition,
        node: &str,
        node_execution: NodeExecution,
        inputs: Value,
        traversal: &mut Traversal,
    ) -> EngineResult<Directive> {
        traversal.running.remove(node);

        if !self
            .store
            .pause_execution(execution_id, Some(&node_execution.id))
            .await?
        {
            // Paused or cancelled from outside since the status check.
            traversal.halt = Some(match self.current_status(execution_id).await? {
                Some(ExecutionStatus::Paused) => HaltReason::Paused,
                Some(other) => HaltReason::Stopped(other),
                None => return Err(EngineError::not_found("WorkflowExecution", execution_id)),
            });
            return Ok(Directive::Halt);
        }

        let settings = definition.node(node).map(NodeSpec::human_settings).unwrap_or_default();
        let prompt = settings
            .prompt
            .unwrap_or_else(|| format!("Human approval required for node: {}", node));
        let mut request = NewInterventionRequest::new(&node_execution.id, prompt)
            .with_context(inputs)
            .with_priority(settings.priority.unwrap_or(self.settings.default_priority))
            .with_expires_in_minutes(
                settings
                    .expires_in_minutes
                    .unwrap_or(self.settings.default_expires_in_minutes),
            );
        if let Some(options) = settings.options {
            request = request.with_options(options);
        }

        let created = self.interventions.create_intervention_request(request).await?;
        info!(
            execution_id = %execution_id,
            node = %node,
            node_execution_id = %node_execution.id,
            request_id = %created.id,
            "Workflow execution waiting for human input"
        );
        self.events.log(ExecutionEvent::workflow_paused(
            execution_id,
            Some(node_execution.id.clone()),
        ));

        traversal.halt = Some(HaltReason::Human {
            node_execution_id: node_execution.id,
            request_id: created.id,
        });
        Ok(Directive::Halt)
    }

    async fn on_node_finished(
        &self,
        execution_id: &str,
        node: &str,
        outputs: &Value,
        goto: Option<&str>,
        traversal: &mut Traversal,
    ) -> EngineResult<()> {
        let Some(node_execution_id) = traversal.running.remove(node) else {
            warn!(execution_id = %execution_id, node = %node, "node:end without a recorded start");
            return Ok(());
        };

        if self.store.complete_node(&node_execution_id, outputs, goto).await? {
            self.events
                .log(ExecutionEvent::node_completed(execution_id, &node_execution_id, node));
        } else {
            warn!(
                execution_id = %execution_id,
                node_execution_id = %node_execution_id,
                "Node execution was no longer open; output dropped"
            );
        }
        Ok(())
    }

    /// Turn the traversal result into the run's final (or paused) status
    async fn settle(
        &self,
        execution_id: &str,
        result: EngineResult<(waypoint_graph::Result<InvokeOutcome>, Traversal)>,
    ) -> EngineResult<RunOutcome> {
        let (outcome, traversal) = match result {
            Ok(pair) => pair,
            Err(e) => return self.record_error(execution_id, e).await,
        };
        if let Some(fatal) = traversal.fatal {
            return self.record_error(execution_id, fatal).await;
        }

        match outcome {
            Ok(InvokeOutcome::Completed(output)) => {
                self.finish(
                    execution_id,
                    ExecutionStatus::Completed,
                    Some(output.clone()),
                    None,
                    RunOutcome::Completed { output },
                )
                .await
            }
            Ok(InvokeOutcome::Halted { node }) => match traversal.halt {
                Some(HaltReason::Human {
                    node_execution_id,
                    request_id,
                }) => Ok(RunOutcome::Paused {
                    node_execution_id: Some(node_execution_id),
                    request_id: Some(request_id),
                }),
                Some(HaltReason::Paused) => Ok(RunOutcome::Paused {
                    node_execution_id: None,
                    request_id: None,
                }),
                Some(HaltReason::Stopped(ExecutionStatus::Cancelled)) => Ok(RunOutcome::Cancelled),
                Some(HaltReason::Stopped(other)) => Err(EngineError::invalid_state(
                    "WorkflowExecution",
                    execution_id,
                    other,
                    ExecutionStatus::Running,
                )),
                None => {
                    let err = GraphError::Channel(format!("traversal halted at '{}' without a directive", node));
                    self.record_error(execution_id, err.into()).await
                }
            },
            Err(e) if e.is_node_failure() => self.record_failure(execution_id, e).await,
            Err(e) => self.record_error(execution_id, e.into()).await,
        }
    }

    async fn record_failure(&self, execution_id: &str, err: GraphError) -> EngineResult<RunOutcome> {
        let message = err.to_string();
        warn!(execution_id = %execution_id, node = ?err.node(), error = %message, "Workflow execution failed");

        self.finish(
            execution_id,
            ExecutionStatus::Failed,
            Some(error_report(&err)),
            Some(message.clone()),
            RunOutcome::Failed { error: message },
        )
        .await
    }

    async fn record_error(&self, execution_id: &str, err: EngineError) -> EngineResult<RunOutcome> {
        let message = err.to_string();
        error!(execution_id = %execution_id, error = %message, "Workflow execution errored");

        let recorded = self
            .finalize(
                execution_id,
                ExecutionStatus::Error,
                Some(error_report(&err)),
                Some(message.clone()),
            )
            .await;
        match recorded {
            Ok(true) => {
                self.events
                    .log(ExecutionEvent::workflow_failed(execution_id, &message));
                Ok(RunOutcome::Errored { error: message })
            }
            Ok(false) => match self.current_status(execution_id).await {
                Ok(Some(ExecutionStatus::Cancelled)) => Ok(RunOutcome::Cancelled),
                _ => Err(err),
            },
            Err(store_err) => {
                error!(execution_id = %execution_id, error = %store_err, "Could not record the error");
                Err(err)
            }
        }
    }

    async fn finish(
        &self,
        execution_id: &str,
        to: ExecutionStatus,
        output: Option<Value>,
        node_error: Option<String>,
        outcome: RunOutcome,
    ) -> EngineResult<RunOutcome> {
        if !self.finalize(execution_id, to, output, node_error).await? {
            return match self.current_status(execution_id).await? {
                Some(ExecutionStatus::Cancelled) => Ok(RunOutcome::Cancelled),
                current => Err(EngineError::invalid_state(
                    "WorkflowExecution",
                    execution_id,
                    current.map(|s| s.to_string()).unwrap_or_else(|| "MISSING".to_string()),
                    to,
                )),
            };
        }

        match &outcome {
            RunOutcome::Completed { .. } => {
                info!(execution_id = %execution_id, "Workflow execution completed");
                self.events.log(ExecutionEvent::workflow_completed(execution_id));
            }
            RunOutcome::Failed { error } | RunOutcome::Errored { error } => {
                self.events.log(ExecutionEvent::workflow_failed(execution_id, error));
            }
            RunOutcome::Paused { .. } | RunOutcome::Cancelled => {}
        }
        Ok(outcome)
    }

    /// Move the run to a terminal status, from `RUNNING` or from a pause
    /// that arrived while its last node was still executing
    async fn finalize(
        &self,
        execution_id: &str,
        to: ExecutionStatus,
        output: Option<Value>,
        node_error: Option<String>,
    ) -> EngineResult<bool> {
        if self
            .store
            .finish_execution(execution_id, to, output.clone(), node_error.clone())
            .await?
        {
            return Ok(true);
        }
        if self.current_status(execution_id).await? != Some(ExecutionStatus::Paused) {
            return Ok(false);
        }
        debug!(execution_id = %execution_id, status = %to, "Run was paused mid-node; settling it");
        self.store
            .settle_paused_execution(execution_id, to, output, node_error)
            .await
    }
}
