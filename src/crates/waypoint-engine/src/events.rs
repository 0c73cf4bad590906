//! Execution event logging for observability
//!
//! Lifecycle events of runs, nodes and interventions. Every event is written
//! through `tracing` and fanned out to in-process subscribers over a
//! broadcast channel; having no subscribers is fine.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const SUBSCRIBER_CAPACITY: usize = 256;

/// Event types for execution tracking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A run began (or resumed) traversal
    WorkflowStarted {
        execution_id: String,
        workflow_id: String,
        resumed: bool,
        timestamp: i64,
    },
    /// A node invocation was recorded
    NodeStarted {
        execution_id: String,
        node_execution_id: String,
        node_id: String,
        timestamp: i64,
    },
    /// A node returned output
    NodeCompleted {
        execution_id: String,
        node_execution_id: String,
        node_id: String,
        timestamp: i64,
    },
    /// A run was suspended
    WorkflowPaused {
        execution_id: String,
        node_execution_id: Option<String>,
        timestamp: i64,
    },
    /// A paused run was resumed
    WorkflowResumed {
        execution_id: String,
        node_execution_id: String,
        timestamp: i64,
    },
    /// A run reached the end of its graph
    WorkflowCompleted {
        execution_id: String,
        timestamp: i64,
    },
    /// A run ended in `FAILED` or `ERROR`
    WorkflowFailed {
        execution_id: String,
        error: String,
        timestamp: i64,
    },
    /// A run was cancelled
    WorkflowCancelled {
        execution_id: String,
        timestamp: i64,
    },
    /// A human was asked for input
    InterventionRequested {
        request_id: String,
        node_execution_id: String,
        priority: i64,
        timestamp: i64,
    },
    /// A human answered
    InterventionAnswered {
        request_id: String,
        user_id: String,
        timestamp: i64,
    },
}

impl ExecutionEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> i64 {
        match self {
            ExecutionEvent::WorkflowStarted { timestamp, .. }
            | ExecutionEvent::NodeStarted { timestamp, .. }
            | ExecutionEvent::NodeCompleted { timestamp, .. }
            | ExecutionEvent::WorkflowPaused { timestamp, .. }
            | ExecutionEvent::WorkflowResumed { timestamp, .. }
            | ExecutionEvent::WorkflowCompleted { timestamp, .. }
            | ExecutionEvent::WorkflowFailed { timestamp, .. }
            | ExecutionEvent::WorkflowCancelled { timestamp, .. }
            | ExecutionEvent::InterventionRequested { timestamp, .. }
            | ExecutionEvent::InterventionAnswered { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ExecutionEvent::WorkflowStarted { workflow_id, resumed, .. } => {
                if *resumed {
                    format!("Workflow re-entered: {}", workflow_id)
                } else {
                    format!("Workflow started: {}", workflow_id)
                }
            }
            ExecutionEvent::NodeStarted { node_id, .. } => format!("Node started: {}", node_id),
            ExecutionEvent::NodeCompleted { node_id, .. } => format!("Node completed: {}", node_id),
            ExecutionEvent::WorkflowPaused { node_execution_id: Some(node), .. } => {
                format!("Workflow paused at node execution {}", node)
            }
            ExecutionEvent::WorkflowPaused { .. } => "Workflow paused".to_string(),
            ExecutionEvent::WorkflowResumed { node_execution_id, .. } => {
                format!("Workflow resumed after node execution {}", node_execution_id)
            }
            ExecutionEvent::WorkflowCompleted { .. } => "Workflow completed".to_string(),
            ExecutionEvent::WorkflowFailed { error, .. } => format!("Workflow failed: {}", error),
            ExecutionEvent::WorkflowCancelled { .. } => "Workflow cancelled".to_string(),
            ExecutionEvent::InterventionRequested { request_id, priority, .. } => {
                format!("Intervention requested: {} (priority {})", request_id, priority)
            }
            ExecutionEvent::InterventionAnswered { request_id, user_id, .. } => {
                format!("Intervention answered: {} by {}", request_id, user_id)
            }
        }
    }

    /// Run the event belongs to, if it is run-scoped
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::WorkflowStarted { execution_id, .. }
            | ExecutionEvent::NodeStarted { execution_id, .. }
            | ExecutionEvent::NodeCompleted { execution_id, .. }
            | ExecutionEvent::WorkflowPaused { execution_id, .. }
            | ExecutionEvent::WorkflowResumed { execution_id, .. }
            | ExecutionEvent::WorkflowCompleted { execution_id, .. }
            | ExecutionEvent::WorkflowFailed { execution_id, .. }
            | ExecutionEvent::WorkflowCancelled { execution_id, .. } => Some(execution_id),
            ExecutionEvent::InterventionRequested { .. } | ExecutionEvent::InterventionAnswered { .. } => None,
        }
    }

    pub fn workflow_started(execution_id: impl Into<String>, workflow_id: impl Into<String>, resumed: bool) -> Self {
        ExecutionEvent::WorkflowStarted {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            resumed,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn node_started(
        execution_id: impl Into<String>,
        node_execution_id: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        ExecutionEvent::NodeStarted {
            execution_id: execution_id.into(),
            node_execution_id: node_execution_id.into(),
            node_id: node_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn node_completed(
        execution_id: impl Into<String>,
        node_execution_id: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        ExecutionEvent::NodeCompleted {
            execution_id: execution_id.into(),
            node_execution_id: node_execution_id.into(),
            node_id: node_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn workflow_paused(execution_id: impl Into<String>, node_execution_id: Option<String>) -> Self {
        ExecutionEvent::WorkflowPaused {
            execution_id: execution_id.into(),
            node_execution_id,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn workflow_resumed(execution_id: impl Into<String>, node_execution_id: impl Into<String>) -> Self {
        ExecutionEvent::WorkflowResumed {
            execution_id: execution_id.into(),
            node_execution_id: node_execution_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn workflow_completed(execution_id: impl Into<String>) -> Self {
        ExecutionEvent::WorkflowCompleted {
            execution_id: execution_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn workflow_failed(execution_id: impl Into<String>, error: impl Into<String>) -> Self {
        ExecutionEvent::WorkflowFailed {
            execution_id: execution_id.into(),
            error: error.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn workflow_cancelled(execution_id: impl Into<String>) -> Self {
        ExecutionEvent::WorkflowCancelled {
            execution_id: execution_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn intervention_requested(
        request_id: impl Into<String>,
        node_execution_id: impl Into<String>,
        priority: i64,
    ) -> Self {
        ExecutionEvent::InterventionRequested {
            request_id: request_id.into(),
            node_execution_id: node_execution_id.into(),
            priority,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn intervention_answered(request_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        ExecutionEvent::InterventionAnswered {
            request_id: request_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Event logger for recording execution events
#[derive(Debug, Clone)]
pub struct EventLogger {
    enabled: bool,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventLogger {
    /// Create a new event logger
    pub fn new(enabled: bool) -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self { enabled, sender }
    }

    /// Log an execution event
    pub fn log(&self, event: ExecutionEvent) {
        if !self.enabled {
            return;
        }

        tracing::info!(
            event_type = ?event,
            timestamp = event.timestamp(),
            description = %event.description(),
            "Execution event"
        );
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    /// Receive every event logged from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new(true)
    }
}
