//! Error types for the execution engine

use serde_json::{json, Value};
use thiserror::Error;
use waypoint_graph::GraphError;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors raised by the store, the controller and the intervention manager
#[derive(Error, Debug)]
pub enum EngineError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The record is not in a state that allows the operation
    #[error("{entity} '{id}' cannot move from {from} to {to}")]
    InvalidState {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// No graph is registered for the workflow
    #[error("No graph registered for workflow '{0}'")]
    GraphNotFound(String),

    /// The graph failed outside of node logic
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Caller supplied an unusable argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_state(
        entity: &'static str,
        id: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Messages of `err` and every error in its source chain, outermost first
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// The `{error, traceback}` object recorded as a failed run's output
pub fn error_report(err: &(dyn std::error::Error + 'static)) -> Value {
    let traceback = error_chain(err)
        .iter()
        .enumerate()
        .map(|(depth, message)| format!("{}: {}", depth, message))
        .collect::<Vec<_>>()
        .join("\n");

    json!({
        "error": err.to_string(),
        "traceback": traceback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_includes_source_chain() {
        let graph = GraphError::node_execution("fetch", "connection refused");
        let err = EngineError::from(graph);
        let report = error_report(&err);

        assert_eq!(
            report["error"],
            "Graph error: Node 'fetch' execution failed: connection refused"
        );
        let traceback = report["traceback"].as_str().unwrap();
        assert!(traceback.starts_with("0: Graph error"));
        assert!(traceback.contains("2: connection refused"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = EngineError::invalid_state("WorkflowExecution", "wf-1", "COMPLETED", "RUNNING");
        assert_eq!(
            err.to_string(),
            "WorkflowExecution 'wf-1' cannot move from COMPLETED to RUNNING"
        );
    }
}
