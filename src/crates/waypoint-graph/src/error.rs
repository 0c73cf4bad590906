//! Error types for graph definition, compilation and traversal
//!
//! ```text
//! GraphError
//! ├── Validation         - Graph structure errors (caught at parse/compile time)
//! ├── Condition          - Unparseable edge condition
//! ├── NodeExecution      - A node's handler returned an error
//! ├── UnknownTarget      - A node routed to a node that does not exist
//! ├── StepLimitExceeded  - Traversal ran longer than the configured step limit
//! ├── Channel            - The event listener went away mid-traversal
//! └── Serialization      - JSON/YAML errors
//! ```
//!
//! The engine separates *node-level* failures (the workflow's own logic went
//! wrong) from everything else; see [`GraphError::is_node_failure`].

use thiserror::Error;

/// Boxed error returned by node handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or traversing a graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// An edge condition could not be parsed
    #[error("Invalid condition '{expression}': {reason}")]
    Condition {
        /// The raw condition text
        expression: String,
        /// Why parsing failed
        reason: String,
    },

    /// Node execution failed with context
    #[error("Node '{node}' execution failed: {source}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error returned by the node handler
        #[source]
        source: BoxError,
    },

    /// A node routed to a node that is not part of the graph
    #[error("Node '{node}' routed to unknown node '{target}'")]
    UnknownTarget {
        /// Node that issued the route
        node: String,
        /// Target that does not exist
        target: String,
    },

    /// Traversal exceeded the maximum number of node invocations
    #[error("Step limit of {limit} exceeded")]
    StepLimitExceeded {
        /// Configured limit
        limit: usize,
    },

    /// The event listener stopped responding
    #[error("Event channel closed: {0}")]
    Channel(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GraphError {
    /// Create a node execution error from anything convertible into a [`BoxError`]
    pub fn node_execution(node: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Whether the error originates in the workflow's own logic rather than in
    /// the machinery running it.
    pub fn is_node_failure(&self) -> bool {
        matches!(
            self,
            Self::NodeExecution { .. } | Self::UnknownTarget { .. } | Self::StepLimitExceeded { .. }
        )
    }

    /// Name of the node the error is attributed to, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeExecution { node, .. } | Self::UnknownTarget { node, .. } => Some(node),
            _ => None,
        }
    }
}
