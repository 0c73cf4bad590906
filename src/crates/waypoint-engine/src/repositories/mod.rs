//! Table-level data access
//!
//! Repositories are stateless: every function takes the connection to run on,
//! so callers decide whether a statement runs on its own or inside a
//! transaction (`&mut *tx`). Status updates are conditional on the current
//! status being a legal source for the target status; the returned `bool` /
//! row count tells the caller whether the transition happened.

mod intervention_repo;
mod node_execution_repo;
mod workflow_execution_repo;

pub use intervention_repo::InterventionRepository;
pub use node_execution_repo::NodeExecutionRepository;
pub use workflow_execution_repo::WorkflowExecutionRepository;

/// `?, ?, ?` for an `IN (...)` clause
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
