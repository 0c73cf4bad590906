//! The contract between the engine and an executable graph

use crate::error::Result;
use crate::event::NodeEventSender;
use async_trait::async_trait;
use serde_json::Value;

/// Input to a single traversal
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// State handed to the first node that runs
    pub input: Value,
    /// When set, traversal re-enters at the successor of this node instead of
    /// at the entry node. `input` is then that node's recorded output.
    pub resume_after: Option<String>,
    /// Successor `resume_after` chose explicitly when it ran. Overrides edge
    /// routing on re-entry.
    pub goto: Option<String>,
    /// Caller's cap on node invocations; the lower of this and the graph's
    /// own limit applies
    pub max_steps: Option<usize>,
}

impl Invocation {
    /// Traverse from the entry node
    pub fn fresh(input: Value) -> Self {
        Self {
            input,
            resume_after: None,
            goto: None,
            max_steps: None,
        }
    }

    /// Continue after `node`, whose output was `input`
    pub fn resume_after(node: impl Into<String>, input: Value) -> Self {
        Self {
            input,
            resume_after: Some(node.into()),
            goto: None,
            max_steps: None,
        }
    }

    /// Re-enter at `target` rather than where the edges lead
    pub fn with_goto(mut self, target: impl Into<String>) -> Self {
        self.goto = Some(target.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// How a traversal ended, when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    /// Traversal reached the end of the graph with this final state
    Completed(Value),
    /// The listener answered [`Directive::Halt`](crate::event::Directive::Halt)
    /// when `node` was about to start
    Halted { node: String },
}

/// An executable graph
///
/// Implementations must emit `node:start` (and await its directive) before
/// running each node, and `node:end` after each node that returns
/// successfully. A halted traversal returns [`InvokeOutcome::Halted`], never an
/// error.
#[async_trait]
pub trait Invocable: Send + Sync {
    /// Run the graph
    async fn invoke(&self, invocation: Invocation, events: NodeEventSender) -> Result<InvokeOutcome>;
}
