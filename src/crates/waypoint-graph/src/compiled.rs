//! A sequential executor for [`GraphDefinition`]s
//!
//! [`GraphBuilder`] binds a [`NodeHandler`] to every non-human node of a
//! definition, parses the edge conditions and produces a [`CompiledGraph`],
//! which implements [`Invocable`].
//!
//! Traversal is strictly sequential: one node runs at a time, and the output
//! of a node becomes the input of the next. After a node returns, the next
//! node is the target of its first outgoing edge (in declaration order) whose
//! condition holds against the output, unless the node answered with a
//! [`Command`] naming the next node explicitly. Traversal ends at [`END`], at a
//! node with no matching outgoing edge, or when the listener halts it.
//!
//! Human nodes have no handler. When the listener lets one proceed, for
//! instance because a response was already recorded elsewhere, its input
//! passes through unchanged.
//!
//! ```rust
//! use serde_json::json;
//! use waypoint_graph::{handler_fn, EdgeSpec, GraphBuilder, GraphDefinition, NodeResult, NodeSpec};
//!
//! let definition = GraphDefinition::new("greet")
//!     .with_node(NodeSpec::new("hello"))
//!     .with_node(NodeSpec::new("shout"))
//!     .with_edge(EdgeSpec::new("hello", "shout"));
//!
//! let graph = GraphBuilder::new(definition)
//!     .handler("hello", handler_fn(|_input| async move {
//!         Ok(NodeResult::State(json!({"text": "hello"})))
//!     }))
//!     .handler("shout", handler_fn(|input| async move {
//!         let text = input["text"].as_str().unwrap_or_default().to_uppercase();
//!         Ok(NodeResult::State(json!({"text": text})))
//!     }))
//!     .compile()
//!     .unwrap();
//!
//! assert_eq!(graph.entry(), "hello");
//! ```

use crate::condition::Condition;
use crate::definition::{GraphDefinition, END};
use crate::error::{BoxError, GraphError, Result};
use crate::event::{Directive, NodeEventSender};
use crate::invocable::{Invocable, Invocation, InvokeOutcome};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default traversal step limit
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Explicit routing answer from a node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    /// New state; `None` keeps the node's input
    pub update: Option<Value>,
    /// Next node, or [`END`]; `None` falls back to edge routing
    pub goto: Option<String>,
}

impl Command {
    /// Route to `target`
    pub fn goto(target: impl Into<String>) -> Self {
        Self {
            update: None,
            goto: Some(target.into()),
        }
    }

    /// Replace the state
    pub fn with_update(mut self, update: Value) -> Self {
        self.update = Some(update);
        self
    }
}

/// What a node handler returns
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    /// New state, routed by edges
    State(Value),
    /// State update plus explicit routing
    Command(Command),
}

impl From<Value> for NodeResult {
    fn from(value: Value) -> Self {
        NodeResult::State(value)
    }
}

impl From<Command> for NodeResult {
    fn from(command: Command) -> Self {
        NodeResult::Command(command)
    }
}

/// Logic of a single node
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Run the node against its input state
    async fn call(&self, input: Value) -> std::result::Result<NodeResult, BoxError>;
}

/// [`NodeHandler`] backed by an async closure
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> NodeHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<NodeResult, BoxError>> + Send,
{
    async fn call(&self, input: Value) -> std::result::Result<NodeResult, BoxError> {
        (self.0)(input).await
    }
}

/// Wrap an async closure as a shareable [`NodeHandler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn NodeHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<NodeResult, BoxError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Builder for [`CompiledGraph`]
pub struct GraphBuilder {
    definition: GraphDefinition,
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
    max_steps: usize,
}

impl GraphBuilder {
    /// Start from a definition
    pub fn new(definition: GraphDefinition) -> Self {
        Self {
            definition,
            handlers: HashMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Bind the logic of node `node`
    pub fn handler(mut self, node: impl Into<String>, handler: Arc<dyn NodeHandler>) -> Self {
        self.handlers.insert(node.into(), handler);
        self
    }

    /// Maximum number of node invocations per traversal
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate and compile
    pub fn compile(self) -> Result<CompiledGraph> {
        self.definition.validate()?;

        for node in &self.definition.nodes {
            let has_handler = self.handlers.contains_key(&node.id);
            if node.is_human() && has_handler {
                return Err(GraphError::Validation(format!(
                    "Human node '{}' cannot have a handler",
                    node.id
                )));
            }
            if !node.is_human() && !has_handler {
                return Err(GraphError::Validation(format!(
                    "Node '{}' has no handler",
                    node.id
                )));
            }
        }
        if let Some(unknown) = self
            .handlers
            .keys()
            .find(|id| self.definition.node(id).is_none())
        {
            return Err(GraphError::Validation(format!(
                "Handler bound to unknown node '{}'",
                unknown
            )));
        }

        let mut routes: HashMap<String, Vec<Route>> = HashMap::new();
        for edge in &self.definition.edges {
            let condition = match &edge.condition {
                Some(expression) => Condition::parse(expression)?,
                None => Condition::Const(true),
            };
            routes.entry(edge.source.clone()).or_default().push(Route {
                target: edge.target.clone(),
                condition,
            });
        }

        let entry = self
            .definition
            .entry_node()
            .map(str::to_string)
            .ok_or_else(|| GraphError::Validation("Graph has no entry node".into()))?;

        Ok(CompiledGraph {
            definition: Arc::new(self.definition),
            handlers: self.handlers,
            routes,
            entry,
            max_steps: self.max_steps,
        })
    }
}

#[derive(Debug, Clone)]
struct Route {
    target: String,
    condition: Condition,
}

/// An executable graph built by [`GraphBuilder`]
pub struct CompiledGraph {
    definition: Arc<GraphDefinition>,
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
    routes: HashMap<String, Vec<Route>>,
    entry: String,
    max_steps: usize,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("id", &self.definition.id)
            .field("entry", &self.entry)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl CompiledGraph {
    /// The definition this graph was compiled from
    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }

    /// Shared handle to the definition
    pub fn definition_arc(&self) -> Arc<GraphDefinition> {
        Arc::clone(&self.definition)
    }

    /// Entry node id
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Successor of `node` given its output, `None` when traversal ends
    pub fn next_node(&self, node: &str, state: &Value) -> Option<&str> {
        let target = self
            .routes
            .get(node)?
            .iter()
            .find(|route| route.condition.evaluate(state))
            .map(|route| route.target.as_str());

        match target {
            Some(END) | None => None,
            Some(target) => Some(target),
        }
    }

    fn resolve_goto(&self, node: &str, goto: String) -> Result<Option<String>> {
        if goto == END {
            return Ok(None);
        }
        if self.definition.node(&goto).is_none() {
            return Err(GraphError::UnknownTarget {
                node: node.to_string(),
                target: goto,
            });
        }
        Ok(Some(goto))
    }
}

#[async_trait]
impl Invocable for CompiledGraph {
    async fn invoke(&self, invocation: Invocation, events: NodeEventSender) -> Result<InvokeOutcome> {
        let mut state = invocation.input;
        let mut current = match invocation.resume_after {
            Some(node) => {
                if self.definition.node(&node).is_none() {
                    return Err(GraphError::Validation(format!(
                        "Cannot resume after unknown node '{}'",
                        node
                    )));
                }
                debug!(graph = %self.definition.id, after = %node, "Resuming traversal");
                match invocation.goto {
                    Some(target) => self.resolve_goto(&node, target)?,
                    None => self.next_node(&node, &state).map(str::to_string),
                }
            }
            None => Some(self.entry.clone()),
        };

        let limit = invocation
            .max_steps
            .map_or(self.max_steps, |cap| cap.min(self.max_steps));
        let mut steps = 0usize;
        while let Some(node) = current.take() {
            steps += 1;
            if steps > limit {
                return Err(GraphError::StepLimitExceeded { limit });
            }

            if events.node_started(&node, state.clone()).await? == Directive::Halt {
                debug!(graph = %self.definition.id, node = %node, "Traversal halted");
                return Ok(InvokeOutcome::Halted { node });
            }

            let result = match self.handlers.get(&node) {
                Some(handler) => handler
                    .call(state.clone())
                    .await
                    .map_err(|source| GraphError::NodeExecution {
                        node: node.clone(),
                        source,
                    })?,
                None => NodeResult::State(state.clone()),
            };

            let goto = match result {
                NodeResult::State(output) => {
                    state = output;
                    None
                }
                NodeResult::Command(command) => {
                    if let Some(update) = command.update {
                        state = update;
                    }
                    command.goto
                }
            };

            let next = match &goto {
                Some(target) => self.resolve_goto(&node, target.clone())?,
                None => self.next_node(&node, &state).map(str::to_string),
            };
            events.node_finished(&node, state.clone(), goto).await?;
            trace!(graph = %self.definition.id, node = %node, "Node finished");
            current = next;
        }

        Ok(InvokeOutcome::Completed(state))
    }
}
