//! Declarative graph definitions
//!
//! A [`GraphDefinition`] is the immutable description of a workflow: its nodes,
//! the edges between them and the routing conditions on those edges. It is
//! produced by whatever authors workflows (a visual editor, a JSON file, code)
//! and consumed read-only by the engine.
//!
//! ```text
//! START ──▶ draft ──▶ review(human) ──▶ publish ──▶ END
//!                          │
//!                          └── "approved == false" ──▶ draft
//! ```
//!
//! Two reserved endpoints exist: [`START`] may appear as an edge source to mark
//! the entry node, and [`END`] may appear as an edge target to terminate the
//! traversal. Neither may be used as a node id.

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Reserved edge source marking the entry node
pub const START: &str = "START";

/// Reserved edge target marking termination
pub const END: &str = "END";

/// Node type that marks a human-intervention node
pub const HUMAN_NODE_TYPE: &str = "human";

fn default_node_type() -> String {
    "task".to_string()
}

/// A single node in a graph definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within the graph
    pub id: String,

    /// Node type; `"human"` marks a human-intervention node
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,

    /// Free-form node configuration
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl NodeSpec {
    /// Create a node with the default `task` type
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: default_node_type(),
            config: HashMap::new(),
        }
    }

    /// Create a human-intervention node
    pub fn human(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: HUMAN_NODE_TYPE.to_string(),
            config: HashMap::new(),
        }
    }

    /// Set a configuration value
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Whether reaching this node suspends the run until a human responds
    pub fn is_human(&self) -> bool {
        self.node_type == HUMAN_NODE_TYPE
            || self
                .config
                .get("human_intervention")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Intervention settings taken from the node's configuration
    pub fn human_settings(&self) -> HumanNodeSettings {
        HumanNodeSettings {
            prompt: self
                .config
                .get("prompt")
                .and_then(Value::as_str)
                .map(str::to_string),
            options: self.config.get("options").filter(|v| !v.is_null()).cloned(),
            priority: self.config.get("priority").and_then(Value::as_i64),
            expires_in_minutes: self.config.get("expires_in_minutes").and_then(Value::as_i64),
        }
    }
}

/// Optional intervention settings declared on a human node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HumanNodeSettings {
    /// Text shown to the responder
    pub prompt: Option<String>,
    /// Choices offered to the responder
    pub options: Option<Value>,
    /// Queue priority (higher first)
    pub priority: Option<i64>,
    /// Minutes until the request expires
    pub expires_in_minutes: Option<i64>,
}

/// A directed edge, optionally guarded by a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Source node id, or [`START`]
    #[serde(alias = "source_id")]
    pub source: String,

    /// Target node id, or [`END`]
    #[serde(alias = "target_id")]
    pub target: String,

    /// Routing condition evaluated against the source node's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl EdgeSpec {
    /// Unconditional edge
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    /// Edge taken only when `condition` holds
    pub fn conditional(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: Some(condition.into()),
        }
    }
}

/// Immutable description of a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Workflow id the graph is registered under
    pub id: String,

    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Nodes in declaration order
    pub nodes: Vec<NodeSpec>,

    /// Edges in declaration order; routing picks the first matching edge
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl GraphDefinition {
    /// Create an empty definition
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a node
    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append an edge
    pub fn with_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    /// Parse and validate a JSON definition
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Parse and validate a YAML definition
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let definition: Self = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check structural invariants
    ///
    /// Rejects empty graphs, duplicate or reserved node ids, edges whose
    /// endpoints do not exist, edges into [`START`] or out of [`END`], and more
    /// than one entry edge.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(GraphError::Validation(format!(
                "Graph '{}' has no nodes",
                self.id
            )));
        }

        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(GraphError::Validation("Node id must not be empty".into()));
            }
            if node.id == START || node.id == END {
                return Err(GraphError::Validation(format!(
                    "'{}' is reserved and cannot be used as a node id",
                    node.id
                )));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::Validation(format!(
                    "Duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let mut entry_edges = 0;
        for edge in &self.edges {
            if edge.source == END {
                return Err(GraphError::Validation(format!(
                    "Edge cannot leave '{}' (target '{}')",
                    END, edge.target
                )));
            }
            if edge.target == START {
                return Err(GraphError::Validation(format!(
                    "Edge cannot enter '{}' (source '{}')",
                    START, edge.source
                )));
            }
            if edge.source == START {
                entry_edges += 1;
            } else if !ids.contains(edge.source.as_str()) {
                return Err(GraphError::Validation(format!(
                    "Edge source '{}' does not exist",
                    edge.source
                )));
            }
            if edge.target != END && !ids.contains(edge.target.as_str()) {
                return Err(GraphError::Validation(format!(
                    "Edge target '{}' does not exist",
                    edge.target
                )));
            }
        }

        if entry_edges > 1 {
            return Err(GraphError::Validation(format!(
                "Graph '{}' declares {} entry edges; expected at most one",
                self.id, entry_edges
            )));
        }

        Ok(())
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Whether `id` names a human-intervention node
    pub fn is_human_node(&self, id: &str) -> bool {
        self.node(id).map(NodeSpec::is_human).unwrap_or(false)
    }

    /// Outgoing edges of `id`, in declaration order
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeSpec> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Node traversal begins at
    ///
    /// The target of the [`START`] edge if one exists, otherwise the first
    /// declared node with no incoming edge, otherwise the first declared node.
    pub fn entry_node(&self) -> Option<&str> {
        if let Some(edge) = self.edges.iter().find(|e| e.source == START) {
            return Some(edge.target.as_str());
        }

        let targets: HashSet<&str> = self
            .edges
            .iter()
            .filter(|e| e.source != START)
            .map(|e| e.target.as_str())
            .collect();

        self.nodes
            .iter()
            .find(|n| !targets.contains(n.id.as_str()))
            .or_else(|| self.nodes.first())
            .map(|n| n.id.as_str())
    }
}
