//! Lookup of executable graphs by workflow id

use crate::compiled::CompiledGraph;
use crate::definition::GraphDefinition;
use crate::invocable::Invocable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of graph definitions and their executables
pub trait GraphCatalog: Send + Sync {
    /// Definition registered under `workflow_id`
    fn definition(&self, workflow_id: &str) -> Option<Arc<GraphDefinition>>;

    /// Executable registered under `workflow_id`
    fn invocable(&self, workflow_id: &str) -> Option<Arc<dyn Invocable>>;
}

#[derive(Clone)]
struct Entry {
    definition: Arc<GraphDefinition>,
    invocable: Arc<dyn Invocable>,
}

/// In-memory [`GraphCatalog`]
#[derive(Default)]
pub struct GraphRegistry {
    graphs: RwLock<HashMap<String, Entry>>,
}

impl GraphRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled graph under its definition's id, replacing any
    /// previous registration
    pub fn register(&self, graph: CompiledGraph) {
        let definition = graph.definition_arc();
        self.register_invocable(definition, Arc::new(graph));
    }

    /// Register any [`Invocable`] together with the definition describing it
    pub fn register_invocable(&self, definition: Arc<GraphDefinition>, invocable: Arc<dyn Invocable>) {
        tracing::debug!(workflow_id = %definition.id, "Registering graph");
        self.graphs.write().insert(
            definition.id.clone(),
            Entry {
                definition,
                invocable,
            },
        );
    }

    /// Remove a registration
    pub fn unregister(&self, workflow_id: &str) -> bool {
        self.graphs.write().remove(workflow_id).is_some()
    }

    /// Registered workflow ids, sorted
    pub fn workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.graphs.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for GraphRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRegistry")
            .field("workflow_ids", &self.workflow_ids())
            .finish()
    }
}

impl GraphCatalog for GraphRegistry {
    fn definition(&self, workflow_id: &str) -> Option<Arc<GraphDefinition>> {
        self.graphs
            .read()
            .get(workflow_id)
            .map(|entry| Arc::clone(&entry.definition))
    }

    fn invocable(&self, workflow_id: &str) -> Option<Arc<dyn Invocable>> {
        self.graphs
            .read()
            .get(workflow_id)
            .map(|entry| Arc::clone(&entry.invocable))
    }
}
