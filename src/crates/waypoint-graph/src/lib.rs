//! # waypoint-graph
//!
//! Graph-side building blocks of the waypoint workflow engine:
//!
//! - [`GraphDefinition`]: the declarative description of a workflow (nodes,
//!   edges, routing conditions, human-intervention nodes)
//! - [`Invocable`]: the contract an executable graph fulfils towards the engine
//! - [`event`]: the bounded `node:start` / `node:end` channel through which a
//!   running graph reports progress and receives [`Directive`]s
//! - [`CompiledGraph`]: a sequential executor binding [`NodeHandler`]s to a
//!   definition
//! - [`GraphCatalog`] / [`GraphRegistry`]: lookup of executables by workflow id
//!
//! The engine crate owns persistence and the pause/resume protocol; nothing in
//! this crate touches storage.

pub mod catalog;
pub mod compiled;
pub mod condition;
pub mod definition;
pub mod error;
pub mod event;
pub mod invocable;

pub use catalog::{GraphCatalog, GraphRegistry};
pub use compiled::{
    handler_fn, Command, CompiledGraph, FnHandler, GraphBuilder, NodeHandler, NodeResult,
    DEFAULT_MAX_STEPS,
};
pub use condition::Condition;
pub use definition::{EdgeSpec, GraphDefinition, HumanNodeSettings, NodeSpec, END, START};
pub use error::{BoxError, GraphError, Result};
pub use event::{Directive, NodeEvent, NodeEventReceiver, NodeEventSender};
pub use invocable::{Invocable, Invocation, InvokeOutcome};
