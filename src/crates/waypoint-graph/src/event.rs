//! Node lifecycle events
//!
//! A graph reports progress to whoever runs it over a bounded channel. Every
//! node invocation produces a `node:start` event before the node's logic runs
//! and a `node:end` event after it returns. The start event carries a
//! one-shot reply slot: the graph waits for a [`Directive`] before running
//! the node, which lets the listener persist the start, suspend the run at a
//! human node, or stop a cancelled run.

use crate::error::{GraphError, Result};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Listener's answer to a `node:start` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Run the node
    Proceed,
    /// Stop traversal before the node runs
    Halt,
}

/// Lifecycle event emitted by a graph
#[derive(Debug)]
pub enum NodeEvent {
    /// A node is about to run
    Started {
        node: String,
        inputs: Value,
        reply: oneshot::Sender<Directive>,
    },
    /// A node returned successfully
    ///
    /// `goto` is the successor the node chose explicitly through a
    /// [`Command`](crate::Command); `None` means edges decide.
    Finished {
        node: String,
        outputs: Value,
        goto: Option<String>,
    },
}

impl NodeEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            NodeEvent::Started { .. } => "node:start",
            NodeEvent::Finished { .. } => "node:end",
        }
    }

    /// Node the event belongs to
    pub fn node(&self) -> &str {
        match self {
            NodeEvent::Started { node, .. } | NodeEvent::Finished { node, .. } => node,
        }
    }
}

/// Receiving half of the event channel
pub type NodeEventReceiver = mpsc::Receiver<NodeEvent>;

/// Sending half of the event channel, held by the graph
#[derive(Debug, Clone)]
pub struct NodeEventSender {
    inner: mpsc::Sender<NodeEvent>,
}

/// Create a bounded event channel
pub fn channel(buffer: usize) -> (NodeEventSender, NodeEventReceiver) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (NodeEventSender { inner: tx }, rx)
}

impl NodeEventSender {
    /// Announce a node start and wait for the listener's directive
    pub async fn node_started(&self, node: &str, inputs: Value) -> Result<Directive> {
        let (reply, directive) = oneshot::channel();
        self.inner
            .send(NodeEvent::Started {
                node: node.to_string(),
                inputs,
                reply,
            })
            .await
            .map_err(|_| GraphError::Channel(format!("listener gone before '{}' started", node)))?;

        directive
            .await
            .map_err(|_| GraphError::Channel(format!("no directive received for '{}'", node)))
    }

    /// Announce a node's successful completion
    pub async fn node_finished(&self, node: &str, outputs: Value, goto: Option<String>) -> Result<()> {
        self.inner
            .send(NodeEvent::Finished {
                node: node.to_string(),
                outputs,
                goto,
            })
            .await
            .map_err(|_| GraphError::Channel(format!("listener gone before '{}' finished", node)))
    }
}
