//! Status enums and their transition rules
//!
//! Every status column is guarded twice: the schema's `CHECK` constraint
//! rejects unknown values, and repositories only update rows whose current
//! status may legally move to the target (see `sources_for`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A status string that matches no known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown {kind} status '{value}'")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Database representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Statuses from which a transition to `target` is legal
            pub fn sources_for(target: $name) -> Vec<$name> {
                Self::ALL
                    .iter()
                    .copied()
                    .filter(|s| s.can_transition_to(target))
                    .collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseStatusError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

status_enum! {
    /// Lifecycle of a workflow run
    ExecutionStatus, "execution" {
        /// Recorded, not yet traversing
        Created => "CREATED",
        /// Traversal in progress (or interrupted by a crash)
        Running => "RUNNING",
        /// Suspended, usually at a human node
        Paused => "PAUSED",
        /// Reached the end of the graph
        Completed => "COMPLETED",
        /// A node failed
        Failed => "FAILED",
        /// The engine failed
        Error => "ERROR",
        /// Abandoned by an operator
        Cancelled => "CANCELLED",
    }
}

impl ExecutionStatus {
    /// Whether the run can never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Error
                | ExecutionStatus::Cancelled
        )
    }

    /// Whether moving to `target` is legal; `Running -> Running` is allowed so
    /// that re-entering a crashed run is idempotent
    pub fn can_transition_to(&self, target: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, target) {
            (Created, Running | Paused | Cancelled) => true,
            (Running, Running | Paused | Completed | Failed | Error | Cancelled) => true,
            (Paused, Running | Cancelled) => true,
            _ => false,
        }
    }
}

status_enum! {
    /// Lifecycle of a single node invocation
    NodeStatus, "node" {
        /// Node logic is executing
        Running => "RUNNING",
        /// Node returned output
        Completed => "COMPLETED",
        /// Node failed, or its run was abandoned
        Failed => "FAILED",
        /// An intervention request is open for this node
        WaitingForHuman => "WAITING_FOR_HUMAN",
        /// The run was paused at this node
        Paused => "PAUSED",
        /// A response was recorded; the run has not resumed yet
        Resuming => "RESUMING",
    }
}

impl NodeStatus {
    /// Whether the node execution can never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }

    /// Whether moving to `target` is legal
    pub fn can_transition_to(&self, target: NodeStatus) -> bool {
        use NodeStatus::*;
        match (self, target) {
            (Running, Completed | Failed | WaitingForHuman | Paused) => true,
            (Paused, WaitingForHuman | Completed | Failed) => true,
            (WaitingForHuman, Resuming | Completed | Failed) => true,
            (Resuming, Completed | Failed) => true,
            _ => false,
        }
    }
}

status_enum! {
    /// Lifecycle of an intervention request
    InterventionStatus, "intervention" {
        /// Awaiting a response
        Pending => "PENDING",
        /// A response was recorded
        Answered => "ANSWERED",
        /// Nobody answered in time, or the run went away
        Expired => "EXPIRED",
    }
}

impl InterventionStatus {
    /// Whether the request can never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InterventionStatus::Pending)
    }

    /// Whether moving to `target` is legal
    pub fn can_transition_to(&self, target: InterventionStatus) -> bool {
        matches!(
            (self, target),
            (
                InterventionStatus::Pending,
                InterventionStatus::Answered | InterventionStatus::Expired
            )
        )
    }
}
