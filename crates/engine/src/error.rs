//! Engine-level error types.

use thiserror::Error;

use nodes::NodeError;

/// Errors produced by the engine (registration, planning, execution).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    // ------ Registration / planning errors ------

    /// A node with this ID is already registered.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNode(String),

    /// A node depends on an ID that is not registered.
    #[error("node '{node_id}' depends on unknown node '{dependency}'")]
    MissingDependency {
        node_id: String,
        dependency: String,
    },

    /// A node lists itself as a dependency.
    #[error("node '{0}' depends on itself")]
    SelfDependency(String),

    /// These nodes could not be scheduled; they form one or more cycles.
    #[error("dependency cycle detected among nodes: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    // ------ Execution errors ------

    /// A node exhausted its attempts and its strategy escalated the failure.
    #[error("node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },
}

impl EngineError {
    /// Whether this is a node failure caused by its attempt deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NodeFailed { source, .. } if source.is_timeout())
    }
}
