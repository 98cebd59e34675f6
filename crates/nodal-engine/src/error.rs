//! Engine error types.
//!
//! The taxonomy separates three failure scopes:
//!
//! - [`EngineError`]: structural failures detected before any node runs.
//!   These abort the whole run with no graph mutation.
//! - [`EvalError`]: a single node's evaluation failed. Recorded on that node
//!   and its dependents; sibling branches are unaffected. `Cancelled` is a
//!   distinct variant so cancelled nodes are never counted as failures.
//! - [`BackendError`]: the compute backend rejected or could not service a
//!   request. Surfaces per node as an `EvalError`; `Unavailable` carries a
//!   `retryable` flag the backend reports, but the engine itself never
//!   retries.

use nodal_core::NodeId;
use thiserror::Error;

/// Run-level structural errors. Fatal to the run, detected before dispatch.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A dependency cycle exists among the nodes pending evaluation.
    #[error("cycle detected among {} nodes pending evaluation", nodes.len())]
    CycleDetected {
        /// The nodes participating in (or downstream of) the cycle.
        nodes: Vec<NodeId>,
    },

    /// An edge references a node missing from the graph.
    #[error("graph structure: {0}")]
    Structure(#[from] nodal_core::CoreError),
}

/// Per-node evaluation errors. Never escape the run; always converted into a
/// recorded outcome for the node concerned.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// No definition registered for the node's type name.
    #[error("unknown node type: '{0}'")]
    UnknownType(String),

    /// A required input socket had no value.
    #[error("missing input '{socket}'")]
    MissingInput { socket: String },

    /// An input or parameter had the wrong shape.
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// The compute backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The node definition failed for its own reasons.
    #[error("{0}")]
    Failed(String),

    /// The run was cancelled before or during this node's evaluation.
    #[error("evaluation cancelled")]
    Cancelled,
}

/// Errors from the compute backend boundary.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend is not initialized or has gone away.
    #[error("compute backend unavailable: {reason}")]
    Unavailable { reason: String, retryable: bool },

    /// The backend rejected or failed a specific operation.
    #[error("backend operation '{operation}' failed: {message}")]
    Operation { operation: String, message: String },

    /// The request was aborted, typically by `cancel_all`.
    #[error("backend request aborted")]
    Aborted,
}

impl EvalError {
    /// `true` if this error represents cancellation rather than failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            EvalError::Cancelled | EvalError::Backend(BackendError::Aborted)
        )
    }
}
