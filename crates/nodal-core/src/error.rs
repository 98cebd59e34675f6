//! Core error types for nodal-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the graph data model.

use crate::id::{EdgeId, NodeId};
use thiserror::Error;

/// Errors produced by the nodal-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node ID was not found in the graph.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// An edge ID was not found in the graph.
    #[error("edge not found: EdgeId({id})", id = id.0)]
    EdgeNotFound { id: EdgeId },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    /// A value was accessed as the wrong variant.
    #[error("value type mismatch: expected {expected}, got {got}")]
    ValueType {
        expected: &'static str,
        got: &'static str,
    },

    /// Graph save/load I/O failure.
    #[error("graph io: {0}")]
    Io(#[from] std::io::Error),

    /// Graph (de)serialization failure.
    #[error("graph serialization: {0}")]
    Serde(#[from] serde_json::Error),
}
