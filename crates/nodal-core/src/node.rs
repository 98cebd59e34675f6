//! The node record stored at each graph vertex.
//!
//! A [`Node`] couples a registry type name with its parameter values, literal
//! input values, last-computed outputs, and evaluation bookkeeping (dirty
//! flag, last error). All maps are [`IndexMap`] so serialization is
//! deterministic -- the engine's fingerprinting depends on never iterating an
//! unordered map for hash-affecting data.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A set of named socket values (inputs, outputs, or parameters).
pub type ValueMap = IndexMap<String, Value>;

/// A computation node in the model graph.
///
/// Outputs are only trustworthy when `dirty == false` and `last_error` is
/// `None`; anything else means the node must be re-evaluated before its
/// outputs can be used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Registry key identifying the node definition (e.g. `"Solid::Box"`).
    pub type_name: String,
    /// Parameter values keyed by parameter name.
    #[serde(default)]
    pub params: ValueMap,
    /// Literal values for input sockets. A socket fed by an edge resolves
    /// from the upstream output instead, overriding any literal here.
    #[serde(default)]
    pub inputs: ValueMap,
    /// Outputs from the most recent successful evaluation.
    #[serde(default)]
    pub outputs: ValueMap,
    /// Whether the node needs recomputation before its outputs are current.
    pub dirty: bool,
    /// Error message from the most recent failed evaluation attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Node {
    /// Creates a new node of the given registry type. New nodes start dirty.
    pub fn new(type_name: impl Into<String>) -> Self {
        Node {
            type_name: type_name.into(),
            params: ValueMap::new(),
            inputs: ValueMap::new(),
            outputs: ValueMap::new(),
            dirty: true,
            last_error: None,
        }
    }

    /// Builder: sets a parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Builder: sets a literal input socket value.
    pub fn with_input(mut self, socket: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(socket.into(), value.into());
        self
    }

    /// The category portion of the type name: everything before the first
    /// `::`, or the whole name if there is no separator. Used for per-category
    /// timing breakdowns.
    pub fn category(&self) -> &str {
        self.type_name
            .split_once("::")
            .map(|(head, _)| head)
            .unwrap_or(&self.type_name)
    }
}
