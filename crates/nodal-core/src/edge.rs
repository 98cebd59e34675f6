//! Edge weights for the model graph.
//!
//! A [`SocketEdge`] names the output socket on the source node and the input
//! socket on the target node. Direction is source -> target: the target
//! depends on the source, and the evaluator never runs a target before its
//! sources.

use serde::{Deserialize, Serialize};

/// A directed data connection between two node sockets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketEdge {
    /// Output socket name on the source node.
    pub source_socket: String,
    /// Input socket name on the target node.
    pub target_socket: String,
}

impl SocketEdge {
    pub fn new(source_socket: impl Into<String>, target_socket: impl Into<String>) -> Self {
        SocketEdge {
            source_socket: source_socket.into(),
            target_socket: target_socket.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let edge = SocketEdge::new("shape", "tool");
        let json = serde_json::to_string(&edge).unwrap();
        let back: SocketEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(edge, back);
    }
}
