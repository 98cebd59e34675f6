//! ModelGraph: the parametric model container.
//!
//! [`ModelGraph`] is the single entry point for constructing and querying a
//! model. The node/edge structure lives in a private
//! `StableGraph<Node, SocketEdge>` -- stable indices are what make
//! [`NodeId`]/[`EdgeId`] usable as persistent identifiers across removals.
//! All mutations go through `ModelGraph` methods so endpoint validation
//! cannot be bypassed; read-only accessors are provided for traversals.
//!
//! Cycles are deliberately NOT rejected at connect time: an editor may pass
//! through transient invalid states while rewiring. The evaluator checks for
//! cycles among the nodes it is about to run and fails that run instead.

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::path::Path;

use crate::edge::SocketEdge;
use crate::error::CoreError;
use crate::id::{EdgeId, NodeId};
use crate::node::Node;

/// Current on-disk format version. Bumped when the serialized shape changes.
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// Length unit the model is authored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Millimeters,
    Centimeters,
    Meters,
    Inches,
}

/// An incoming or outgoing connection, as returned by the edge queries.
/// Carries the edge ID, the node on the far end, and the edge weight.
pub type Connection<'a> = (EdgeId, NodeId, &'a SocketEdge);

/// The parametric model: document metadata plus the node/edge structure.
///
/// This is the serialization unit for save/load. Node outputs are persisted
/// along with everything else; whether a loaded graph is trusted clean or
/// re-marked dirty is the caller's decision, not this type's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelGraph {
    /// Format version of this document.
    pub version: u32,
    /// Length unit for all geometric values.
    pub units: Units,
    /// Modeling tolerance in `units`.
    pub tolerance: f64,
    graph: StableGraph<Node, SocketEdge, Directed, u32>,
}

impl Default for ModelGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelGraph {
    /// Creates an empty graph with default units and tolerance.
    pub fn new() -> Self {
        ModelGraph {
            version: GRAPH_FORMAT_VERSION,
            units: Units::default(),
            tolerance: 1e-6,
            graph: StableGraph::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Node methods
    // -----------------------------------------------------------------------

    /// Adds a node and returns its ID.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        NodeId::from(self.graph.add_node(node))
    }

    /// Removes a node and all edges referencing it.
    ///
    /// Returns the removed `Node`. Errors if the node is not found.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, CoreError> {
        let idx: NodeIndex<u32> = id.into();
        self.graph
            .remove_node(idx)
            .ok_or(CoreError::NodeNotFound { id })
    }

    /// Looks up a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id.into())
    }

    /// Looks up a node by ID (mutable).
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.graph.node_weight_mut(id.into())
    }

    /// Returns `true` if the node exists.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.graph.contains_node(id.into())
    }

    /// Iterates all node IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(NodeId::from)
    }

    // -----------------------------------------------------------------------
    // Edge methods
    // -----------------------------------------------------------------------

    /// Connects an output socket on `source` to an input socket on `target`.
    ///
    /// Both nodes must exist. Several edges may target the same socket; the
    /// evaluator then collects the values into a list. Returns the new
    /// [`EdgeId`].
    pub fn connect(
        &mut self,
        source: NodeId,
        source_socket: impl Into<String>,
        target: NodeId,
        target_socket: impl Into<String>,
    ) -> Result<EdgeId, CoreError> {
        let source_idx: NodeIndex<u32> = source.into();
        let target_idx: NodeIndex<u32> = target.into();

        if self.graph.node_weight(source_idx).is_none() {
            return Err(CoreError::NodeNotFound { id: source });
        }
        if self.graph.node_weight(target_idx).is_none() {
            return Err(CoreError::NodeNotFound { id: target });
        }
        if source == target {
            return Err(CoreError::InvalidEdge {
                reason: format!("self-edge on node {source}"),
            });
        }

        let edge = SocketEdge::new(source_socket, target_socket);
        let idx = self.graph.add_edge(source_idx, target_idx, edge);
        Ok(EdgeId::from(idx))
    }

    /// Removes an edge. Returns the removed `SocketEdge`.
    pub fn disconnect(&mut self, id: EdgeId) -> Result<SocketEdge, CoreError> {
        let idx: EdgeIndex<u32> = id.into();
        self.graph
            .remove_edge(idx)
            .ok_or(CoreError::EdgeNotFound { id })
    }

    /// Returns the `(source, target)` node IDs of an edge.
    pub fn edge_endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.graph
            .edge_endpoints(id.into())
            .map(|(s, t)| (NodeId::from(s), NodeId::from(t)))
    }

    /// Edges feeding into `node` (its dependencies).
    pub fn incoming(&self, node: NodeId) -> SmallVec<[Connection<'_>; 4]> {
        self.graph
            .edges_directed(node.into(), Direction::Incoming)
            .map(|e| (EdgeId::from(e.id()), NodeId::from(e.source()), e.weight()))
            .collect()
    }

    /// Edges leaving `node` (its dependents).
    pub fn outgoing(&self, node: NodeId) -> SmallVec<[Connection<'_>; 4]> {
        self.graph
            .edges_directed(node.into(), Direction::Outgoing)
            .map(|e| (EdgeId::from(e.id()), NodeId::from(e.target()), e.weight()))
            .collect()
    }

    /// Node IDs directly downstream of `node`.
    pub fn dependents(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .neighbors_directed(node.into(), Direction::Outgoing)
            .map(NodeId::from)
    }

    /// Node IDs directly upstream of `node`.
    pub fn dependencies(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph
            .neighbors_directed(node.into(), Direction::Incoming)
            .map(NodeId::from)
    }

    // -----------------------------------------------------------------------
    // Query methods
    // -----------------------------------------------------------------------

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Saves the graph as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a graph from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn box_node() -> Node {
        Node::new("Solid::Box")
            .with_param("width", 10.0)
            .with_param("height", 5.0)
    }

    #[test]
    fn add_and_query_nodes() {
        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());
        let b = graph.add_node(Node::new("Boolean::Union"));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.node(a).unwrap().type_name, "Solid::Box");
        assert_eq!(graph.node(b).unwrap().type_name, "Boolean::Union");
        assert!(graph.node(NodeId(99)).is_none());
    }

    #[test]
    fn connect_validates_endpoints() {
        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());

        let result = graph.connect(a, "shape", NodeId(42), "tool");
        assert!(matches!(
            result,
            Err(CoreError::NodeNotFound { id: NodeId(42) })
        ));

        let result = graph.connect(a, "shape", a, "shape");
        assert!(matches!(result, Err(CoreError::InvalidEdge { .. })));
    }

    #[test]
    fn connect_allows_cycles() {
        // Cycles are caught at evaluation time, not insertion time.
        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());
        let b = graph.add_node(Node::new("Transform::Move"));

        graph.connect(a, "shape", b, "shape").unwrap();
        assert!(graph.connect(b, "shape", a, "shape").is_ok());
    }

    #[test]
    fn remove_node_removes_edges() {
        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());
        let b = graph.add_node(Node::new("Transform::Move"));
        let c = graph.add_node(Node::new("Analysis::Volume"));

        graph.connect(a, "shape", b, "shape").unwrap();
        graph.connect(b, "shape", c, "shape").unwrap();
        assert_eq!(graph.edge_count(), 2);

        let removed = graph.remove_node(b).unwrap();
        assert_eq!(removed.type_name, "Transform::Move");
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn stable_ids_survive_removal() {
        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());
        let b = graph.add_node(Node::new("Transform::Move"));
        let c = graph.add_node(Node::new("Analysis::Volume"));

        graph.remove_node(b).unwrap();

        // a and c keep their IDs even after b is gone.
        assert_eq!(graph.node(a).unwrap().type_name, "Solid::Box");
        assert_eq!(graph.node(c).unwrap().type_name, "Analysis::Volume");
    }

    #[test]
    fn incoming_and_outgoing_connections() {
        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());
        let b = graph.add_node(box_node());
        let union = graph.add_node(Node::new("Boolean::Union"));

        graph.connect(a, "shape", union, "shapes").unwrap();
        graph.connect(b, "shape", union, "shapes").unwrap();

        let incoming = graph.incoming(union);
        assert_eq!(incoming.len(), 2);
        assert!(incoming.iter().all(|(_, _, e)| e.target_socket == "shapes"));
        assert_eq!(graph.outgoing(a).len(), 1);
        assert_eq!(graph.dependents(a).count(), 1);
        assert_eq!(graph.dependencies(union).count(), 2);
    }

    #[test]
    fn disconnect_removes_single_edge() {
        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());
        let b = graph.add_node(Node::new("Transform::Move"));
        let edge = graph.connect(a, "shape", b, "shape").unwrap();

        let removed = graph.disconnect(edge).unwrap();
        assert_eq!(removed.source_socket, "shape");
        assert_eq!(graph.edge_count(), 0);
        assert!(matches!(
            graph.disconnect(edge),
            Err(CoreError::EdgeNotFound { .. })
        ));
    }

    #[test]
    fn serde_roundtrip() {
        let mut graph = ModelGraph::new();
        graph.units = Units::Inches;
        graph.tolerance = 1e-4;
        let a = graph.add_node(box_node());
        let b = graph.add_node(Node::new("Transform::Move"));
        graph.connect(a, "shape", b, "shape").unwrap();

        // Populate an output so we can prove outputs persist.
        graph
            .node_mut(a)
            .unwrap()
            .outputs
            .insert("shape".into(), Value::Handle(crate::value::GeometryHandle(1)));

        let json = serde_json::to_string(&graph).unwrap();
        let back: ModelGraph = serde_json::from_str(&json).unwrap();

        assert_eq!(back.version, GRAPH_FORMAT_VERSION);
        assert_eq!(back.units, Units::Inches);
        assert_eq!(back.node_count(), 2);
        assert_eq!(back.edge_count(), 1);
        assert_eq!(back.node(a).unwrap().outputs.len(), 1);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("model.json");

        let mut graph = ModelGraph::new();
        let a = graph.add_node(box_node());
        let b = graph.add_node(Node::new("Analysis::Volume"));
        graph.connect(a, "shape", b, "shape").unwrap();

        graph.save(&path).unwrap();
        let loaded = ModelGraph::load(&path).unwrap();

        assert_eq!(loaded.node_count(), graph.node_count());
        assert_eq!(loaded.edge_count(), graph.edge_count());
        assert_eq!(loaded.node(a).unwrap().type_name, "Solid::Box");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// After any sequence of node removals, every remaining edge
            /// still references two live nodes.
            #[test]
            fn edges_never_dangle(removals in proptest::collection::vec(0u32..8, 0..8)) {
                let mut graph = ModelGraph::new();
                let ids: Vec<NodeId> =
                    (0..8).map(|_| graph.add_node(Node::new("Test::Node"))).collect();
                // Chain plus a few cross links.
                for pair in ids.windows(2) {
                    graph.connect(pair[0], "out", pair[1], "in").unwrap();
                }
                graph.connect(ids[0], "out", ids[4], "in").unwrap();
                graph.connect(ids[2], "out", ids[6], "in").unwrap();

                for r in removals {
                    let _ = graph.remove_node(NodeId(r));
                }

                for node in graph.node_ids().collect::<Vec<_>>() {
                    for (_, other, _) in graph.incoming(node) {
                        prop_assert!(graph.contains_node(other));
                    }
                    for (_, other, _) in graph.outgoing(node) {
                        prop_assert!(graph.contains_node(other));
                    }
                }
            }
        }
    }
}
