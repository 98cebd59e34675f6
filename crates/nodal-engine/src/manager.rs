//! Graph manager: single source of truth for the current model and its
//! dirty set.
//!
//! [`GraphManager`] owns the [`ModelGraph`] and a dirty index kept in sync
//! with each node's `dirty` flag. Structural and parameter mutations go
//! through it and flag the affected node; [`GraphManager::dirty_nodes`]
//! expands the flagged set with its transitive downstream closure, because an
//! upstream output change invalidates every downstream fingerprint.
//!
//! During evaluation the engine writes results back through the narrow
//! [`apply_outputs`](GraphManager::apply_outputs) /
//! [`record_failure`](GraphManager::record_failure) operations. The `&mut`
//! borrow the engine holds for the whole run is what guarantees no other
//! writer touches a node's outputs mid-evaluation.
//!
//! All operations are synchronous and local; no I/O happens here.

use std::collections::{HashSet, VecDeque};

use nodal_core::{CoreError, EdgeId, ModelGraph, Node, NodeId, Value};

/// How to treat dirty flags when a graph is installed wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyPolicy {
    /// Flag every node; all outputs will be re-derived.
    MarkAll,
    /// Keep the flags the graph carries. A saved document with populated
    /// outputs loads clean and costs nothing until edited.
    TrustOutputs,
}

/// Owns the current graph and tracks which nodes need recomputation.
#[derive(Debug, Default)]
pub struct GraphManager {
    graph: ModelGraph,
    dirty: HashSet<NodeId>,
}

impl GraphManager {
    /// Creates a manager over an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the graph wholesale.
    pub fn set_graph(&mut self, graph: ModelGraph, policy: DirtyPolicy) {
        self.graph = graph;
        self.dirty.clear();
        match policy {
            DirtyPolicy::MarkAll => {
                let ids: Vec<NodeId> = self.graph.node_ids().collect();
                for id in ids {
                    self.flag(id);
                }
            }
            DirtyPolicy::TrustOutputs => {
                let flagged: Vec<NodeId> = self
                    .graph
                    .node_ids()
                    .filter(|&id| self.graph.node(id).map(|n| n.dirty).unwrap_or(false))
                    .collect();
                self.dirty.extend(flagged);
            }
        }
    }

    /// Adds a node. New nodes are always dirty.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = self.graph.add_node(node);
        self.flag(id);
        id
    }

    /// Removes a node and its edges. Downstream nodes lose an input, so they
    /// are flagged dirty before the removal.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, CoreError> {
        let dependents: Vec<NodeId> = self.graph.dependents(id).collect();
        let removed = self.graph.remove_node(id)?;
        self.dirty.remove(&id);
        for dependent in dependents {
            self.flag(dependent);
        }
        Ok(removed)
    }

    /// Connects two sockets and flags the target dirty.
    pub fn connect(
        &mut self,
        source: NodeId,
        source_socket: impl Into<String>,
        target: NodeId,
        target_socket: impl Into<String>,
    ) -> Result<EdgeId, CoreError> {
        let edge = self
            .graph
            .connect(source, source_socket, target, target_socket)?;
        self.flag(target);
        Ok(edge)
    }

    /// Removes an edge and flags its target dirty.
    pub fn disconnect(&mut self, id: EdgeId) -> Result<(), CoreError> {
        let target = self.graph.edge_endpoints(id).map(|(_, t)| t);
        self.graph.disconnect(id)?;
        if let Some(target) = target {
            self.flag(target);
        }
        Ok(())
    }

    /// Sets a parameter value and flags the node dirty.
    pub fn set_param(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), CoreError> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or(CoreError::NodeNotFound { id })?;
        node.params.insert(name.into(), value);
        self.flag(id);
        Ok(())
    }

    /// Sets a literal input socket value and flags the node dirty.
    pub fn set_input(
        &mut self,
        id: NodeId,
        socket: impl Into<String>,
        value: Value,
    ) -> Result<(), CoreError> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or(CoreError::NodeNotFound { id })?;
        node.inputs.insert(socket.into(), value);
        self.flag(id);
        Ok(())
    }

    /// Explicitly flags a node dirty.
    pub fn mark_dirty(&mut self, id: NodeId) -> Result<(), CoreError> {
        if !self.graph.contains_node(id) {
            return Err(CoreError::NodeNotFound { id });
        }
        self.flag(id);
        Ok(())
    }

    /// Explicitly clears a node's dirty flag without touching its outputs.
    pub fn mark_clean(&mut self, id: NodeId) -> Result<(), CoreError> {
        let node = self
            .graph
            .node_mut(id)
            .ok_or(CoreError::NodeNotFound { id })?;
        node.dirty = false;
        self.dirty.remove(&id);
        Ok(())
    }

    /// The flagged nodes plus every node transitively reachable downstream
    /// of one. This is the set the evaluator must re-derive: a node is only
    /// safe to skip when none of its transitive inputs changed.
    pub fn dirty_nodes(&self) -> HashSet<NodeId> {
        let mut affected: HashSet<NodeId> = self.dirty.clone();
        let mut queue: VecDeque<NodeId> = self.dirty.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            for dependent in self.graph.dependents(id) {
                if affected.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        affected
    }

    /// `true` if no node is flagged dirty.
    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Current graph snapshot.
    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    // -----------------------------------------------------------------------
    // Evaluation write-backs (the narrow "output sink")
    // -----------------------------------------------------------------------

    /// Stores fresh outputs on a node, clearing its dirty flag and any
    /// previous error. Called by the evaluator for computed and cached
    /// results alike.
    pub fn apply_outputs(&mut self, id: NodeId, outputs: nodal_core::ValueMap) {
        if let Some(node) = self.graph.node_mut(id) {
            node.outputs = outputs;
            node.dirty = false;
            node.last_error = None;
            self.dirty.remove(&id);
        }
    }

    /// Records a failed evaluation attempt: the error message is stored and
    /// the node stays dirty so its stale outputs are never trusted.
    pub fn record_failure(&mut self, id: NodeId, message: impl Into<String>) {
        if let Some(node) = self.graph.node_mut(id) {
            node.last_error = Some(message.into());
            node.dirty = true;
            self.dirty.insert(id);
        }
    }

    fn flag(&mut self, id: NodeId) {
        if let Some(node) = self.graph.node_mut(id) {
            node.dirty = true;
            self.dirty.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodal_core::ValueMap;

    /// Helper: chain a -> b -> c plus an independent d.
    fn build_chain() -> (GraphManager, NodeId, NodeId, NodeId, NodeId) {
        let mut mgr = GraphManager::new();
        let a = mgr.add_node(Node::new("Solid::Box"));
        let b = mgr.add_node(Node::new("Transform::Move"));
        let c = mgr.add_node(Node::new("Analysis::Volume"));
        let d = mgr.add_node(Node::new("Solid::Sphere"));
        mgr.connect(a, "shape", b, "shape").unwrap();
        mgr.connect(b, "shape", c, "shape").unwrap();
        (mgr, a, b, c, d)
    }

    /// Helper: clear all dirty flags.
    fn clean_all(mgr: &mut GraphManager) {
        let ids: Vec<NodeId> = mgr.graph().node_ids().collect();
        for id in ids {
            mgr.mark_clean(id).unwrap();
        }
    }

    #[test]
    fn new_nodes_are_dirty() {
        let (mgr, a, b, c, d) = build_chain();
        let dirty = mgr.dirty_nodes();
        assert_eq!(dirty.len(), 4);
        for id in [a, b, c, d] {
            assert!(dirty.contains(&id));
        }
    }

    #[test]
    fn set_param_propagates_downstream_only() {
        let (mut mgr, a, b, c, d) = build_chain();
        clean_all(&mut mgr);
        assert!(mgr.is_clean());

        mgr.set_param(a, "width", Value::Float(12.0)).unwrap();

        let dirty = mgr.dirty_nodes();
        assert!(dirty.contains(&a));
        assert!(dirty.contains(&b), "direct dependent must be affected");
        assert!(dirty.contains(&c), "transitive dependent must be affected");
        assert!(!dirty.contains(&d), "independent node must not be affected");
    }

    #[test]
    fn mid_chain_change_does_not_affect_upstream() {
        let (mut mgr, a, b, c, _d) = build_chain();
        clean_all(&mut mgr);

        mgr.set_param(b, "offset", Value::Vector([1.0, 0.0, 0.0]))
            .unwrap();

        let dirty = mgr.dirty_nodes();
        assert!(!dirty.contains(&a), "upstream must stay clean");
        assert!(dirty.contains(&b));
        assert!(dirty.contains(&c));
    }

    #[test]
    fn connect_and_disconnect_flag_the_target() {
        let (mut mgr, a, _b, _c, d) = build_chain();
        clean_all(&mut mgr);

        let edge = mgr.connect(a, "shape", d, "tool").unwrap();
        assert!(mgr.dirty_nodes().contains(&d));

        clean_all(&mut mgr);
        mgr.disconnect(edge).unwrap();
        assert!(mgr.dirty_nodes().contains(&d));
        assert!(!mgr.dirty_nodes().contains(&a));
    }

    #[test]
    fn remove_node_flags_dependents() {
        let (mut mgr, a, b, c, _d) = build_chain();
        clean_all(&mut mgr);

        mgr.remove_node(a).unwrap();

        let dirty = mgr.dirty_nodes();
        assert!(dirty.contains(&b));
        assert!(dirty.contains(&c));
        assert!(mgr.graph().node(a).is_none());
    }

    #[test]
    fn set_graph_mark_all_flags_everything() {
        let (mgr, ..) = build_chain();
        let mut graph = mgr.graph().clone();
        // Pretend the graph was saved clean.
        let ids: Vec<NodeId> = graph.node_ids().collect();
        for id in &ids {
            graph.node_mut(*id).unwrap().dirty = false;
        }

        let mut fresh = GraphManager::new();
        fresh.set_graph(graph.clone(), DirtyPolicy::MarkAll);
        assert_eq!(fresh.dirty_nodes().len(), 4);

        let mut trusting = GraphManager::new();
        trusting.set_graph(graph, DirtyPolicy::TrustOutputs);
        assert!(trusting.is_clean());
    }

    #[test]
    fn set_graph_trust_outputs_respects_carried_flags() {
        let (mgr, a, ..) = build_chain();
        let mut graph = mgr.graph().clone();
        let ids: Vec<NodeId> = graph.node_ids().collect();
        for id in &ids {
            graph.node_mut(*id).unwrap().dirty = false;
        }
        graph.node_mut(a).unwrap().dirty = true;

        let mut mgr2 = GraphManager::new();
        mgr2.set_graph(graph, DirtyPolicy::TrustOutputs);

        // a plus its downstream chain.
        assert_eq!(mgr2.dirty_nodes().len(), 3);
    }

    #[test]
    fn apply_outputs_cleans_and_record_failure_dirties() {
        let (mut mgr, a, ..) = build_chain();

        let mut outputs = ValueMap::new();
        outputs.insert("shape".into(), Value::Int(1));
        mgr.apply_outputs(a, outputs);

        let node = mgr.graph().node(a).unwrap();
        assert!(!node.dirty);
        assert!(node.last_error.is_none());
        assert_eq!(node.outputs.len(), 1);

        mgr.record_failure(a, "kernel rejected parameters");
        let node = mgr.graph().node(a).unwrap();
        assert!(node.dirty);
        assert_eq!(
            node.last_error.as_deref(),
            Some("kernel rejected parameters")
        );
        assert!(mgr.dirty_nodes().contains(&a));
    }

    #[test]
    fn mark_dirty_unknown_node_errors() {
        let mut mgr = GraphManager::new();
        assert!(matches!(
            mgr.mark_dirty(NodeId(7)),
            Err(CoreError::NodeNotFound { .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Dirtying one node in a random DAG affects exactly that node
            /// plus its downstream closure, and nothing else.
            #[test]
            fn dirty_closure_is_exact(
                edges in proptest::collection::vec((0u32..10, 0u32..10), 0..25),
                seed in 0u32..10,
            ) {
                let mut mgr = GraphManager::new();
                let ids: Vec<NodeId> =
                    (0..10).map(|_| mgr.add_node(Node::new("Test::Node"))).collect();
                // Orient every edge low -> high so the graph stays acyclic.
                for (a, b) in edges {
                    if a < b {
                        mgr.connect(ids[a as usize], "out", ids[b as usize], "in").unwrap();
                    }
                }
                for id in ids.clone() {
                    mgr.mark_clean(id).unwrap();
                }

                let seed_id = ids[seed as usize];
                mgr.mark_dirty(seed_id).unwrap();
                let dirty = mgr.dirty_nodes();

                // Reference closure by brute-force reachability.
                let mut expected = std::collections::HashSet::new();
                expected.insert(seed_id);
                loop {
                    let mut grew = false;
                    for &id in &ids {
                        if expected.contains(&id) {
                            for dep in mgr.graph().dependents(id) {
                                grew |= expected.insert(dep);
                            }
                        }
                    }
                    if !grew {
                        break;
                    }
                }

                prop_assert_eq!(dirty, expected);
            }
        }
    }
}
