// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Handler graph: handlers as nodes, physical links as edges.
//!
//! Adapters are ordinary nodes, so a bridged connection shows up as two
//! edges carrying the same [`ConnectionId`].

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{BTreeSet, HashMap};

use super::connections::ConnectionId;
use crate::core::handler::HandlerId;

#[derive(Debug, Default)]
pub(crate) struct HandlerGraph {
    graph: DiGraph<HandlerId, ConnectionId>,
    nodes: HashMap<HandlerId, NodeIndex>,
}

impl HandlerGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_handler(&mut self, id: &HandlerId) {
        if !self.nodes.contains_key(id) {
            let index = self.graph.add_node(id.clone());
            self.nodes.insert(id.clone(), index);
        }
    }

    /// Record one physical link. Unknown handlers are ignored.
    pub(crate) fn add_link(&mut self, from: &HandlerId, to: &HandlerId, connection: &ConnectionId) {
        if let (Some(&from_idx), Some(&to_idx)) = (self.nodes.get(from), self.nodes.get(to)) {
            self.graph.add_edge(from_idx, to_idx, connection.clone());
        }
    }

    /// Handlers reachable from `id`, not including `id`.
    pub(crate) fn downstream_of(&self, id: &HandlerId) -> BTreeSet<HandlerId> {
        let Some(&start) = self.nodes.get(id) else {
            return BTreeSet::new();
        };

        let mut reached = BTreeSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(index) = bfs.next(&self.graph) {
            if index != start {
                reached.insert(self.graph[index].clone());
            }
        }
        reached
    }

    /// Whether some handler feeds back into itself.
    pub(crate) fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> HandlerId {
        HandlerId::new(s).unwrap()
    }

    fn conn(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    #[test]
    fn test_downstream_excludes_start_and_siblings() {
        let mut graph = HandlerGraph::new();
        for name in ["src", "fx", "sink", "other"] {
            graph.add_handler(&id(name));
        }
        graph.add_link(&id("src"), &id("fx"), &conn("conn_0"));
        graph.add_link(&id("fx"), &id("sink"), &conn("conn_1"));

        let downstream: Vec<String> = graph
            .downstream_of(&id("src"))
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(downstream, vec!["fx", "sink"]);
        assert!(graph.downstream_of(&id("sink")).is_empty());
        assert!(graph.downstream_of(&id("ghost")).is_empty());
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 2);
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_feedback_loop_detected() {
        let mut graph = HandlerGraph::new();
        graph.add_handler(&id("a"));
        graph.add_handler(&id("b"));
        graph.add_handler(&id("a"));
        graph.add_link(&id("a"), &id("b"), &conn("conn_0"));
        graph.add_link(&id("b"), &id("a"), &conn("conn_1"));

        assert_eq!(graph.node_count(), 2);
        assert!(graph.has_cycle());
        // The start node is never reported as its own descendant.
        let downstream = graph.downstream_of(&id("a"));
        assert_eq!(downstream.len(), 1);
        assert!(downstream.contains(&id("b")));
    }
}
