//! Dependency Graph
//!
//! This module implements the bookkeeping structure behind the reactive
//! cells: an arena of node slots and an arena of link records.
//!
//! # Overview
//!
//! - Nodes are state cells, computed cells, volatile sources and watchers.
//! - A link connects one producer to one consumer. The same record sits in
//!   the producer's subscriber list and in the consumer's dependency list, so
//!   either side can splice it out in O(1).
//!
//! # Design Decisions
//!
//! 1. Both arenas are plain vectors with a free list. Records refer to each
//!    other by index, which keeps the doubly linked lists free of aliasing.
//!
//! 2. An edge index maps `(producer, consumer)` to its link. It lets a
//!    consumer recognise a producer it already depends on without walking its
//!    dependency list, and lets a watcher drop one edge in O(1).
//!
//! 3. The graph never calls user code. Callers borrow it, mutate it and
//!    release it before running derivations, hooks or notifications.

mod link;
mod node;
mod propagate;

use std::collections::HashMap;
use std::rc::Weak;

pub use node::{NodeFlags, NodeId, NodeKind};

use crate::reactive::Reactive;
use link::{Link, LinkId};
use node::NodeSlot;

/// Arena of nodes and links.
#[derive(Default)]
pub(crate) struct Graph {
    nodes: Vec<Option<NodeSlot>>,
    free_nodes: Vec<usize>,
    links: Vec<Option<Link>>,
    free_links: Vec<usize>,
    edges: HashMap<(NodeId, NodeId), LinkId>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub(crate) fn insert_node(&mut self, kind: NodeKind, handle: Weak<dyn Reactive>) -> NodeId {
        let slot = NodeSlot::new(kind, handle);
        match self.free_nodes.pop() {
            Some(index) => {
                self.nodes[index] = Some(slot);
                NodeId::from_index(index)
            }
            None => {
                self.nodes.push(Some(slot));
                NodeId::from_index(self.nodes.len() - 1)
            }
        }
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub(crate) fn remove_node(&mut self, id: NodeId) -> Option<NodeSlot> {
        self.node(id)?;

        while let Some(link) = self.node(id).and_then(|node| node.deps) {
            self.remove_link(link);
        }
        while let Some(link) = self.node(id).and_then(|node| node.subs) {
            self.remove_link(link);
        }

        self.free_nodes.push(id.index());
        self.nodes[id.index()].take()
    }

    /// Get a reference to a node.
    pub(crate) fn node(&self, id: NodeId) -> Option<&NodeSlot> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a mutable reference to a node.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeSlot> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub(crate) fn slot(&self, id: NodeId) -> &NodeSlot {
        self.node(id).expect("node id refers to a dropped node")
    }

    pub(crate) fn slot_mut(&mut self, id: NodeId) -> &mut NodeSlot {
        self.node_mut(id).expect("node id refers to a dropped node")
    }

    pub(crate) fn flags(&self, id: NodeId) -> NodeFlags {
        self.node(id).map(|node| node.flags).unwrap_or_default()
    }

    pub(crate) fn link(&self, id: LinkId) -> &Link {
        self.links[id.index()]
            .as_ref()
            .expect("link id refers to a removed link")
    }

    pub(crate) fn link_mut(&mut self, id: LinkId) -> &mut Link {
        self.links[id.index()]
            .as_mut()
            .expect("link id refers to a removed link")
    }

    /// Look up the edge between a producer and a consumer.
    pub(crate) fn edge(&self, dep: NodeId, sub: NodeId) -> Option<LinkId> {
        self.edges.get(&(dep, sub)).copied()
    }

    /// Producers read by `sub`, in read order.
    pub(crate) fn sources(&self, sub: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(sub).and_then(|node| node.deps);
        while let Some(id) = cursor {
            let link = self.link(id);
            out.push(link.dep);
            cursor = link.next_dep;
        }
        out
    }

    /// Consumers that read `dep`, in subscription order.
    pub(crate) fn sinks(&self, dep: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(dep).and_then(|node| node.subs);
        while let Some(id) = cursor {
            let link = self.link(id);
            out.push(link.sub);
            cursor = link.next_sub;
        }
        out
    }

    /// Get the total number of nodes in the graph.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Get the total number of links in the graph.
    pub(crate) fn link_count(&self) -> usize {
        self.edges.len()
    }

    fn alloc_link(&mut self, link: Link) -> LinkId {
        match self.free_links.pop() {
            Some(index) => {
                self.links[index] = Some(link);
                LinkId::from_index(index)
            }
            None => {
                self.links.push(Some(link));
                LinkId::from_index(self.links.len() - 1)
            }
        }
    }

    fn free_link(&mut self, id: LinkId) -> Link {
        self.free_links.push(id.index());
        self.links[id.index()]
            .take()
            .expect("link freed twice")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reactive::Detached;

    pub(crate) fn add(graph: &mut Graph, kind: NodeKind) -> NodeId {
        graph.insert_node(kind, Weak::<Detached>::new())
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = Graph::new();

        let id1 = add(&mut graph, NodeKind::State);
        let id2 = add(&mut graph, NodeKind::Computed);

        assert_eq!(graph.node_count(), 2);

        graph.remove_node(id1);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.node(id1).is_none());
        assert!(graph.node(id2).is_some());
    }

    #[test]
    fn node_slots_are_recycled() {
        let mut graph = Graph::new();

        let id1 = add(&mut graph, NodeKind::State);
        graph.remove_node(id1);
        let id2 = add(&mut graph, NodeKind::Computed);

        assert_eq!(id1, id2);
        assert_eq!(graph.slot(id2).kind, NodeKind::Computed);
    }

    #[test]
    fn removing_a_node_drops_its_edges() {
        let mut graph = Graph::new();

        let source = add(&mut graph, NodeKind::State);
        let middle = add(&mut graph, NodeKind::Computed);
        let sink = add(&mut graph, NodeKind::Watcher);

        graph.link_dep(source, middle);
        graph.link_dep(middle, sink);
        assert_eq!(graph.link_count(), 2);

        graph.remove_node(middle);

        assert_eq!(graph.link_count(), 0);
        assert!(graph.sinks(source).is_empty());
        assert!(graph.sources(sink).is_empty());
        assert_eq!(graph.slot(sink).deps_tail, None);
    }
}
