//! Links and dependency tracking.
//!
//! A [`Link`] is the edge record between one producer and one consumer. It is
//! threaded through two doubly linked lists at once: the producer's
//! subscribers (`prev_sub`/`next_sub`) and the consumer's dependencies
//! (`prev_dep`/`next_dep`).
//!
//! While a consumer evaluates, `deps_tail` is a cursor over its dependency
//! list. Reads that happen in the same order as last time simply advance the
//! cursor over existing links. Whatever is left past the cursor when the
//! evaluation ends was not read again and is pruned.

use smallvec::SmallVec;

use super::{Graph, NodeFlags, NodeId, NodeKind};

/// Index of a link in the link arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LinkId(u32);

impl LinkId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An edge shared by a producer's subscriber list and a consumer's dependency list.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub(crate) dep: NodeId,
    pub(crate) sub: NodeId,

    /// Version of `dep` when `sub` last read it.
    pub(crate) version: u64,

    /// Epoch of `sub` when it last read `dep`.
    pub(crate) epoch: u64,

    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,
    pub(crate) prev_dep: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,
}

impl Graph {
    /// Begin a tracked evaluation of `sub`.
    pub(crate) fn start_track(&mut self, sub: NodeId) {
        let node = self.slot_mut(sub);
        node.deps_tail = None;
        node.epoch += 1;
        node.flags.remove(NodeFlags::STALE);
        node.flags.insert(NodeFlags::TRACKING);
    }

    /// Record that `sub` read `dep`.
    ///
    /// Also used to attach a watcher to a watched node; a watcher never
    /// starts a tracked evaluation, so its cursor is always its last link.
    pub(crate) fn link_dep(&mut self, dep: NodeId, sub: NodeId) {
        let (tail, head, epoch) = {
            let node = self.slot(sub);
            (node.deps_tail, node.deps, node.epoch)
        };

        // Same producer read twice in a row.
        if let Some(tail) = tail {
            if self.link(tail).dep == dep {
                self.touch(tail);
                return;
            }
        }

        // Same producer in the same position as last evaluation.
        let next = match tail {
            Some(tail) => self.link(tail).next_dep,
            None => head,
        };
        if let Some(next) = next {
            if self.link(next).dep == dep {
                self.slot_mut(sub).deps_tail = Some(next);
                self.touch(next);
                return;
            }
        }

        if let Some(existing) = self.edge(dep, sub) {
            if self.link(existing).epoch != epoch {
                // Read last time but further down the list: move it up.
                self.unlink_dep(existing);
                self.insert_dep_after(existing, sub, tail);
                self.slot_mut(sub).deps_tail = Some(existing);
            }
            self.touch(existing);
            return;
        }

        let id = self.alloc_link(Link {
            dep,
            sub,
            version: 0,
            epoch: 0,
            prev_sub: None,
            next_sub: None,
            prev_dep: None,
            next_dep: None,
        });
        self.insert_dep_after(id, sub, tail);
        self.append_sub(id, dep);
        self.edges.insert((dep, sub), id);
        self.slot_mut(sub).deps_tail = Some(id);
        self.touch(id);
    }

    /// Finish a tracked evaluation of `sub`.
    ///
    /// Drops every dependency past the cursor and returns the producers that
    /// are no longer read. Does not clear `TRACKING`.
    pub(crate) fn end_track(&mut self, sub: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut removed = SmallVec::new();
        let node = self.slot(sub);
        let mut cursor = match node.deps_tail {
            Some(tail) => self.link(tail).next_dep,
            None => node.deps,
        };
        while let Some(id) = cursor {
            cursor = self.link(id).next_dep;
            removed.push(self.remove_link(id).dep);
        }

        let volatile = self.reads_volatile(sub);
        self.slot_mut(sub).flags.set(NodeFlags::VOLATILE, volatile);
        removed
    }

    /// Remove the edge between `dep` and `sub`, if there is one.
    pub(crate) fn unlink(&mut self, dep: NodeId, sub: NodeId) -> bool {
        match self.edge(dep, sub) {
            Some(id) => {
                self.remove_link(id);
                true
            }
            None => false,
        }
    }

    /// Splice a link out of both lists and free it.
    pub(crate) fn remove_link(&mut self, id: LinkId) -> Link {
        self.unlink_dep(id);
        self.unlink_sub(id);
        let link = self.free_link(id);
        self.edges.remove(&(link.dep, link.sub));
        link
    }

    fn reads_volatile(&self, sub: NodeId) -> bool {
        let mut cursor = self.slot(sub).deps;
        while let Some(id) = cursor {
            let link = self.link(id);
            let dep = self.slot(link.dep);
            if dep.kind == NodeKind::Volatile || dep.flags.contains(NodeFlags::VOLATILE) {
                return true;
            }
            cursor = link.next_dep;
        }
        false
    }

    fn touch(&mut self, id: LinkId) {
        let (dep, sub) = {
            let link = self.link(id);
            (link.dep, link.sub)
        };
        let version = self.slot(dep).version;
        let epoch = self.slot(sub).epoch;
        let link = self.link_mut(id);
        link.version = version;
        link.epoch = epoch;
    }

    fn insert_dep_after(&mut self, id: LinkId, sub: NodeId, after: Option<LinkId>) {
        let next = match after {
            Some(after) => self.link(after).next_dep,
            None => self.slot(sub).deps,
        };
        {
            let link = self.link_mut(id);
            link.prev_dep = after;
            link.next_dep = next;
        }
        match after {
            Some(after) => self.link_mut(after).next_dep = Some(id),
            None => self.slot_mut(sub).deps = Some(id),
        }
        if let Some(next) = next {
            self.link_mut(next).prev_dep = Some(id);
        }
    }

    fn unlink_dep(&mut self, id: LinkId) {
        let (sub, prev, next) = {
            let link = self.link(id);
            (link.sub, link.prev_dep, link.next_dep)
        };
        match prev {
            Some(prev) => self.link_mut(prev).next_dep = next,
            None => self.slot_mut(sub).deps = next,
        }
        if let Some(next) = next {
            self.link_mut(next).prev_dep = prev;
        }
        let node = self.slot_mut(sub);
        if node.deps_tail == Some(id) {
            node.deps_tail = prev;
        }
        let link = self.link_mut(id);
        link.prev_dep = None;
        link.next_dep = None;
    }

    fn append_sub(&mut self, id: LinkId, dep: NodeId) {
        let tail = self.slot(dep).subs_tail;
        {
            let link = self.link_mut(id);
            link.prev_sub = tail;
            link.next_sub = None;
        }
        match tail {
            Some(tail) => self.link_mut(tail).next_sub = Some(id),
            None => self.slot_mut(dep).subs = Some(id),
        }
        self.slot_mut(dep).subs_tail = Some(id);
    }

    fn unlink_sub(&mut self, id: LinkId) {
        let (dep, prev, next) = {
            let link = self.link(id);
            (link.dep, link.prev_sub, link.next_sub)
        };
        match prev {
            Some(prev) => self.link_mut(prev).next_sub = next,
            None => self.slot_mut(dep).subs = next,
        }
        match next {
            Some(next) => self.link_mut(next).prev_sub = prev,
            None => self.slot_mut(dep).subs_tail = prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::add;
    use super::*;

    fn evaluate(graph: &mut Graph, sub: NodeId, reads: &[NodeId]) -> Vec<NodeId> {
        graph.start_track(sub);
        for &dep in reads {
            graph.link_dep(dep, sub);
        }
        let removed = graph.end_track(sub).into_vec();
        graph.slot_mut(sub).flags.remove(NodeFlags::TRACKING);
        removed
    }

    #[test]
    fn records_reads_in_order() {
        let mut graph = Graph::new();
        let a = add(&mut graph, NodeKind::State);
        let b = add(&mut graph, NodeKind::State);
        let c = add(&mut graph, NodeKind::Computed);

        evaluate(&mut graph, c, &[b, a]);

        assert_eq!(graph.sources(c), vec![b, a]);
        assert_eq!(graph.sinks(a), vec![c]);
        assert_eq!(graph.sinks(b), vec![c]);
    }

    #[test]
    fn repeated_reads_create_one_link() {
        let mut graph = Graph::new();
        let a = add(&mut graph, NodeKind::State);
        let b = add(&mut graph, NodeKind::State);
        let c = add(&mut graph, NodeKind::Computed);

        evaluate(&mut graph, c, &[a, a, b, a, b]);

        assert_eq!(graph.sources(c), vec![a, b]);
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn stable_order_reuses_links() {
        let mut graph = Graph::new();
        let a = add(&mut graph, NodeKind::State);
        let b = add(&mut graph, NodeKind::State);
        let c = add(&mut graph, NodeKind::Computed);

        evaluate(&mut graph, c, &[a, b]);
        let first = graph.edge(b, c);
        evaluate(&mut graph, c, &[a, b]);

        assert_eq!(graph.edge(b, c), first);
        assert_eq!(graph.sources(c), vec![a, b]);
    }

    #[test]
    fn prunes_dependencies_not_read_again() {
        let mut graph = Graph::new();
        let states: Vec<_> = (0..5).map(|_| add(&mut graph, NodeKind::State)).collect();
        let c = add(&mut graph, NodeKind::Computed);

        evaluate(&mut graph, c, &states);
        let removed = evaluate(&mut graph, c, &states[..2]);

        assert_eq!(removed, states[2..].to_vec());
        assert_eq!(graph.sources(c), states[..2].to_vec());
        assert!(graph.sinks(states[4]).is_empty());
    }

    #[test]
    fn reordered_reads_move_links() {
        let mut graph = Graph::new();
        let states: Vec<_> = (0..6).map(|_| add(&mut graph, NodeKind::State)).collect();
        let c = add(&mut graph, NodeKind::Computed);

        evaluate(&mut graph, c, &states);
        let removed = evaluate(&mut graph, c, &[states[3], states[4], states[0]]);

        assert_eq!(graph.sources(c), vec![states[3], states[4], states[0]]);
        assert_eq!(removed.len(), 3);
        assert_eq!(graph.link_count(), 3);
    }

    #[test]
    fn no_reads_clears_everything() {
        let mut graph = Graph::new();
        let a = add(&mut graph, NodeKind::State);
        let c = add(&mut graph, NodeKind::Computed);

        evaluate(&mut graph, c, &[a]);
        evaluate(&mut graph, c, &[]);

        assert!(graph.sources(c).is_empty());
        assert_eq!(graph.slot(c).deps, None);
        assert_eq!(graph.slot(c).deps_tail, None);
    }

    #[test]
    fn links_record_read_version() {
        let mut graph = Graph::new();
        let a = add(&mut graph, NodeKind::State);
        let c = add(&mut graph, NodeKind::Computed);

        graph.slot_mut(a).version = 7;
        evaluate(&mut graph, c, &[a]);

        let link = graph.edge(a, c).unwrap();
        assert_eq!(graph.link(link).version, 7);
    }

    #[test]
    fn watcher_links_append_and_unlink() {
        let mut graph = Graph::new();
        let states: Vec<_> = (0..4).map(|_| add(&mut graph, NodeKind::State)).collect();
        let w = add(&mut graph, NodeKind::Watcher);

        for &s in &states {
            graph.link_dep(s, w);
        }
        graph.link_dep(states[1], w);
        assert_eq!(graph.sources(w), states);

        assert!(graph.unlink(states[3], w));
        assert!(graph.unlink(states[0], w));
        assert!(!graph.unlink(states[0], w));
        assert_eq!(graph.sources(w), vec![states[1], states[2]]);

        graph.link_dep(states[3], w);
        assert_eq!(graph.sources(w), vec![states[1], states[2], states[3]]);
    }

    #[test]
    fn tracks_volatile_reads() {
        let mut graph = Graph::new();
        let v = add(&mut graph, NodeKind::Volatile);
        let c = add(&mut graph, NodeKind::Computed);
        let d = add(&mut graph, NodeKind::Computed);

        evaluate(&mut graph, c, &[v]);
        evaluate(&mut graph, d, &[c]);
        assert!(graph.flags(c).contains(NodeFlags::VOLATILE));
        assert!(graph.flags(d).contains(NodeFlags::VOLATILE));

        evaluate(&mut graph, c, &[]);
        assert!(!graph.flags(c).contains(NodeFlags::VOLATILE));
    }
}
