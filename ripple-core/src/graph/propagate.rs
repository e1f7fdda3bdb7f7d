//! Change Propagation
//!
//! A write marks the graph; it never recomputes anything. Reads pull.
//!
//! # Algorithm
//!
//! 1. Direct consumers of the written producer are marked `DIRTY`.
//! 2. Consumers further downstream are marked `PENDING`: one of their
//!    transitive sources changed, but whether their own value changes is
//!    only known once somebody validates them.
//! 3. A node that was already stale is not walked again. Its subtree was
//!    marked by the earlier write and has not been validated since.
//! 4. Watchers reached at any level are collected for notification, once
//!    per arming.
//! 5. A computed reached while it is evaluating is flagged `RECURSED`. Its
//!    evaluation then ends `PENDING`, so the next read re-checks the
//!    sources it read before the write.
//!
//! When a computed recomputes and its value actually changed, its direct
//! consumers that were only `PENDING` are promoted to `DIRTY` so they skip the
//! validation walk. That is [`Graph::shallow_propagate`].

use smallvec::SmallVec;

use super::{Graph, NodeFlags, NodeId, NodeKind};

impl Graph {
    /// Mark everything downstream of `source` as stale.
    ///
    /// Returns the watchers that need notifying, in visit order.
    pub(crate) fn propagate(&mut self, source: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut notify = SmallVec::new();
        let mut stack: SmallVec<[(NodeId, NodeFlags); 16]> = SmallVec::new();
        self.push_subs(source, NodeFlags::DIRTY, &mut stack);

        while let Some((id, level)) = stack.pop() {
            let node = self.slot_mut(id);
            match node.kind {
                NodeKind::Watcher => {
                    if !node.flags.contains(NodeFlags::DIRTY) {
                        node.flags.insert(NodeFlags::DIRTY);
                        notify.push(id);
                    }
                }
                NodeKind::Computed => {
                    if node.flags.contains(NodeFlags::TRACKING) {
                        node.flags.insert(NodeFlags::RECURSED);
                    }
                    let was_clean = node.is_clean();
                    if level == NodeFlags::DIRTY {
                        if node.flags.contains(NodeFlags::DIRTY) {
                            continue;
                        }
                        node.flags.remove(NodeFlags::PENDING);
                        node.flags.insert(NodeFlags::DIRTY);
                    } else if was_clean {
                        node.flags.insert(NodeFlags::PENDING);
                    } else {
                        continue;
                    }

                    if was_clean {
                        self.push_subs(id, NodeFlags::PENDING, &mut stack);
                    }
                }
                NodeKind::State | NodeKind::Volatile => {}
            }
        }

        notify
    }

    /// Promote direct `PENDING` consumers of `id` to `DIRTY`.
    pub(crate) fn shallow_propagate(&mut self, id: NodeId) {
        let mut cursor = self.slot(id).subs;
        while let Some(link) = cursor {
            let (sub, next) = {
                let link = self.link(link);
                (link.sub, link.next_sub)
            };
            let node = self.slot_mut(sub);
            if node.kind == NodeKind::Computed
                && node.flags.contains(NodeFlags::PENDING)
                && !node.flags.contains(NodeFlags::TRACKING)
            {
                node.flags.remove(NodeFlags::PENDING);
                node.flags.insert(NodeFlags::DIRTY);
            }
            cursor = next;
        }
    }

    fn push_subs(
        &self,
        id: NodeId,
        level: NodeFlags,
        stack: &mut SmallVec<[(NodeId, NodeFlags); 16]>,
    ) {
        let start = stack.len();
        let mut cursor = self.slot(id).subs;
        while let Some(link) = cursor {
            let link = self.link(link);
            stack.push((link.sub, level));
            cursor = link.next_sub;
        }
        // Reversed so the first subscriber is popped first.
        stack[start..].reverse();
    }
}
