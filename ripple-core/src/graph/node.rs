//! Graph Nodes
//!
//! This module defines the per-node bookkeeping record that lives in the
//! graph arena. Values never live here: a slot only knows its kind, its dirty
//! state, its version and the heads of its two link lists. The typed cell that
//! owns the value is reachable through a weak handle.

use std::fmt;
use std::rc::Weak;

use super::link::LinkId;
use crate::reactive::Reactive;

/// Unique identifier for a node in the dependency graph.
///
/// This is an index into the node arena. Indices are recycled once a node is
/// dropped, so an id is only meaningful while its owning cell is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A writable cell. Pure producer.
    State,

    /// A memoized derivation. Both producer and consumer.
    Computed,

    /// A producer whose value is read from the outside world on every access.
    Volatile,

    /// An externally notified observer. Pure consumer.
    Watcher,
}

impl NodeKind {
    /// Whether other nodes may depend on this one.
    pub fn is_producer(self) -> bool {
        !matches!(self, NodeKind::Watcher)
    }

    /// Whether this node records dependencies.
    pub fn is_consumer(self) -> bool {
        matches!(self, NodeKind::Computed | NodeKind::Watcher)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::State => "state",
            NodeKind::Computed => "computed",
            NodeKind::Volatile => "volatile",
            NodeKind::Watcher => "watcher",
        })
    }
}

bitflags::bitflags! {
    /// Dirty state of a node, plus the evaluation guard.
    ///
    /// For a watcher, `DIRTY` means "already notified since the last re-arm".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// A direct source changed. Recompute on next read.
        const DIRTY = 1 << 0;
        /// A transitive source may have changed. Re-validate before deciding.
        const PENDING = 1 << 1;
        /// The node is being evaluated right now.
        const TRACKING = 1 << 2;
        /// The node read a volatile source on its last evaluation, directly
        /// or through another computed. Always re-validated on read.
        const VOLATILE = 1 << 3;
        /// A write reached the node while it was evaluating. It settles as
        /// pending instead of clean.
        const RECURSED = 1 << 4;

        const STALE = Self::DIRTY.bits() | Self::PENDING.bits();
    }
}

/// A node in the dependency graph.
pub(crate) struct NodeSlot {
    pub(crate) kind: NodeKind,
    pub(crate) flags: NodeFlags,

    /// Bumped only when the node's value semantically changes.
    pub(crate) version: u64,

    /// Bumped every time the node starts a tracked evaluation. A link whose
    /// epoch matches was already read during the current evaluation.
    pub(crate) epoch: u64,

    /// Producer side: links to the nodes that read this one.
    pub(crate) subs: Option<LinkId>,
    pub(crate) subs_tail: Option<LinkId>,

    /// Consumer side: links to the nodes this one read, in read order.
    pub(crate) deps: Option<LinkId>,
    pub(crate) deps_tail: Option<LinkId>,

    /// Number of live sinks (watchers, or computeds that are themselves live).
    pub(crate) watch_count: usize,

    /// Back-reference to the cell that owns this slot.
    pub(crate) handle: Weak<dyn Reactive>,
}

impl NodeSlot {
    pub(crate) fn new(kind: NodeKind, handle: Weak<dyn Reactive>) -> Self {
        Self {
            kind,
            flags: match kind {
                // Start dirty to ensure first computation
                NodeKind::Computed => NodeFlags::DIRTY,
                _ => NodeFlags::empty(),
            },
            version: 0,
            epoch: 0,
            subs: None,
            subs_tail: None,
            deps: None,
            deps_tail: None,
            watch_count: 0,
            handle,
        }
    }

    /// Check if the node needs any processing.
    pub(crate) fn is_clean(&self) -> bool {
        !self.flags.intersects(NodeFlags::STALE)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.watch_count > 0
    }
}

impl fmt::Debug for NodeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSlot")
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("version", &self.version)
            .field("watch_count", &self.watch_count)
            .finish()
    }
}
