//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects state cells,
//! computeds and watchers. It owns the dependency graph and drives the two
//! halves of every update: marking on write, validating on read.
//!
//! # How It Works
//!
//! 1. When a cell is created, it registers with the runtime and gets a
//!    [`NodeId`]. The runtime keeps only a weak handle back to it.
//!
//! 2. When a computed reads another node, the runtime records the
//!    dependency on the graph.
//!
//! 3. When a state cell's value changes, the runtime:
//!    a. Bumps its version
//!    b. Marks direct consumers dirty and everything further down pending
//!    c. Notifies the watchers it reached, after marking has finished
//!
//! 4. When a computed is read, the runtime validates it: a dirty node is
//!    recomputed, a pending node walks its dependencies in read order and
//!    only recomputes if one of them really changed.
//!
//! # Thread Safety
//!
//! There is none to speak of. The graph is thread-local and all handles are
//! `!Send`. The graph borrow is never held while user code runs, so
//! derivations, hooks and notify callbacks may freely re-enter the runtime.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};

use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use super::context::{untrack, Active, ReactiveContext};
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeFlags, NodeId, NodeKind};

/// Behaviour the runtime needs from the cell that owns a node.
///
/// Everything except the identity has a no-op default; each cell type only
/// implements the parts that apply to it.
pub(crate) trait Reactive {
    fn id(&self) -> NodeId;

    fn kind(&self) -> NodeKind;

    /// Recompute the cached value. Returns whether the value changed.
    fn update(&self) -> Result<bool> {
        Ok(false)
    }

    /// Run the watcher's notify callback.
    fn notify(&self) {}

    /// The node gained its first live sink.
    fn watched(&self) {}

    /// The node lost its last live sink.
    fn unwatched(&self) {}

    /// Bring the value up to date without tracking, surfacing a cached error.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

struct RuntimeState {
    graph: RefCell<Graph>,
    /// Watchers waiting for their notify callback.
    queue: RefCell<VecDeque<NodeId>>,
    draining: Cell<bool>,
}

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState {
        graph: RefCell::new(Graph::new()),
        queue: RefCell::new(VecDeque::new()),
        draining: Cell::new(false),
    };
}

/// The thread-local reactive runtime.
pub struct Runtime;

impl Runtime {
    fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
        RUNTIME.with(|rt| f(&mut rt.graph.borrow_mut()))
    }

    fn read_graph<R>(f: impl FnOnce(&Graph) -> R) -> R {
        RUNTIME.with(|rt| f(&rt.graph.borrow()))
    }

    /// Number of live nodes on this thread.
    pub fn node_count() -> usize {
        Self::read_graph(Graph::node_count)
    }

    /// Number of dependency edges on this thread.
    pub fn link_count() -> usize {
        Self::read_graph(Graph::link_count)
    }

    /// Register a cell with the runtime.
    pub(crate) fn register(kind: NodeKind, handle: Weak<dyn Reactive>) -> NodeId {
        let id = Self::with_graph(|graph| graph.insert_node(kind, handle));
        trace!(node = id.raw(), %kind, "node registered");
        id
    }

    /// Remove a node whose cell is being dropped.
    ///
    /// Sources that were kept live by this node are released.
    pub(crate) fn dispose(id: NodeId) {
        let released = RUNTIME
            .try_with(|rt| {
                rt.queue.borrow_mut().retain(|&queued| queued != id);
                let Ok(mut graph) = rt.graph.try_borrow_mut() else {
                    return Vec::new();
                };
                let Some(node) = graph.node(id) else {
                    return Vec::new();
                };
                let holds_sources = node.kind == NodeKind::Watcher || node.is_live();
                let released = if holds_sources && node.kind.is_consumer() {
                    graph.sources(id)
                } else {
                    Vec::new()
                };
                graph.remove_node(id);
                released
            })
            .unwrap_or_default();

        trace!(node = id.raw(), "node disposed");
        for dep in released {
            Self::unwatch_node(dep);
        }
    }

    pub(crate) fn flags(id: NodeId) -> NodeFlags {
        Self::read_graph(|graph| graph.flags(id))
    }

    pub(crate) fn version(id: NodeId) -> u64 {
        Self::read_graph(|graph| graph.node(id).map_or(0, |node| node.version))
    }

    pub(crate) fn watch_count(id: NodeId) -> usize {
        Self::read_graph(|graph| graph.node(id).map_or(0, |node| node.watch_count))
    }

    pub(crate) fn handle(id: NodeId) -> Option<Rc<dyn Reactive>> {
        Self::read_graph(|graph| graph.node(id).and_then(|node| node.handle.upgrade()))
    }

    /// Producers of `id`, in read order.
    pub(crate) fn sources(id: NodeId) -> Vec<Rc<dyn Reactive>> {
        Self::read_graph(|graph| {
            graph
                .sources(id)
                .into_iter()
                .filter_map(|dep| graph.slot(dep).handle.upgrade())
                .collect()
        })
    }

    /// Consumers of `id` that are live: watchers, and computeds with a live sink.
    pub(crate) fn live_sinks(id: NodeId) -> Vec<Rc<dyn Reactive>> {
        Self::read_graph(|graph| {
            graph
                .sinks(id)
                .into_iter()
                .map(|sub| graph.slot(sub))
                .filter(|node| node.kind == NodeKind::Watcher || node.is_live())
                .filter_map(|node| node.handle.upgrade())
                .collect()
        })
    }

    pub(crate) fn has_sources(id: NodeId) -> bool {
        Self::read_graph(|graph| graph.node(id).is_some_and(|node| node.deps.is_some()))
    }

    /// Record a read of `dep` by whatever consumer is evaluating.
    pub(crate) fn track(dep: NodeId) {
        if let Some(sub) = ReactiveContext::current_consumer() {
            Self::with_graph(|graph| graph.link_dep(dep, sub));
        }
    }

    /// Connect a watcher to a node. Returns false if it was already connected.
    pub(crate) fn attach(dep: NodeId, watcher: NodeId) -> bool {
        let added = Self::with_graph(|graph| {
            if graph.edge(dep, watcher).is_some() {
                return false;
            }
            graph.link_dep(dep, watcher);
            true
        });
        if added {
            Self::watch_node(dep);
        }
        added
    }

    /// Disconnect a watcher from a node.
    pub(crate) fn detach(dep: NodeId, watcher: NodeId) {
        if Self::with_graph(|graph| graph.unlink(dep, watcher)) {
            Self::unwatch_node(dep);
        }
    }

    /// Allow a notified watcher to be notified again.
    pub(crate) fn rearm(watcher: NodeId) {
        Self::with_graph(|graph| {
            if let Some(node) = graph.node_mut(watcher) {
                node.flags.remove(NodeFlags::DIRTY);
            }
        });
    }

    /// A producer's value changed. Mark downstream and notify watchers.
    pub(crate) fn source_changed(id: NodeId) {
        let notify = Self::with_graph(|graph| {
            graph.slot_mut(id).version += 1;
            graph.propagate(id)
        });
        trace!(source = id.raw(), watchers = notify.len(), "propagated change");

        if notify.is_empty() {
            return;
        }
        RUNTIME.with(|rt| rt.queue.borrow_mut().extend(notify));
        Self::drain();
    }

    /// Run queued notify callbacks until the queue is empty.
    ///
    /// Writes made by a callback only enqueue; the outermost drain runs them.
    fn drain() {
        RUNTIME.with(|rt| {
            if rt.draining.replace(true) {
                return;
            }
            let _reset = ResetOnDrop(&rt.draining);

            loop {
                let next = rt.queue.borrow_mut().pop_front();
                let Some(id) = next else { break };
                let handle = rt.graph.borrow().node(id).map(|node| node.handle.clone());
                if let Some(watcher) = handle.and_then(|handle| handle.upgrade()) {
                    trace!(watcher = id.raw(), "notifying watcher");
                    let _ctx = ReactiveContext::enter(Active::Notifying);
                    watcher.notify();
                }
            }
        });
    }

    /// Bring a computed up to date.
    ///
    /// Recomputes a dirty node. A pending node, or one that read a volatile
    /// source, first checks its dependencies and only recomputes if one of
    /// them changed.
    pub(crate) fn refresh(id: NodeId) -> Result<()> {
        let flags = Self::flags(id);
        if flags.contains(NodeFlags::DIRTY) {
            Self::recompute(id)?;
        } else if flags.intersects(NodeFlags::PENDING | NodeFlags::VOLATILE) {
            if Self::check_dirty(id)? {
                Self::recompute(id)?;
            } else {
                Self::with_graph(|graph| graph.slot_mut(id).flags.remove(NodeFlags::PENDING));
            }
        }
        Ok(())
    }

    fn recompute(id: NodeId) -> Result<bool> {
        match Self::handle(id) {
            Some(node) => node.update(),
            None => Ok(false),
        }
    }

    /// Walk the dependencies of `id` in read order and report whether any of
    /// them changed since `id` last read it.
    fn check_dirty(id: NodeId) -> Result<bool> {
        let mut cursor = Self::read_graph(|graph| graph.slot(id).deps);

        while let Some(link) = cursor {
            let (dep, kind, flags) = Self::read_graph(|graph| {
                let dep = graph.link(link).dep;
                let node = graph.slot(dep);
                (dep, node.kind, node.flags)
            });

            if kind == NodeKind::Volatile {
                return Ok(true);
            }

            let mut link = link;
            if kind == NodeKind::Computed
                && flags.intersects(NodeFlags::STALE | NodeFlags::VOLATILE)
            {
                Self::refresh(dep)?;
                match Self::read_graph(|graph| graph.edge(dep, id)) {
                    Some(current) => link = current,
                    None => return Ok(true),
                }
            }

            let (changed, next) = Self::read_graph(|graph| {
                let record = graph.link(link);
                (record.version != graph.slot(dep).version, record.next_dep)
            });
            if changed {
                return Ok(true);
            }
            cursor = next;
        }

        Ok(false)
    }

    /// A node gained a live sink.
    ///
    /// On the first one its `watched` hook runs and, for a computed, its own
    /// sources become live too.
    pub(crate) fn watch_node(id: NodeId) {
        let fired = Self::with_graph(|graph| {
            let mut fired: SmallVec<[Weak<dyn Reactive>; 4]> = SmallVec::new();
            let mut stack: SmallVec<[NodeId; 8]> = smallvec![id];
            while let Some(id) = stack.pop() {
                let Some(node) = graph.node_mut(id) else { continue };
                node.watch_count += 1;
                if node.watch_count != 1 {
                    continue;
                }
                let kind = node.kind;
                fired.push(node.handle.clone());
                if kind == NodeKind::Computed {
                    stack.extend(graph.sources(id));
                }
            }
            fired
        });

        for handle in fired {
            if let Some(node) = handle.upgrade() {
                debug!(node = node.id().raw(), kind = %node.kind(), "node watched");
                untrack(|| node.watched());
            }
        }
    }

    /// A node lost a live sink.
    ///
    /// When the last one goes its `unwatched` hook runs and, for a computed,
    /// its sources are released as well.
    pub(crate) fn unwatch_node(id: NodeId) {
        let fired = Self::with_graph(|graph| {
            let mut fired: SmallVec<[Weak<dyn Reactive>; 4]> = SmallVec::new();
            let mut stack: SmallVec<[NodeId; 8]> = smallvec![id];
            while let Some(id) = stack.pop() {
                let Some(node) = graph.node_mut(id) else { continue };
                if node.watch_count == 0 {
                    continue;
                }
                node.watch_count -= 1;
                if node.watch_count != 0 {
                    continue;
                }
                let kind = node.kind;
                fired.push(node.handle.clone());
                if kind == NodeKind::Computed {
                    stack.extend(graph.sources(id));
                }
            }
            fired
        });

        for handle in fired {
            if let Some(node) = handle.upgrade() {
                debug!(node = node.id().raw(), kind = %node.kind(), "node unwatched");
                untrack(|| node.unwatched());
            }
        }
    }
}

struct ResetOnDrop<'a>(&'a Cell<bool>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A tracked evaluation of a computed.
///
/// Created before the derivation runs and settled once its result has been
/// stored. If it is dropped without settling, for instance because the
/// derivation panicked, the node is left dirty so the next read retries.
pub(crate) struct Evaluation {
    id: NodeId,
    /// Sources before the evaluation, recorded only for live nodes.
    live_sources: Option<Vec<NodeId>>,
    settled: bool,
}

impl Evaluation {
    /// Begin evaluating `id`. Fails if it is already being evaluated.
    pub(crate) fn start(id: NodeId) -> Result<Self> {
        let live_sources = Runtime::with_graph(|graph| {
            if graph.flags(id).contains(NodeFlags::TRACKING) {
                return Err(Error::Cycle);
            }
            let live = graph.slot(id).is_live().then(|| graph.sources(id));
            graph.start_track(id);
            Ok(live)
        });

        match live_sources {
            Ok(live_sources) => Ok(Self {
                id,
                live_sources,
                settled: false,
            }),
            Err(err) => {
                debug!(node = id.raw(), "cycle detected");
                Err(err)
            }
        }
    }

    /// Run `f` with reads recorded against this node.
    pub(crate) fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::enter(Active::Consumer(self.id));
        f()
    }

    /// Prune unread sources and move liveness to the new source set.
    ///
    /// Sources that were dropped are released before new ones are acquired.
    pub(crate) fn end(&mut self) {
        let removed = Runtime::with_graph(|graph| graph.end_track(self.id));

        if let Some(before) = self.live_sources.take() {
            for dep in removed {
                Runtime::unwatch_node(dep);
            }
            let before: HashSet<NodeId> = before.into_iter().collect();
            let added: Vec<NodeId> = Runtime::read_graph(|graph| graph.sources(self.id))
                .into_iter()
                .filter(|dep| !before.contains(dep))
                .collect();
            for dep in added {
                Runtime::watch_node(dep);
            }
        }
    }

    /// Clear the evaluation flags and publish a change.
    ///
    /// A node written to during its own evaluation is left pending.
    pub(crate) fn settle(mut self, changed: bool) {
        self.settled = true;
        let id = self.id;
        Runtime::with_graph(|graph| {
            let node = graph.slot_mut(id);
            let recursed = node.flags.contains(NodeFlags::RECURSED);
            node.flags
                .remove(NodeFlags::TRACKING | NodeFlags::RECURSED | NodeFlags::STALE);
            if recursed {
                node.flags.insert(NodeFlags::PENDING);
            }
            if changed {
                node.version += 1;
                graph.shallow_propagate(id);
            }
        });
        trace!(node = id.raw(), changed, "recomputed");
    }
}

impl Drop for Evaluation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let id = self.id;
        let _ = RUNTIME.try_with(|rt| {
            if let Ok(mut graph) = rt.graph.try_borrow_mut() {
                if let Some(node) = graph.node_mut(id) {
                    node.flags.remove(NodeFlags::TRACKING | NodeFlags::RECURSED);
                    node.flags.insert(NodeFlags::DIRTY);
                }
            }
        });
    }
}

/// Placeholder owner for nodes created directly on a [`Graph`] in tests.
#[cfg(test)]
pub(crate) struct Detached;

#[cfg(test)]
impl Reactive for Detached {
    fn id(&self) -> NodeId {
        NodeId::from_index(0)
    }

    fn kind(&self) -> NodeKind {
        NodeKind::State
    }
}
