//! Watcher Implementation
//!
//! A Watcher is the bridge between the graph and the outside world. It
//! watches an explicit set of producers and runs a notify callback when any
//! of them may have changed.
//!
//! # How Watchers Work
//!
//! 1. `watch` adds producers to the watch set. Each of them, and everything
//!    it depends on, becomes live.
//!
//! 2. When a write marks anything in the watch set, the notify callback runs
//!    once, after marking has finished. The watcher is then disarmed: further
//!    writes do not notify it again until it is re-armed.
//!
//! 3. The callback must not read or write graph values. The usual pattern is
//!    to schedule some work for later, and from there call
//!    [`Watcher::pending`], read the stale computeds, and re-arm.
//!
//! A read or write attempted inside the callback returns `Err` to the
//! callback itself. The callback returns nothing, so that error stays there:
//! the write that triggered the notification still returns `Ok`.
//!
//! # Differences from Computed
//!
//! - Computeds discover their dependencies; watchers are told them.
//! - Computeds are pulled; watchers are pushed.
//! - Watchers never produce a value and nothing can depend on them.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::handle::AnySignal;
use super::runtime::{Reactive, Runtime};
use crate::graph::{NodeFlags, NodeId, NodeKind};

/// An observer that is told when watched producers may have changed.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{State, Watcher};
///
/// let count = State::new(0);
/// let fired = Rc::new(Cell::new(0));
/// let counter = fired.clone();
/// let watcher = Watcher::new(move |_| counter.set(counter.get() + 1));
/// watcher.watch([&count]);
///
/// count.set(1).unwrap();
/// count.set(2).unwrap();
/// assert_eq!(fired.get(), 1);
///
/// watcher.rearm();
/// count.set(3).unwrap();
/// assert_eq!(fired.get(), 2);
/// ```
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

struct WatcherInner {
    id: NodeId,
    this: Weak<WatcherInner>,
    notify: Box<dyn Fn(&Watcher)>,
    /// Watch set in insertion order. Holding the handles keeps the nodes alive.
    watched: RefCell<IndexMap<NodeId, AnySignal>>,
}

impl Watcher {
    /// Create a watcher with the given notify callback.
    ///
    /// The callback receives the watcher itself. It may call `watch`,
    /// `unwatch` and `rearm`. Reads and writes of graph values fail with
    /// [`Error::ReadDuringNotification`](crate::Error::ReadDuringNotification)
    /// or [`Error::WriteDuringNotification`](crate::Error::WriteDuringNotification),
    /// and the error is only visible inside the callback.
    pub fn new(notify: impl Fn(&Watcher) + 'static) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<WatcherInner>| {
            let handle: Weak<dyn Reactive> = this.clone();
            WatcherInner {
                id: Runtime::register(NodeKind::Watcher, handle),
                this: this.clone(),
                notify: Box::new(notify),
                watched: RefCell::new(IndexMap::new()),
            }
        });
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub(super) fn node(&self) -> Rc<dyn Reactive> {
        self.inner.clone()
    }

    /// Add producers to the watch set and re-arm.
    ///
    /// Producers already in the set are skipped.
    pub fn watch<I>(&self, signals: I)
    where
        I: IntoIterator,
        I::Item: Into<AnySignal>,
    {
        for signal in signals {
            let signal = signal.into();
            let id = signal.id();
            if self.inner.watched.borrow().contains_key(&id) {
                continue;
            }
            self.inner.watched.borrow_mut().insert(id, signal);
            Runtime::attach(id, self.inner.id);
        }
        self.rearm();
    }

    /// Allow the notify callback to run again on the next change.
    pub fn rearm(&self) {
        Runtime::rearm(self.inner.id);
    }

    /// Check if the next change will run the notify callback.
    pub fn is_armed(&self) -> bool {
        !Runtime::flags(self.inner.id).contains(NodeFlags::DIRTY)
    }

    /// Remove producers from the watch set.
    ///
    /// Producers that are not in the set are ignored. Does not re-arm.
    pub fn unwatch<I>(&self, signals: I)
    where
        I: IntoIterator,
        I::Item: Into<AnySignal>,
    {
        let targets: HashSet<NodeId> = signals.into_iter().map(|signal| signal.into().id()).collect();
        if targets.is_empty() {
            return;
        }

        let mut removed = Vec::new();
        self.inner.watched.borrow_mut().retain(|id, signal| {
            if targets.contains(id) {
                removed.push(signal.clone());
                false
            } else {
                true
            }
        });

        for signal in &removed {
            Runtime::detach(signal.id(), self.inner.id);
        }
    }

    /// Every producer in the watch set, in the order it was added.
    pub fn signals(&self) -> Vec<AnySignal> {
        self.inner.watched.borrow().values().cloned().collect()
    }

    /// Watched computeds that are dirty or pending, in watch order.
    pub fn pending(&self) -> Vec<AnySignal> {
        self.inner
            .watched
            .borrow()
            .values()
            .filter(|signal| {
                signal.kind() == NodeKind::Computed
                    && Runtime::flags(signal.id()).intersects(NodeFlags::STALE)
            })
            .cloned()
            .collect()
    }
}

impl Reactive for WatcherInner {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Watcher
    }

    fn notify(&self) {
        if let Some(inner) = self.this.upgrade() {
            (self.notify)(&Watcher { inner });
        }
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        Runtime::dispose(self.id);
    }
}

impl Clone for Watcher {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("watching", &self.inner.watched.borrow().len())
            .finish()
    }
}
