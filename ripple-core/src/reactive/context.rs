//! Reactive Context
//!
//! The reactive context tracks what is currently running on this thread.
//! This enables automatic dependency tracking: when a node is read while a
//! computed is evaluating, the computed records the read.
//!
//! # Implementation
//!
//! A thread-local cell holds the active context. Entering a context swaps
//! the new value in and keeps the previous one in a guard; dropping the guard
//! swaps it back. Guards therefore nest the same way evaluations nest, and
//! the previous context is restored even if a derivation panics.
//!
//! Besides "a consumer is evaluating" the context has one more state: a
//! watcher's notify callback is running. Reading or writing graph values in
//! that state is an error.

use std::cell::Cell;

use crate::graph::NodeId;

thread_local! {
    static ACTIVE: Cell<Active> = const { Cell::new(Active::None) };
}

/// What is currently running on this thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Active {
    /// Nothing. Reads are untracked.
    None,
    /// A consumer is evaluating. Reads are recorded as its dependencies.
    Consumer(NodeId),
    /// A watcher's notify callback is running.
    Notifying,
}

/// Guard that restores the previous context when dropped.
pub struct ReactiveContext {
    previous: Active,
}

impl ReactiveContext {
    /// Make `active` the current context until the returned guard is dropped.
    pub(crate) fn enter(active: Active) -> Self {
        let previous = ACTIVE.with(|cell| cell.replace(active));
        Self { previous }
    }

    /// Leave any consumer context. The notification context is kept.
    pub(crate) fn untracked() -> Self {
        match Self::active() {
            Active::Notifying => Self::enter(Active::Notifying),
            _ => Self::enter(Active::None),
        }
    }

    pub(crate) fn active() -> Active {
        ACTIVE.with(Cell::get)
    }

    /// Check if reads on this thread are currently being tracked.
    pub fn is_active() -> bool {
        matches!(Self::active(), Active::Consumer(_))
    }

    /// Check if a watcher's notify callback is running on this thread.
    pub fn is_notifying() -> bool {
        Self::active() == Active::Notifying
    }

    /// Get the consumer currently recording dependencies, if any.
    pub fn current_consumer() -> Option<NodeId> {
        match Self::active() {
            Active::Consumer(id) => Some(id),
            _ => None,
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The thread-local may already be gone during thread teardown.
        let _ = ACTIVE.try_with(|cell| cell.set(self.previous));
    }
}

/// Run `f` without recording any reads as dependencies.
///
/// Reading inside a watcher's notify callback is still rejected.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
