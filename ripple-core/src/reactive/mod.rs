//! Reactive Primitives
//!
//! This module implements the reactive cells: state, computeds, volatile
//! sources and watchers. They are thin typed handles over the thread-local
//! [`Runtime`], which owns the dependency graph.
//!
//! # Concepts
//!
//! ## State
//!
//! A State is a container for mutable data. When it is read while a computed
//! is evaluating, the computed records it as a dependency. When its value
//! changes, everything downstream is marked and watchers are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! lazily, only when read and only when one of its dependencies actually
//! changed.
//!
//! ## Watchers
//!
//! A Watcher is the edge of the graph. It is told when something it watches
//! may have changed and decides for itself when to pull new values.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a cell is read, we check if there is an active
//! consumer and, if so, record the dependency on the graph.

mod computed;
mod context;
mod handle;
mod introspect;
mod options;
mod runtime;
mod state;
mod volatile;
mod watcher;

pub use computed::{Computed, ComputedState};
pub use context::{untrack, ReactiveContext};
pub use handle::{AnySignal, AnySink};
pub use introspect::{current_computed, has_sinks, has_sources, introspect_sinks, introspect_sources};
pub use options::Options;
pub use runtime::Runtime;
pub use state::State;
pub use volatile::Volatile;
pub use watcher::Watcher;

pub(crate) use runtime::Reactive;

#[cfg(test)]
pub(crate) use runtime::Detached;
