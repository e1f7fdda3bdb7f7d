//! Ripple Core
//!
//! This crate provides a dependency-tracking reactive graph. It implements:
//!
//! - Writable state cells
//! - Lazy, memoized computeds with automatic dependency tracking
//! - Volatile sources read from the outside world
//! - Watchers that are told when something they observe may have changed
//!
//! Writes push: they mark everything downstream as stale. Reads pull: a
//! stale computed re-validates its dependencies and recomputes only if one of
//! them really changed. Recomputation always happens in dependency order and
//! at most once per change, however many paths lead to a node.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: The typed cells, dependency tracking and the runtime
//! - `graph`: The node and link arenas, and change propagation
//! - `error`: The error type shared by every fallible operation
//!
//! The graph is thread-local. Handles are `Rc`-based and cannot leave the
//! thread that created them.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use ripple_core::{Computed, State, Watcher};
//!
//! // Create a state cell
//! let count = State::new(1);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Computed::new(move || Ok(count.get()? * 2))
//! };
//!
//! // Read it once so it knows its sources, then watch it
//! assert_eq!(doubled.get().unwrap(), 2);
//! let notified = Rc::new(Cell::new(false));
//! let flag = notified.clone();
//! let watcher = Watcher::new(move |_| flag.set(true));
//! watcher.watch([&doubled]);
//!
//! // Update the state cell
//! count.set(5).unwrap();
//! assert!(notified.get());
//! assert_eq!(doubled.get().unwrap(), 10);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ComputationError, Error, Result};
pub use graph::{NodeId, NodeKind};
pub use reactive::{
    current_computed, has_sinks, has_sources, introspect_sinks, introspect_sources, untrack,
    AnySignal, AnySink, Computed, ComputedState, Options, State, Volatile, Watcher,
};
