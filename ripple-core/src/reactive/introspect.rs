//! Graph introspection.
//!
//! Read-only queries over the current shape of the graph. None of them
//! validate anything: the answer reflects the last evaluation of each node.

use super::context::ReactiveContext;
use super::handle::{AnySignal, AnySink};
use super::runtime::Runtime;
use crate::graph::NodeKind;

/// The producers `sink` read on its last evaluation, in read order.
///
/// For a watcher, its watch set in the order it was added.
pub fn introspect_sources(sink: impl Into<AnySink>) -> Vec<AnySignal> {
    Runtime::sources(sink.into().id())
        .into_iter()
        .map(AnySignal::from_node)
        .collect()
}

/// The live consumers of `signal`, in subscription order.
///
/// Watchers always count. A computed only counts while it is itself live,
/// meaning a watcher observes it directly or through other computeds.
pub fn introspect_sinks(signal: impl Into<AnySignal>) -> Vec<AnySink> {
    Runtime::live_sinks(signal.into().id())
        .into_iter()
        .map(AnySink::from_node)
        .collect()
}

/// Check if `signal` has at least one live consumer.
pub fn has_sinks(signal: impl Into<AnySignal>) -> bool {
    Runtime::watch_count(signal.into().id()) > 0
}

/// Check if `sink` depends on anything.
pub fn has_sources(sink: impl Into<AnySink>) -> bool {
    Runtime::has_sources(sink.into().id())
}

/// The computed currently evaluating on this thread, if any.
pub fn current_computed() -> Option<AnySignal> {
    let id = ReactiveContext::current_consumer()?;
    Runtime::handle(id)
        .filter(|node| node.kind() == NodeKind::Computed)
        .map(AnySignal::from_node)
}
