//! Type-erased handles.
//!
//! [`AnySignal`] stands for any producer (state, computed, volatile) and
//! [`AnySink`] for any consumer (computed, watcher). Watchers hold their watch
//! set as `AnySignal`s and introspection hands them out. Both keep the node
//! alive and compare by node identity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::computed::Computed;
use super::context::ReactiveContext;
use super::runtime::Reactive;
use super::state::State;
use super::volatile::Volatile;
use super::watcher::Watcher;
use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeKind};

/// A strong, untyped handle to a producer.
#[derive(Clone)]
pub struct AnySignal {
    node: Rc<dyn Reactive>,
}

impl AnySignal {
    pub(crate) fn from_node(node: Rc<dyn Reactive>) -> Self {
        debug_assert!(node.kind().is_producer());
        Self { node }
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }

    /// Bring the producer up to date without recording a dependency.
    ///
    /// For a computed this validates and, if needed, recomputes it. A cached
    /// error is returned as `Err`.
    pub fn refresh(&self) -> Result<()> {
        if ReactiveContext::is_notifying() {
            return Err(Error::ReadDuringNotification(self.kind()));
        }
        super::untrack(|| self.node.refresh())
    }
}

/// A strong, untyped handle to a consumer.
#[derive(Clone)]
pub struct AnySink {
    node: Rc<dyn Reactive>,
}

impl AnySink {
    pub(crate) fn from_node(node: Rc<dyn Reactive>) -> Self {
        debug_assert!(node.kind().is_consumer());
        Self { node }
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }
}

macro_rules! node_identity {
    ($name:ident) => {
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id() == other.id()
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id().hash(state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name))
                    .field(&self.kind())
                    .field(&self.id().raw())
                    .finish()
            }
        }
    };
}

node_identity!(AnySignal);
node_identity!(AnySink);

impl<T: Clone + PartialEq + 'static> From<&State<T>> for AnySignal {
    fn from(state: &State<T>) -> Self {
        Self::from_node(state.node())
    }
}

impl<T: Clone + PartialEq + 'static> From<&Computed<T>> for AnySignal {
    fn from(computed: &Computed<T>) -> Self {
        Self::from_node(computed.node())
    }
}

impl<T: 'static> From<&Volatile<T>> for AnySignal {
    fn from(volatile: &Volatile<T>) -> Self {
        Self::from_node(volatile.node())
    }
}

impl From<&AnySignal> for AnySignal {
    fn from(signal: &AnySignal) -> Self {
        signal.clone()
    }
}

impl<T: Clone + PartialEq + 'static> From<&Computed<T>> for AnySink {
    fn from(computed: &Computed<T>) -> Self {
        Self::from_node(computed.node())
    }
}

impl From<&Watcher> for AnySink {
    fn from(watcher: &Watcher) -> Self {
        Self::from_node(watcher.node())
    }
}

impl From<&AnySink> for AnySink {
    fn from(sink: &AnySink) -> Self {
        sink.clone()
    }
}
