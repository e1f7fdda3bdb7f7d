//! Volatile sources.
//!
//! A [`Volatile`] wraps a value the graph cannot observe changing: a clock,
//! an environment variable, a field on some foreign object. It is never
//! marked and never notifies. Instead, any computed that read a volatile
//! source (directly or through another computed) re-validates on every read
//! and treats the volatile source as changed, recomputing and letting its own
//! equality decide whether anything downstream moves.

use std::fmt;
use std::rc::{Rc, Weak};

use super::context::{untrack, ReactiveContext};
use super::runtime::{Reactive, Runtime};
use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeKind};

/// A producer whose value is read from the outside world on every access.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{Computed, Volatile};
///
/// let external = Rc::new(Cell::new(1));
/// let source = external.clone();
/// let volatile = Volatile::new(move || source.get());
/// let doubled = Computed::new(move || Ok(volatile.get()? * 2));
///
/// assert_eq!(doubled.get().unwrap(), 2);
/// external.set(5);
/// assert_eq!(doubled.get().unwrap(), 10);
/// ```
pub struct Volatile<T: 'static> {
    inner: Rc<VolatileInner<T>>,
}

struct VolatileInner<T: 'static> {
    id: NodeId,
    snapshot: Box<dyn Fn() -> T>,
}

impl<T: 'static> Volatile<T> {
    /// Create a volatile source. `snapshot` is called on every read.
    pub fn new(snapshot: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<VolatileInner<T>>| {
            let handle: Weak<dyn Reactive> = this.clone();
            VolatileInner {
                id: Runtime::register(NodeKind::Volatile, handle),
                snapshot: Box::new(snapshot),
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

    /// Take a snapshot of the current value.
    ///
    /// If called while a computed is evaluating, that computed now depends
    /// on this source and will re-validate on every read. The snapshot
    /// itself runs untracked.
    pub fn get(&self) -> Result<T> {
        if ReactiveContext::is_notifying() {
            return Err(Error::ReadDuringNotification(NodeKind::Volatile));
        }
        Runtime::track(self.inner.id);
        Ok(untrack(|| (self.inner.snapshot)()))
    }

    /// Take a snapshot without recording a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        untrack(|| self.get())
    }
}

impl<T: 'static> Reactive for VolatileInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Volatile
    }
}

impl<T: 'static> Drop for VolatileInner<T> {
    fn drop(&mut self) {
        Runtime::dispose(self.id);
    }
}

impl<T: 'static> Clone for Volatile<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> PartialEq for Volatile<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> fmt::Debug for Volatile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volatile").field("id", &self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computed, State};
    use std::cell::Cell;

    #[test]
    fn reads_the_snapshot_every_time() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let volatile = Volatile::new(move || {
            counter.set(counter.get() + 1);
            counter.get()
        });

        assert_eq!(volatile.get(), Ok(1));
        assert_eq!(volatile.get(), Ok(2));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dependents_recompute_on_every_read() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let volatile = Volatile::new(|| 7);
        let computed = Computed::new(move || {
            counter.set(counter.get() + 1);
            volatile.get()
        });

        computed.get().unwrap();
        computed.get().unwrap();
        computed.get().unwrap();
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn equal_snapshots_stop_at_the_first_computed() {
        let external = Rc::new(Cell::new(1));
        let source = external.clone();
        let volatile = Volatile::new(move || source.get());
        let parity = Computed::new(move || Ok(volatile.get()? % 2));
        let inner = parity.clone();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let label = Computed::new(move || {
            counter.set(counter.get() + 1);
            Ok(inner.get()? == 0)
        });

        assert_eq!(label.get(), Ok(false));
        external.set(3);
        assert_eq!(label.get(), Ok(false));
        assert_eq!(runs.get(), 1);

        external.set(4);
        assert_eq!(label.get(), Ok(true));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn snapshot_is_not_tracked() {
        let hidden = State::new(1);
        let peek = hidden.clone();
        let volatile = Volatile::new(move || peek.get().unwrap_or_default());
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let computed = Computed::new(move || {
            counter.set(counter.get() + 1);
            volatile.get()
        });

        computed.get().unwrap();
        assert!(crate::reactive::introspect_sources(&computed)
            .iter()
            .all(|source| source.kind() == NodeKind::Volatile));
        drop(hidden);
    }
}
