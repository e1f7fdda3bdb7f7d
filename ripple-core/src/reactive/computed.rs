//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its derivation and caches the
//!    result. Every node read during the derivation becomes a dependency.
//!
//! 2. When accessed again, if no dependencies have changed, the cached value
//!    is returned without running anything.
//!
//! 3. When a direct dependency changes, the computed is marked dirty. When
//!    something further upstream changes, it is only marked pending.
//!
//! 4. On next access, a pending computed re-checks its dependencies in the
//!    order it read them. If none of them changed, it is marked clean and
//!    returns its cache.
//!
//! 5. After recomputing, a result equal to the cached one does not bump the
//!    version, so consumers further down stay untouched.
//!
//! # Why This Matters
//!
//! - A state cell changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)
//!
//! # Errors
//!
//! A derivation returns [`Result`]. An error is cached exactly like a value
//! and returned on every read until a dependency changes. Returning the same
//! error again counts as "unchanged".

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::{untrack, ReactiveContext};
use super::options::Options;
use super::runtime::{Evaluation, Reactive, Runtime};
use crate::error::{Error, Result};
use crate::graph::{NodeFlags, NodeId, NodeKind};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A transitive dependency might have changed. Need to check.
    Pending,

    /// The computed definitely needs to recompute.
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound is used to detect when the computed value actually
/// changed. It can be replaced with [`Options::equals`].
///
/// # Example
///
/// ```
/// use ripple_core::{Computed, State};
///
/// let width = State::new(3);
/// let height = State::new(4);
/// let area = {
///     let (width, height) = (width.clone(), height.clone());
///     Computed::new(move || Ok(width.get()? * height.get()?))
/// };
///
/// assert_eq!(area.get().unwrap(), 12);
/// width.set(5).unwrap();
/// assert_eq!(area.get().unwrap(), 20);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

enum Cached<T> {
    Unset,
    Value(T),
    Error(Error),
}

struct ComputedInner<T: 'static> {
    id: NodeId,
    derive: Box<dyn Fn() -> Result<T>>,
    cached: RefCell<Cached<T>>,
    options: Options<T>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new computed with the given derivation.
    ///
    /// The derivation is not run immediately. It runs on first access.
    pub fn new(derive: impl Fn() -> Result<T> + 'static) -> Self {
        Self::with_options(derive, Options::default())
    }

    pub fn with_options(derive: impl Fn() -> Result<T> + 'static, options: Options<T>) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let handle: Weak<dyn Reactive> = this.clone();
            ComputedInner {
                id: Runtime::register(NodeKind::Computed, handle),
                derive: Box::new(derive),
                cached: RefCell::new(Cached::Unset),
                options,
            }
        });
        Self { inner }
    }

    /// Get the node id of this computed.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Number of times the cached result has changed.
    pub fn version(&self) -> u64 {
        Runtime::version(self.inner.id)
    }

    pub(super) fn node(&self) -> Rc<dyn Reactive> {
        self.inner.clone()
    }

    /// Get the current dirty state without validating.
    pub fn state(&self) -> ComputedState {
        let flags = Runtime::flags(self.inner.id);
        if flags.contains(NodeFlags::DIRTY) {
            ComputedState::Dirty
        } else if flags.contains(NodeFlags::PENDING) {
            ComputedState::Pending
        } else {
            ComputedState::Clean
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If called while another computed is evaluating, that computed now
    /// depends on this one. A cached error is returned as `Err`.
    pub fn get(&self) -> Result<T> {
        let id = self.inner.id;
        if ReactiveContext::is_notifying() {
            return Err(Error::ReadDuringNotification(NodeKind::Computed));
        }
        if Runtime::flags(id).contains(NodeFlags::TRACKING) {
            tracing::debug!(node = id.raw(), "cycle detected");
            return Err(Error::Cycle);
        }

        Runtime::refresh(id)?;
        Runtime::track(id);
        self.inner.read()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        untrack(|| self.get())
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn read(&self) -> Result<T> {
        match &*self.cached.borrow() {
            Cached::Value(value) => Ok(value.clone()),
            Cached::Error(err) => Err(err.clone()),
            Cached::Unset => unreachable!("computed read before its first evaluation"),
        }
    }

    /// Store a fresh result. Returns whether it differs from the cached one.
    fn store(&self, result: Result<T>) -> bool {
        let next = {
            let cached = self.cached.borrow();
            match (&*cached, result) {
                (Cached::Value(old), Ok(new)) => {
                    match untrack(|| self.options.is_equal(old, &new)) {
                        Ok(true) => return false,
                        Ok(false) => Cached::Value(new),
                        Err(err) => Cached::Error(err),
                    }
                }
                (Cached::Error(old), Err(new)) if *old == new => return false,
                (_, Ok(new)) => Cached::Value(new),
                (_, Err(err)) => Cached::Error(err),
            }
        };
        *self.cached.borrow_mut() = next;
        true
    }
}

impl<T> Reactive for ComputedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Computed
    }

    fn update(&self) -> Result<bool> {
        let mut evaluation = Evaluation::start(self.id)?;
        let result = evaluation.run(|| (self.derive)());
        evaluation.end();
        let changed = self.store(result);
        evaluation.settle(changed);
        Ok(changed)
    }

    fn watched(&self) {
        self.options.watched();
    }

    fn unwatched(&self) {
        self.options.unwatched();
    }

    fn refresh(&self) -> Result<()> {
        Runtime::refresh(self.id)?;
        match &*self.cached.borrow() {
            Cached::Error(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::dispose(self.id);
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Two handles are equal when they refer to the same computed.
impl<T: 'static> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Eq for Computed<T> {}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Computed");
        s.field("id", &self.inner.id);
        match self.inner.cached.try_borrow().as_deref() {
            Ok(Cached::Value(value)) => s.field("value", value),
            Ok(Cached::Error(err)) => s.field("error", err),
            Ok(Cached::Unset) => s.field("value", &"<unset>"),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::State;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<i32>>, Rc<Cell<i32>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn computed_caches_value() {
        let (calls, count) = counter();
        let computed = Computed::new(move || {
            count.set(count.get() + 1);
            Ok(42)
        });

        assert_eq!(calls.get(), 0);
        assert_eq!(computed.get(), Ok(42));
        assert_eq!(calls.get(), 1);
        assert_eq!(computed.get(), Ok(42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_tracks_dependencies() {
        let state = State::new(1);
        let source = state.clone();
        let doubled = Computed::new(move || Ok(source.get()? * 2));

        assert_eq!(doubled.get(), Ok(2));
        assert_eq!(doubled.state(), ComputedState::Clean);

        state.set(5).unwrap();
        assert_eq!(doubled.state(), ComputedState::Dirty);
        assert_eq!(doubled.get(), Ok(10));
    }

    #[test]
    fn pending_resolves_without_recompute() {
        let state = State::new(1);
        let source = state.clone();
        let parity = Computed::new(move || Ok(source.get()? % 2));
        let inner = parity.clone();
        let (calls, count) = counter();
        let label = Computed::new(move || {
            count.set(count.get() + 1);
            Ok(if inner.get()? == 0 { "even" } else { "odd" })
        });

        assert_eq!(label.get(), Ok("odd"));
        state.set(3).unwrap();
        assert_eq!(label.state(), ComputedState::Pending);

        assert_eq!(label.get(), Ok("odd"));
        assert_eq!(calls.get(), 1);
        assert_eq!(label.state(), ComputedState::Clean);
    }

    #[test]
    fn errors_are_cached() {
        let (calls, count) = counter();
        let failing = Computed::<i32>::new(move || {
            count.set(count.get() + 1);
            Err(Error::msg("broken"))
        });

        assert_eq!(failing.get(), Err(Error::msg("broken")));
        assert_eq!(failing.get(), Err(Error::msg("broken")));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reading_itself_is_a_cycle() {
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let this = slot.clone();
        let computed = Computed::new(move || match this.borrow().as_ref() {
            Some(me) => me.get(),
            None => Ok(0),
        });
        *slot.borrow_mut() = Some(computed.clone());

        assert_eq!(computed.get(), Err(Error::Cycle));
        slot.borrow_mut().take();
    }

    #[test]
    fn version_tracks_changes_only() {
        let state = State::new(2);
        let source = state.clone();
        let positive = Computed::new(move || Ok(source.get()? > 0));

        positive.get().unwrap();
        let version = positive.version();

        state.set(7).unwrap();
        positive.get().unwrap();
        assert_eq!(positive.version(), version);

        state.set(-1).unwrap();
        positive.get().unwrap();
        assert_eq!(positive.version(), version + 1);
    }
}
