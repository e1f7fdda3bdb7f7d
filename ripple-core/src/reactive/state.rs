//! State Implementation
//!
//! A State is the writable root of the graph. It holds a value and a
//! version, and notifies the graph when the value changes.
//!
//! # How State Works
//!
//! 1. When a state cell is read while a computed is evaluating, the read is
//!    recorded as a dependency of that computed.
//!
//! 2. When a new value is written, it is compared with the old one. Equal
//!    values are dropped on the floor: no version bump, nothing marked.
//!
//! 3. A different value bumps the version, marks everything downstream and
//!    runs the notify callbacks of the watchers it reached.
//!
//! # Memory Layout
//!
//! Each state cell consists of:
//! - A node id into the thread-local graph
//! - The value, behind a `RefCell`
//! - Its [`Options`]

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::{untrack, ReactiveContext};
use super::options::Options;
use super::runtime::{Reactive, Runtime};
use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeKind};

/// A writable reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```
/// use ripple_core::State;
///
/// let count = State::new(0);
/// count.set(5).unwrap();
/// assert_eq!(count.get().unwrap(), 5);
/// ```
pub struct State<T: 'static> {
    inner: Rc<StateInner<T>>,
}

struct StateInner<T: 'static> {
    id: NodeId,
    value: RefCell<T>,
    options: Options<T>,
}

impl<T> State<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new state cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_options(value, Options::default())
    }

    pub fn with_options(value: T, options: Options<T>) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<StateInner<T>>| {
            let handle: Weak<dyn Reactive> = this.clone();
            StateInner {
                id: Runtime::register(NodeKind::State, handle),
                value: RefCell::new(value),
                options,
            }
        });
        Self { inner }
    }

    /// Get the node id of this cell.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub(super) fn node(&self) -> Rc<dyn Reactive> {
        self.inner.clone()
    }

    /// Number of times the value has changed.
    pub fn version(&self) -> u64 {
        Runtime::version(self.inner.id)
    }

    /// Get the current value.
    ///
    /// If called while a computed is evaluating, that computed now depends
    /// on this cell.
    pub fn get(&self) -> Result<T> {
        if ReactiveContext::is_notifying() {
            return Err(Error::ReadDuringNotification(NodeKind::State));
        }
        Runtime::track(self.inner.id);
        Ok(self.inner.value.borrow().clone())
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        untrack(|| self.get())
    }

    /// Set a new value.
    ///
    /// A value equal to the current one is ignored. Otherwise dependents are
    /// marked and watchers are notified before this returns.
    pub fn set(&self, value: T) -> Result<()> {
        if ReactiveContext::is_notifying() {
            return Err(Error::WriteDuringNotification);
        }

        let unchanged = {
            let current = self.inner.value.borrow();
            untrack(|| self.inner.options.is_equal(&current, &value))?
        };
        if unchanged {
            return Ok(());
        }

        *self.inner.value.borrow_mut() = value;
        Runtime::source_changed(self.inner.id);
        Ok(())
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        if ReactiveContext::is_notifying() {
            return Err(Error::WriteDuringNotification);
        }
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }
}

impl<T> Reactive for StateInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::State
    }

    fn watched(&self) {
        self.options.watched();
    }

    fn unwatched(&self) {
        self.options.unwatched();
    }
}

impl<T: 'static> Drop for StateInner<T> {
    fn drop(&mut self) {
        Runtime::dispose(self.id);
    }
}

impl<T: 'static> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Two handles are equal when they refer to the same cell.
impl<T: 'static> PartialEq for State<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Eq for State<T> {}

impl<T: fmt::Debug + 'static> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("State");
        s.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn state_get_and_set() {
        let state = State::new(42);
        assert_eq!(state.get(), Ok(42));

        state.set(100).unwrap();
        assert_eq!(state.get(), Ok(100));
    }

    #[test]
    fn state_update() {
        let state = State::new(10);
        state.update(|x| x * 2).unwrap();
        assert_eq!(state.get(), Ok(20));
    }

    #[test]
    fn equal_writes_do_not_bump_the_version() {
        let state = State::new(1);
        let version = state.version();

        state.set(1).unwrap();
        assert_eq!(state.version(), version);

        state.set(2).unwrap();
        assert_eq!(state.version(), version + 1);
    }

    #[test]
    fn custom_equality_suppresses_writes() {
        let state = State::with_options(
            String::from("Hello"),
            Options::new().equals(|a: &String, b: &String| a.eq_ignore_ascii_case(b)),
        );

        state.set(String::from("HELLO")).unwrap();
        assert_eq!(state.get().unwrap(), "Hello");

        state.set(String::from("World")).unwrap();
        assert_eq!(state.get().unwrap(), "World");
    }

    #[test]
    fn failed_equality_rejects_the_write() {
        let state = State::with_options(1, Options::new().try_equals(|_, _| Err(Error::msg("nope"))));

        assert_eq!(state.set(2), Err(Error::msg("nope")));
        assert_eq!(state.get(), Ok(1));
    }

    #[test]
    fn equality_runs_untracked() {
        let seen = Rc::new(Cell::new(None));
        let record = seen.clone();
        let state = State::with_options(
            0,
            Options::new().equals(move |a, b| {
                record.set(Some(ReactiveContext::is_active()));
                a == b
            }),
        );

        state.set(1).unwrap();
        assert_eq!(seen.get(), Some(false));
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = State::new(1);
        let b = State::new(1);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn dropping_the_last_handle_frees_the_node() {
        let before = Runtime::node_count();
        let state = State::new(());
        let copy = state.clone();

        drop(state);
        assert_eq!(Runtime::node_count(), before + 1);
        drop(copy);
        assert_eq!(Runtime::node_count(), before);
    }
}
