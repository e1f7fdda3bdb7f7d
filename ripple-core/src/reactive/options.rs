//! Per-cell configuration.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;

type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> Result<bool>>;
type HookFn = Rc<dyn Fn()>;

/// Options accepted by [`State`](super::State) and [`Computed`](super::Computed).
///
/// ```
/// use ripple_core::{Options, State};
///
/// let celsius = State::with_options(
///     21.4_f64,
///     Options::new().equals(|a: &f64, b: &f64| (a - b).abs() < 0.5),
/// );
/// celsius.set(21.6).unwrap();
/// assert_eq!(celsius.get().unwrap(), 21.4);
/// ```
pub struct Options<T> {
    equals: Option<EqualsFn<T>>,
    on_watched: Option<HookFn>,
    on_unwatched: Option<HookFn>,
}

impl<T> Options<T> {
    pub fn new() -> Self {
        Self {
            equals: None,
            on_watched: None,
            on_unwatched: None,
        }
    }

    /// Replace `PartialEq` as the test for "the value did not change".
    pub fn equals(self, equals: impl Fn(&T, &T) -> bool + 'static) -> Self
    where
        T: 'static,
    {
        self.try_equals(move |a, b| Ok(equals(a, b)))
    }

    /// Like [`equals`](Self::equals), but the comparison may fail.
    ///
    /// On a computed, a failed comparison is cached as the computed's error.
    pub fn try_equals(mut self, equals: impl Fn(&T, &T) -> Result<bool> + 'static) -> Self {
        self.equals = Some(Rc::new(equals));
        self
    }

    /// Called when the cell gains its first live sink.
    pub fn on_watched(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_watched = Some(Rc::new(hook));
        self
    }

    /// Called when the cell loses its last live sink.
    pub fn on_unwatched(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_unwatched = Some(Rc::new(hook));
        self
    }

    pub(crate) fn is_equal(&self, old: &T, new: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        match &self.equals {
            Some(equals) => equals(old, new),
            None => Ok(old == new),
        }
    }

    pub(crate) fn watched(&self) {
        if let Some(hook) = &self.on_watched {
            hook();
        }
    }

    pub(crate) fn unwatched(&self) {
        if let Some(hook) = &self.on_unwatched {
            hook();
        }
    }
}

impl<T> Default for Options<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            equals: self.equals.clone(),
            on_watched: self.on_watched.clone(),
            on_unwatched: self.on_unwatched.clone(),
        }
    }
}

impl<T> fmt::Debug for Options<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("equals", &self.equals.is_some())
            .field("on_watched", &self.on_watched.is_some())
            .field("on_unwatched", &self.on_unwatched.is_some())
            .finish()
    }
}
