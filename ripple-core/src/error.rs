//! Error types for the reactive graph.
//!
//! Every fallible read or write returns [`Result`]. Errors are `Clone` because a
//! computed cell caches the error produced by its derivation and hands out a
//! copy on every read until it recomputes.

use std::fmt;
use std::rc::Rc;

use crate::graph::NodeKind;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while reading from or writing to the graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A node was read while a watcher's notify callback was running.
    #[error("cannot read from {0} inside watcher notification")]
    ReadDuringNotification(NodeKind),

    /// A state cell was written while a watcher's notify callback was running.
    #[error("cannot write to state inside watcher notification")]
    WriteDuringNotification,

    /// A computed cell read itself, directly or through other computeds.
    #[error("detected cycle in computations")]
    Cycle,

    /// Raised by a derivation or an equality function.
    #[error(transparent)]
    Computation(#[from] ComputationError),
}

impl Error {
    /// Build a computation error from a plain message.
    ///
    /// Computation errors compare by message, not by identity. A computed
    /// that fails again with the same text counts as unchanged, and its
    /// consumers are not recomputed. Give errors distinct messages if every
    /// failure should propagate.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Computation(ComputationError::new(Message(message.into())))
    }

    /// Wrap an arbitrary error raised by user code.
    pub fn computation<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Error::Computation(ComputationError::new(error))
    }

    /// True for errors that originate from user code rather than the engine.
    pub fn is_computation(&self) -> bool {
        matches!(self, Error::Computation(_))
    }
}

/// A user error, shared so it can be cached and handed out repeatedly.
///
/// Two computation errors are equal when they are the same allocation or
/// render the same message. A computed that keeps failing the same way is
/// therefore treated as unchanged and does not re-propagate.
#[derive(Clone)]
pub struct ComputationError(Rc<dyn std::error::Error>);

impl ComputationError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self(Rc::new(error))
    }

    /// Access the wrapped error.
    pub fn inner(&self) -> &(dyn std::error::Error + 'static) {
        &*self.0
    }
}

impl PartialEq for ComputationError {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.to_string() == other.0.to_string()
    }
}

impl fmt::Debug for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComputationError")
            .field(&self.0.to_string())
            .finish()
    }
}

impl fmt::Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ComputationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_compare_by_text() {
        assert_eq!(Error::msg("first"), Error::msg("first"));
        assert_ne!(Error::msg("first"), Error::msg("second"));
        assert_ne!(Error::msg("first"), Error::Cycle);
    }

    #[test]
    fn display_is_transparent_for_user_errors() {
        assert_eq!(Error::msg("boom").to_string(), "boom");
        assert!(Error::msg("boom").is_computation());
        assert!(!Error::Cycle.is_computation());
    }

    #[test]
    fn wraps_std_errors() {
        let err = Error::computation(std::fmt::Error);
        assert!(err.is_computation());
        assert_eq!(err.clone(), err);
    }
}
