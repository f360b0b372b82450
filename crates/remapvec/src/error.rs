//! Container-level errors.

use std::fmt;

use thiserror::Error;

/// Errors meant for ordinary application handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VecError {
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("capacity {capacity} exceeded")]
    CapacityExceeded { capacity: usize },
}

/// A rejected insertion into a full fixed-capacity vector.
///
/// Carries the element back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CapacityError<T> {
    element: T,
    capacity: usize,
}

impl<T> CapacityError<T> {
    pub(crate) const fn new(element: T, capacity: usize) -> Self {
        Self { element, capacity }
    }

    /// Recover the element that did not fit.
    pub fn into_inner(self) -> T {
        self.element
    }

    #[must_use]
    pub const fn element(&self) -> &T {
        &self.element
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for CapacityError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityError")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for CapacityError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&VecError::from(self), f)
    }
}

impl<T> std::error::Error for CapacityError<T> {}

impl<T> From<&CapacityError<T>> for VecError {
    fn from(err: &CapacityError<T>) -> Self {
        Self::CapacityExceeded {
            capacity: err.capacity,
        }
    }
}

impl<T> From<CapacityError<T>> for VecError {
    fn from(err: CapacityError<T>) -> Self {
        Self::from(&err)
    }
}
