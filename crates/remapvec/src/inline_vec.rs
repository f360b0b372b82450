//! Fixed-capacity vector stored inline.
//!
//! Capacity is the const parameter `N`. Nothing is ever allocated, and an
//! operation that would exceed `N` fails without changing the vector.

use core::fmt;
use core::mem::MaybeUninit;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::slice;

use crate::error::{CapacityError, VecError};

pub struct InlineVec<T, const N: usize> {
    items: [MaybeUninit<T>; N],
    len: usize,
}

impl<T, const N: usize> InlineVec<T, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: [const { MaybeUninit::uninit() }; N],
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    #[inline]
    #[must_use]
    pub const fn remaining_capacity(&self) -> usize {
        N - self.len
    }

    #[inline]
    fn base(&self) -> *const T {
        self.items.as_ptr().cast()
    }

    #[inline]
    fn base_mut(&mut self) -> *mut T {
        self.items.as_mut_ptr().cast()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: [0, len) is initialized.
        unsafe { slice::from_raw_parts(self.base(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        // SAFETY: [0, len) is initialized.
        unsafe { slice::from_raw_parts_mut(self.base_mut(), len) }
    }

    pub fn at(&self, index: usize) -> Result<&T, VecError> {
        self.as_slice().get(index).ok_or(VecError::IndexOutOfRange {
            index,
            len: self.len,
        })
    }

    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, VecError> {
        let len = self.len;
        self.as_mut_slice()
            .get_mut(index)
            .ok_or(VecError::IndexOutOfRange { index, len })
    }

    /// Append `value`, handing it back if the vector is full.
    pub fn try_push(&mut self, value: T) -> Result<(), CapacityError<T>> {
        if self.len == N {
            return Err(CapacityError::new(value, N));
        }
        self.items[self.len].write(value);
        self.len += 1;
        Ok(())
    }

    /// Append `value`.
    ///
    /// Panics with [`VecError::CapacityExceeded`] if the vector is full.
    pub fn push(&mut self, value: T) {
        if let Err(err) = self.try_push(value) {
            panic!("{}", VecError::from(&err));
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: slot len was initialized and is now outside the live prefix.
        Some(unsafe { self.items[self.len].assume_init_read() })
    }

    /// Insert `value` at `index`, handing it back if the vector is full.
    ///
    /// Panics if `index > len`.
    pub fn try_insert(&mut self, index: usize, value: T) -> Result<(), CapacityError<T>> {
        let len = self.len;
        assert!(
            index <= len,
            "insertion index (is {index}) should be <= len (is {len})"
        );
        if len == N {
            return Err(CapacityError::new(value, N));
        }
        let base = self.base_mut();
        // SAFETY: len < N, so shifting [index, len) right by one stays inside
        // the array; the vacated slot is then written.
        unsafe {
            ptr::copy(base.add(index), base.add(index + 1), len - index);
            base.add(index).write(value);
        }
        self.len = len + 1;
        Ok(())
    }

    pub fn insert(&mut self, index: usize, value: T) {
        if let Err(err) = self.try_insert(index, value) {
            panic!("{}", VecError::from(&err));
        }
    }

    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len;
        assert!(
            index < len,
            "removal index (is {index}) should be < len (is {len})"
        );
        let base = self.base_mut();
        // SAFETY: index < len; the hole is closed by the copy.
        unsafe {
            let value = base.add(index).read();
            ptr::copy(base.add(index + 1), base.add(index), len - index - 1);
            self.len = len - 1;
            value
        }
    }

    pub fn swap_remove(&mut self, index: usize) -> T {
        let len = self.len;
        assert!(
            index < len,
            "swap_remove index (is {index}) should be < len (is {len})"
        );
        self.as_mut_slice().swap(index, len - 1);
        self.len = len - 1;
        // SAFETY: the former slot `index` now sits past the live prefix.
        unsafe { self.items[len - 1].assume_init_read() }
    }

    pub fn truncate(&mut self, len: usize) {
        let old = self.len;
        if len >= old {
            return;
        }
        self.len = len;
        // SAFETY: [len, old) was initialized and is no longer reachable.
        unsafe {
            let tail = ptr::slice_from_raw_parts_mut(self.base_mut().add(len), old - len);
            ptr::drop_in_place(tail);
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Append clones of `items`, or nothing at all if they do not fit.
    pub fn try_extend_from_slice(&mut self, items: &[T]) -> Result<(), VecError>
    where
        T: Clone,
    {
        if items.len() > self.remaining_capacity() {
            return Err(VecError::CapacityExceeded { capacity: N });
        }
        for item in items {
            self.items[self.len].write(item.clone());
            self.len += 1;
        }
        Ok(())
    }
}

impl<T, const N: usize> Drop for InlineVec<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, const N: usize> Default for InlineVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Deref for InlineVec<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const N: usize> DerefMut for InlineVec<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Clone, const N: usize> Clone for InlineVec<T, N> {
    fn clone(&self) -> Self {
        let mut out = Self::new();
        for item in self.iter() {
            out.items[out.len].write(item.clone());
            out.len += 1;
        }
        out
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for InlineVec<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq<U>, U, const N: usize, const M: usize> PartialEq<InlineVec<U, M>>
    for InlineVec<T, N>
{
    fn eq(&self, other: &InlineVec<U, M>) -> bool {
        self[..] == other[..]
    }
}

impl<T: Eq, const N: usize> Eq for InlineVec<T, N> {}

impl<T: PartialEq<U>, U, const N: usize, const M: usize> PartialEq<[U; M]> for InlineVec<T, N> {
    fn eq(&self, other: &[U; M]) -> bool {
        self[..] == other[..]
    }
}

impl<T: PartialEq<U>, U, const N: usize> PartialEq<[U]> for InlineVec<T, N> {
    fn eq(&self, other: &[U]) -> bool {
        self[..] == other[..]
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a InlineVec<T, N> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
