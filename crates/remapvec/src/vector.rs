//! Dynamic vector over the remapping growth engine.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::iter::FusedIterator;
use core::mem;
use core::ops::{Bound, Deref, DerefMut, RangeBounds};
use core::ptr::NonNull;
use core::slice;
use std::sync::Arc;

use remapvec_core::lifetime::{self, shiftl, shiftr};
use remapvec_core::{
    AllocError, AllocObserver, Allocator, Bitwise, Expansion, GrowthPolicy, Relocation, Zeroable,
    global_policy,
};

use crate::error::VecError;

/// A growable array whose big buffers grow by remapping pages.
///
/// Elements are stored with relocation strategy `R`: [`Bitwise`] (the
/// default, valid for every Rust type) lets big buffers be extended by
/// `mremap` without touching a single element; [`ElementWise`] routes every
/// move through the type's [`Relocate`] hook.
///
/// `Vector` is `Send`/`Sync` exactly when `T` is. It performs no internal
/// locking; share it across threads the way you would share a `Vec`.
///
/// [`ElementWise`]: remapvec_core::ElementWise
/// [`Relocate`]: remapvec_core::Relocate
pub struct Vector<T, R: Relocation<T> = Bitwise> {
    buf: Allocator<T, R>,
}

/// Restores a shifted tail if filling the gap in front of it panics.
struct ShiftBack<'a, T, R: Relocation<T>> {
    buf: &'a mut Allocator<T, R>,
    index: usize,
    count: usize,
    tail: usize,
}

impl<T, R: Relocation<T>> Drop for ShiftBack<'_, T, R> {
    fn drop(&mut self) {
        // SAFETY: the gap is raw again (the filler cleans up after itself),
        // and the tail sits `count` slots to its right.
        unsafe {
            let base = self.buf.data();
            shiftl::<T, R>(base.add(self.index + self.count), self.tail, self.count);
            self.buf.set_size(self.index + self.tail);
        }
    }
}

/// Releases a fresh block if filling it panics.
struct DiscardFresh<'a, T, R: Relocation<T>> {
    buf: &'a Allocator<T, R>,
    ptr: NonNull<T>,
    capacity: usize,
}

impl<T, R: Relocation<T>> Drop for DiscardFresh<'_, T, R> {
    fn drop(&mut self) {
        // SAFETY: the block holds no live elements once the filler unwound.
        unsafe { self.buf.discard_fresh(self.ptr, self.capacity) };
    }
}

#[inline]
fn checked_len(len: usize, additional: usize) -> usize {
    len.checked_add(additional)
        .unwrap_or_else(|| AllocError::CapacityOverflow.handle())
}

impl<T> Vector<T> {
    /// Empty vector using the process-wide policy. Does not allocate.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(global_policy())
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_policy(capacity, global_policy())
    }

    /// `n` clones of `value`.
    #[must_use]
    pub fn from_elem(value: T, n: usize) -> Self
    where
        T: Clone,
    {
        let mut v = Self::with_capacity(n);
        v.resize(n, value);
        v
    }
}

impl<T, R: Relocation<T>> Vector<T, R> {
    #[must_use]
    pub const fn with_policy(policy: GrowthPolicy) -> Self {
        Self {
            buf: Allocator::with_policy(policy),
        }
    }

    #[must_use]
    pub fn with_capacity_and_policy(capacity: usize, policy: GrowthPolicy) -> Self {
        Self {
            buf: Allocator::with_capacity_and_policy(capacity, policy),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.size()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[inline]
    fn base(&self) -> *mut T {
        let data = self.buf.data();
        if data.is_null() {
            NonNull::dangling().as_ptr()
        } else {
            data
        }
    }

    /// Pointer to the first element, dangling when nothing is allocated.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.base()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.base()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: [0, len) is live; base is non-null and aligned.
        unsafe { slice::from_raw_parts(self.base(), self.len()) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, with unique access.
        unsafe { slice::from_raw_parts_mut(self.base(), self.len()) }
    }

    /// Checked access.
    pub fn at(&self, index: usize) -> Result<&T, VecError> {
        let len = self.len();
        self.as_slice()
            .get(index)
            .ok_or(VecError::IndexOutOfRange { index, len })
    }

    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, VecError> {
        let len = self.len();
        self.as_mut_slice()
            .get_mut(index)
            .ok_or(VecError::IndexOutOfRange { index, len })
    }

    #[must_use]
    pub fn policy(&self) -> &GrowthPolicy {
        self.buf.policy()
    }

    /// Whether the buffer currently lives in a virtual-memory mapping.
    #[must_use]
    pub fn is_big_region(&self) -> bool {
        self.buf.is_big_region()
    }

    /// Attach an allocation observer to this vector's buffer.
    pub fn observe(&mut self, observer: Arc<dyn AllocObserver>) {
        self.buf.observe(observer);
    }

    #[must_use]
    pub fn allocator(&self) -> &Allocator<T, R> {
        &self.buf
    }

    // ---------------------------------------------------------------------
    // Capacity
    // ---------------------------------------------------------------------

    /// Room for at least `additional` more elements, growing geometrically.
    pub fn reserve(&mut self, additional: usize) {
        let need = checked_len(self.len(), additional);
        self.buf.grow(need);
    }

    /// Room for at least `additional` more elements, without over-allocating
    /// beyond capacity fitting.
    pub fn reserve_exact(&mut self, additional: usize) {
        let need = checked_len(self.len(), additional);
        self.buf.expand(need);
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let need = self
            .len()
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        self.buf.try_grow(need)
    }

    pub fn try_reserve_exact(&mut self, additional: usize) -> Result<(), AllocError> {
        let need = self
            .len()
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        self.buf.try_expand(need)
    }

    pub fn shrink_to_fit(&mut self) {
        self.buf.shrink(self.len());
    }

    pub fn shrink_to(&mut self, min_capacity: usize) {
        self.buf.shrink(min_capacity.max(self.len()));
    }

    // ---------------------------------------------------------------------
    // Element operations
    // ---------------------------------------------------------------------

    pub fn push(&mut self, value: T) {
        let len = self.len();
        if len == self.capacity() {
            self.buf.grow(checked_len(len, 1));
        }
        // SAFETY: len < capacity after growth.
        unsafe {
            self.buf.data().add(len).write(value);
            self.buf.set_size(len + 1);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        // SAFETY: slot len - 1 is live and leaves the live prefix.
        unsafe {
            self.buf.set_size(len - 1);
            Some(self.buf.data().add(len - 1).read())
        }
    }

    /// Open `count` raw slots at `index` and let `fill` initialize them.
    ///
    /// `fill` gets the first slot of the gap; it must initialize all `count`
    /// slots, or leave every one of them raw if it panics.
    fn insert_with<F>(&mut self, index: usize, count: usize, fill: F)
    where
        F: FnOnce(*mut T),
    {
        let len = self.len();
        assert!(
            index <= len,
            "insertion index (is {index}) should be <= len (is {len})"
        );
        if count == 0 {
            return;
        }
        let new_len = checked_len(len, count);
        let tail = len - index;
        match self.buf.expand_or_alloc_raw(new_len) {
            Expansion::InPlace => {
                let base = self.buf.data();
                // SAFETY: capacity >= new_len, so the tail fits once shifted.
                // Only the prefix counts as live while the gap is open.
                let gap = unsafe {
                    self.buf.set_size(index);
                    shiftr::<T, R>(base.add(index), tail, count);
                    base.add(index)
                };
                let guard = ShiftBack {
                    buf: &mut self.buf,
                    index,
                    count,
                    tail,
                };
                fill(gap);
                mem::forget(guard);
                // SAFETY: prefix, gap and shifted tail are all live.
                unsafe { self.buf.set_size(new_len) };
            }
            Expansion::Fresh { ptr, capacity } => {
                let guard = DiscardFresh {
                    buf: &self.buf,
                    ptr,
                    capacity,
                };
                // SAFETY: index + count <= new_len <= capacity.
                fill(unsafe { ptr.as_ptr().add(index) });
                mem::forget(guard);
                let old = self.buf.data();
                // SAFETY: prefix and tail move into their final slots of the
                // fresh block; the old region is left without live elements.
                unsafe {
                    self.buf.relocate(old, ptr.as_ptr(), index);
                    if tail > 0 {
                        self.buf
                            .relocate(old.add(index), ptr.as_ptr().add(index + count), tail);
                    }
                    self.buf.commit_fresh(ptr, capacity, new_len);
                }
            }
        }
    }

    /// Insert `value` at `index`, shifting the tail right.
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) {
        // SAFETY: writing one value cannot panic.
        self.insert_with(index, 1, |gap| unsafe { gap.write(value) });
    }

    /// Insert `n` clones of `value` at `index`.
    pub fn insert_n(&mut self, index: usize, n: usize, value: &T)
    where
        T: Clone,
    {
        // SAFETY: the gap holds `n` raw slots; ufill cleans up on panic.
        self.insert_with(index, n, |gap| unsafe { lifetime::ufill(gap, n, value) });
    }

    /// Insert clones of `items` at `index`, in order.
    pub fn insert_slice(&mut self, index: usize, items: &[T])
    where
        T: Clone,
    {
        // SAFETY: the gap holds `items.len()` raw slots; ucopy cleans up on
        // panic. `items` cannot alias `self` (it is borrowed separately).
        self.insert_with(index, items.len(), |gap| unsafe { lifetime::ucopy(gap, items) });
    }

    /// Remove and return the element at `index`, shifting the tail left.
    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len();
        assert!(
            index < len,
            "removal index (is {index}) should be < len (is {len})"
        );
        // SAFETY: index < len; after the read the slot is raw and the tail
        // shifts over it.
        unsafe {
            let base = self.buf.data();
            let value = base.add(index).read();
            shiftl::<T, R>(base.add(index + 1), len - index - 1, 1);
            self.buf.set_size(len - 1);
            value
        }
    }

    /// Remove the element at `index`, filling the hole with the last one.
    pub fn swap_remove(&mut self, index: usize) -> T {
        let len = self.len();
        assert!(
            index < len,
            "swap_remove index (is {index}) should be < len (is {len})"
        );
        let last = len - 1;
        // SAFETY: both slots are live; the hole is refilled before the
        // length drops.
        unsafe {
            let base = self.buf.data();
            let value = base.add(index).read();
            if index != last {
                lifetime::relocate::<T, R>(base.add(last), base.add(index), 1);
            }
            self.buf.set_size(last);
            value
        }
    }

    /// Destroy the elements in `range`, shifting the tail left.
    pub fn remove_range<B: RangeBounds<usize>>(&mut self, range: B) {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.checked_add(1).unwrap_or(usize::MAX),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.checked_add(1).unwrap_or(usize::MAX),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };
        assert!(start <= end, "range start {start} greater than end {end}");
        assert!(end <= len, "range end {end} out of range for length {len}");
        if start == end {
            return;
        }
        // SAFETY: [start, end) is live. The length drops to `start` first, so
        // a panicking destructor leaks the tail instead of double-dropping.
        unsafe {
            let base = self.buf.data();
            self.buf.set_size(start);
            lifetime::destroy(base.add(start), end - start);
            shiftl::<T, R>(base.add(end), len - end, end - start);
            self.buf.set_size(len - (end - start));
        }
    }

    pub fn truncate(&mut self, len: usize) {
        let old = self.len();
        if len >= old {
            return;
        }
        // SAFETY: [len, old) is live and leaves the prefix first.
        unsafe {
            self.buf.set_size(len);
            lifetime::destroy(self.buf.data().add(len), old - len);
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Grow with clones of `value` or truncate to `new_len`.
    pub fn resize(&mut self, new_len: usize, value: T)
    where
        T: Clone,
    {
        let len = self.len();
        if new_len <= len {
            self.truncate(new_len);
            return;
        }
        self.buf.grow(new_len);
        // SAFETY: [len, new_len) is raw; ufill cleans up on panic.
        unsafe {
            lifetime::ufill(self.buf.data().add(len), new_len - len, &value);
            self.buf.set_size(new_len);
        }
    }

    pub fn resize_with<F: FnMut() -> T>(&mut self, new_len: usize, f: F) {
        let len = self.len();
        if new_len <= len {
            self.truncate(new_len);
            return;
        }
        self.buf.grow(new_len);
        // SAFETY: [len, new_len) is raw; construct_with cleans up on panic.
        unsafe {
            lifetime::construct_with(self.buf.data().add(len), new_len - len, f);
            self.buf.set_size(new_len);
        }
    }

    /// Grow with zero-filled defaults (one `memset`) or truncate.
    pub fn resize_default(&mut self, new_len: usize)
    where
        T: Zeroable,
    {
        let len = self.len();
        if new_len <= len {
            self.truncate(new_len);
            return;
        }
        self.buf.grow(new_len);
        // SAFETY: [len, new_len) is raw.
        unsafe {
            lifetime::construct_zeroed(self.buf.data().add(len), new_len - len);
            self.buf.set_size(new_len);
        }
    }

    pub fn extend_from_slice(&mut self, items: &[T])
    where
        T: Clone,
    {
        let len = self.len();
        self.buf.grow(checked_len(len, items.len()));
        // SAFETY: room for items.len() raw slots past len.
        unsafe {
            lifetime::ucopy(self.buf.data().add(len), items);
            self.buf.set_size(len + items.len());
        }
    }

    /// Bulk `memcpy` append.
    pub fn extend_from_copy_slice(&mut self, items: &[T])
    where
        T: Copy,
    {
        let len = self.len();
        self.buf.grow(checked_len(len, items.len()));
        // SAFETY: room for items.len() raw slots past len.
        unsafe {
            lifetime::ucopy_trivial(self.buf.data().add(len), items);
            self.buf.set_size(len + items.len());
        }
    }

    /// Replace the contents with clones of `items`.
    ///
    /// The old contents are destroyed before any new storage is obtained.
    pub fn assign_slice(&mut self, items: &[T])
    where
        T: Clone,
    {
        self.buf.expand_or_dealloc_and_alloc_raw(items.len());
        // SAFETY: the buffer is empty with room for items.len().
        unsafe {
            lifetime::ucopy(self.base(), items);
            self.buf.set_size(items.len());
        }
    }

    /// Replace the contents with `n` clones of `value`.
    pub fn assign_fill(&mut self, n: usize, value: &T)
    where
        T: Clone,
    {
        self.buf.expand_or_dealloc_and_alloc_raw(n);
        // SAFETY: the buffer is empty with room for n.
        unsafe {
            lifetime::ufill(self.base(), n, value);
            self.buf.set_size(n);
        }
    }
}

impl<T, R: Relocation<T>> Drop for Vector<T, R> {
    fn drop(&mut self) {
        self.truncate(0);
    }
}

impl<T, R: Relocation<T>> Default for Vector<T, R> {
    fn default() -> Self {
        Self::with_policy(global_policy())
    }
}

impl<T, R: Relocation<T>> Deref for Vector<T, R> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, R: Relocation<T>> DerefMut for Vector<T, R> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, R: Relocation<T>> AsRef<[T]> for Vector<T, R> {
    fn as_ref(&self) -> &[T] {
        self
    }
}

impl<T, R: Relocation<T>> AsMut<[T]> for Vector<T, R> {
    fn as_mut(&mut self) -> &mut [T] {
        self
    }
}

impl<T: Clone, R: Relocation<T>> Clone for Vector<T, R> {
    fn clone(&self) -> Self {
        let mut out = Self::with_capacity_and_policy(self.len(), *self.policy());
        out.extend_from_slice(self);
        out
    }
}

impl<T: fmt::Debug, R: Relocation<T>> fmt::Debug for Vector<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T, U, R, S> PartialEq<Vector<U, S>> for Vector<T, R>
where
    T: PartialEq<U>,
    R: Relocation<T>,
    S: Relocation<U>,
{
    fn eq(&self, other: &Vector<U, S>) -> bool {
        self[..] == other[..]
    }
}

impl<T: Eq, R: Relocation<T>> Eq for Vector<T, R> {}

impl<T: PartialEq<U>, U, R: Relocation<T>> PartialEq<[U]> for Vector<T, R> {
    fn eq(&self, other: &[U]) -> bool {
        self[..] == other[..]
    }
}

impl<T: PartialEq<U>, U, R: Relocation<T>> PartialEq<&[U]> for Vector<T, R> {
    fn eq(&self, other: &&[U]) -> bool {
        self[..] == other[..]
    }
}

impl<T: PartialEq<U>, U, R: Relocation<T>, const N: usize> PartialEq<[U; N]> for Vector<T, R> {
    fn eq(&self, other: &[U; N]) -> bool {
        self[..] == other[..]
    }
}

impl<T: PartialEq<U>, U, R: Relocation<T>> PartialEq<Vec<U>> for Vector<T, R> {
    fn eq(&self, other: &Vec<U>) -> bool {
        self[..] == other[..]
    }
}

impl<T: PartialOrd, R: Relocation<T>> PartialOrd for Vector<T, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self[..].partial_cmp(&other[..])
    }
}

impl<T: Ord, R: Relocation<T>> Ord for Vector<T, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self[..].cmp(&other[..])
    }
}

impl<T: Hash, R: Relocation<T>> Hash for Vector<T, R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Hash::hash(&**self, state);
    }
}

impl<T, R: Relocation<T>> Extend<T> for Vector<T, R> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(lower);
        for item in iter {
            self.push(item);
        }
    }
}

impl<'a, T: Copy + 'a, R: Relocation<T>> Extend<&'a T> for Vector<T, R> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T, R: Relocation<T>> FromIterator<T> for Vector<T, R> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut v = Self::default();
        v.extend(iter);
        v
    }
}

impl<T: Clone, R: Relocation<T>> From<&[T]> for Vector<T, R> {
    fn from(items: &[T]) -> Self {
        let mut v = Self::default();
        v.extend_from_slice(items);
        v
    }
}

impl<T, R: Relocation<T>, const N: usize> From<[T; N]> for Vector<T, R> {
    fn from(items: [T; N]) -> Self {
        let mut v = Self::default();
        v.buf.expand(N);
        // SAFETY: N raw slots; moving out of an array cannot panic.
        unsafe {
            let written = lifetime::umove(v.base(), items, N);
            v.buf.set_size(written);
        }
        v
    }
}

impl<'a, T, R: Relocation<T>> IntoIterator for &'a Vector<T, R> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, R: Relocation<T>> IntoIterator for &'a mut Vector<T, R> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, R: Relocation<T>> IntoIterator for Vector<T, R> {
    type Item = T;
    type IntoIter = IntoIter<T, R>;

    fn into_iter(mut self) -> Self::IntoIter {
        let end = self.len();
        let policy = *self.policy();
        let mut buf = mem::replace(&mut self.buf, Allocator::with_policy(policy));
        // SAFETY: ownership of [0, end) moves to the iterator's cursor.
        unsafe { buf.set_size(0) };
        IntoIter { buf, start: 0, end }
    }
}

/// Owning iterator over a [`Vector`].
pub struct IntoIter<T, R: Relocation<T> = Bitwise> {
    buf: Allocator<T, R>,
    start: usize,
    end: usize,
}

impl<T, R: Relocation<T>> IntoIter<T, R> {
    /// The elements not yet yielded.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        if self.start == self.end {
            return &[];
        }
        // SAFETY: [start, end) is live.
        unsafe { slice::from_raw_parts(self.buf.as_ptr().add(self.start), self.end - self.start) }
    }
}

impl<T, R: Relocation<T>> Iterator for IntoIter<T, R> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.start == self.end {
            return None;
        }
        let index = self.start;
        self.start += 1;
        // SAFETY: slot `index` is live and leaves the cursor range.
        Some(unsafe { self.buf.data().add(index).read() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end - self.start;
        (n, Some(n))
    }
}

impl<T, R: Relocation<T>> DoubleEndedIterator for IntoIter<T, R> {
    fn next_back(&mut self) -> Option<T> {
        if self.start == self.end {
            return None;
        }
        self.end -= 1;
        // SAFETY: slot `end` is live and leaves the cursor range.
        Some(unsafe { self.buf.data().add(self.end).read() })
    }
}

impl<T, R: Relocation<T>> ExactSizeIterator for IntoIter<T, R> {}

impl<T, R: Relocation<T>> FusedIterator for IntoIter<T, R> {}

impl<T: fmt::Debug, R: Relocation<T>> fmt::Debug for IntoIter<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.as_slice()).finish()
    }
}

impl<T, R: Relocation<T>> Drop for IntoIter<T, R> {
    fn drop(&mut self) {
        let (start, end) = (self.start, self.end);
        self.start = end;
        if start < end {
            // SAFETY: [start, end) was live and is no longer reachable.
            unsafe { lifetime::destroy(self.buf.data().add(start), end - start) };
        }
    }
}
