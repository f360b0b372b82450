//! Raw allocate/deallocate, routed by size class.
//!
//! Small regions live on the global heap (`std::alloc`), big regions are
//! anonymous mappings. These are the only functions that touch either
//! backend. Capacities passed in must already be fitted: `n` must equal
//! `fix_capacity(n)`, and `dealloc` must see the same `n` as the matching
//! `alloc`.

use core::ptr::NonNull;
use std::alloc::{self, Layout};

use crate::capability::Relocation;
use crate::capacity::SizePolicy;
use crate::error::{AllocError, Result};
use crate::vm::{self, RemapMode};

#[inline]
fn heap_layout<T>(n: usize) -> Result<Layout> {
    Layout::array::<T>(n).map_err(|_| AllocError::CapacityOverflow)
}

/// Obtain uninitialized storage for `n` elements.
///
/// `n` must be a fitted, non-zero capacity and `T` must not be zero-sized.
pub fn alloc<T, R: Relocation<T>>(sizing: &SizePolicy<T, R>, n: usize) -> Result<NonNull<T>> {
    debug_assert!(n > 0 && !SizePolicy::<T, R>::is_zst());
    debug_assert_eq!(sizing.fix_capacity(n), Ok(n), "alloc of unfitted capacity");
    if sizing.is_big(n) {
        let len = sizing.map_len(n)?;
        let ptr = vm::map(len).map_err(|_| AllocError::Exhausted {
            bytes: len,
            align: vm::page_size(),
        })?;
        Ok(ptr.cast())
    } else {
        let layout = heap_layout::<T>(n)?;
        // SAFETY: layout has non-zero size (n > 0, T not zero-sized).
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr.cast()).ok_or(AllocError::exhausted(layout))
    }
}

/// Release storage obtained from [`alloc`] with the same `n`.
///
/// # Safety
///
/// `ptr` must come from `alloc(sizing, n)` (or a resize ending at `n`) under
/// a policy that classifies `n` identically, and must not be used again.
pub unsafe fn dealloc<T, R: Relocation<T>>(sizing: &SizePolicy<T, R>, ptr: NonNull<T>, n: usize) {
    debug_assert!(n > 0);
    if sizing.is_big(n) {
        let Ok(len) = sizing.map_len(n) else {
            return;
        };
        // SAFETY: forwarded caller contract; the mapping is exactly `len`.
        let res = unsafe { vm::unmap(ptr.cast(), len) };
        debug_assert!(res.is_ok(), "munmap failed: {res:?}");
    } else if let Ok(layout) = heap_layout::<T>(n) {
        // SAFETY: forwarded caller contract; same layout as the allocation.
        unsafe { alloc::dealloc(ptr.as_ptr().cast(), layout) };
    }
}

/// Resize a small heap block, letting the allocator move it.
///
/// On failure the original block is untouched.
///
/// # Safety
///
/// `ptr` must be a live small block of `old_n` elements; on success it is
/// invalidated in favor of the returned pointer.
pub unsafe fn heap_realloc<T>(ptr: NonNull<T>, old_n: usize, new_n: usize) -> Result<NonNull<T>> {
    debug_assert!(old_n > 0 && new_n > 0);
    let old = heap_layout::<T>(old_n)?;
    let new = heap_layout::<T>(new_n)?;
    // SAFETY: forwarded caller contract; the new size is non-zero and was
    // validated by Layout::array.
    let out = unsafe { alloc::realloc(ptr.as_ptr().cast(), old, new.size()) };
    NonNull::new(out.cast()).ok_or(AllocError::exhausted(new))
}

/// Resize a big mapping from `old_n` to `new_n` elements.
///
/// Returns the errno on failure, leaving the mapping untouched.
///
/// # Safety
///
/// `ptr` must be a live big region of `old_n` elements; on a moved success
/// the old address is invalid.
pub unsafe fn remap<T, R: Relocation<T>>(
    sizing: &SizePolicy<T, R>,
    ptr: NonNull<T>,
    old_n: usize,
    new_n: usize,
    mode: RemapMode,
) -> core::result::Result<NonNull<T>, i32> {
    debug_assert!(sizing.is_big(old_n) && sizing.is_big(new_n));
    let old_len = sizing.map_len(old_n).map_err(|_| libc::EINVAL)?;
    let new_len = sizing.map_len(new_n).map_err(|_| libc::ENOMEM)?;
    // SAFETY: forwarded caller contract.
    let out = unsafe { vm::remap(ptr.cast(), old_len, new_len, mode) }?;
    Ok(out.cast())
}
