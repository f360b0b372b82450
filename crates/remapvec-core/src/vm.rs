//! Anonymous virtual-memory backend for big regions.
//!
//! Exposes the three primitives the growth engine needs: map a fresh
//! anonymous region, release it, and resize it with or without permission
//! for the kernel to move it. Only Linux offers the resize primitive
//! (`mremap`); everywhere else [`AVAILABLE`] is false and the capacity
//! policy classifies every request as small, so none of these functions is
//! ever reached.

use core::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fallback page size when the OS query fails.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Whether this target has the map/remap/unmap facility.
pub const AVAILABLE: bool = cfg!(target_os = "linux");

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// How a resize request may be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RemapMode {
    /// Extend or shrink at the current address, or fail.
    InPlace,
    /// The kernel may move the mapping (pages are not copied).
    MayMove,
}

/// System page size in bytes, queried once and cached.
#[must_use]
pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let size = query_page_size();
    PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 && (raw as usize).is_power_of_two() {
        raw as usize
    } else {
        DEFAULT_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Round `bytes` up to a whole number of pages. `None` on overflow.
#[must_use]
pub fn page_align(bytes: usize) -> Option<usize> {
    let page = page_size();
    bytes.checked_add(page - 1).map(|b| b & !(page - 1))
}

/// Map `len` bytes of zeroed, read-write anonymous memory.
///
/// `len` must be a non-zero multiple of [`page_size`]. Returns the errno on
/// failure.
#[cfg(target_os = "linux")]
pub fn map(len: usize) -> Result<NonNull<u8>, i32> {
    use crate::syscall;
    debug_assert!(len > 0 && len % page_size() == 0, "map length {len} not page-sized");
    // SAFETY: anonymous private mapping, no fd, kernel picks the address.
    let ptr = unsafe {
        syscall::sys_mmap(
            core::ptr::null_mut(),
            len,
            syscall::PROT_READ | syscall::PROT_WRITE,
            syscall::MAP_PRIVATE | syscall::MAP_ANONYMOUS,
            -1,
            0,
        )
    }?;
    NonNull::new(ptr).ok_or(syscall::ENOMEM)
}

/// Release a mapping obtained from [`map`] or [`remap`].
///
/// # Safety
///
/// `ptr`/`len` must describe exactly one live mapping produced by this
/// module, and nothing may access the range afterwards.
#[cfg(target_os = "linux")]
pub unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> Result<(), i32> {
    // SAFETY: forwarded caller contract.
    unsafe { crate::syscall::sys_munmap(ptr.as_ptr(), len) }
}

/// Resize a mapping from `old_len` to `new_len` bytes.
///
/// On success the returned pointer addresses the resized mapping; with
/// [`RemapMode::InPlace`] it is always equal to `ptr`. On failure the
/// original mapping is untouched and the errno is returned (`ENOMEM` when no
/// contiguous range is free).
///
/// # Safety
///
/// `ptr`/`old_len` must describe a live mapping produced by this module.
/// After a successful moved result, the old range must not be accessed.
#[cfg(target_os = "linux")]
pub unsafe fn remap(
    ptr: NonNull<u8>,
    old_len: usize,
    new_len: usize,
    mode: RemapMode,
) -> Result<NonNull<u8>, i32> {
    use crate::syscall;
    debug_assert!(new_len > 0 && new_len % page_size() == 0);
    let flags = match mode {
        RemapMode::InPlace => 0,
        RemapMode::MayMove => syscall::MREMAP_MAYMOVE,
    };
    // SAFETY: forwarded caller contract; MREMAP_FIXED is never passed.
    let out = unsafe { syscall::sys_mremap(ptr.as_ptr(), old_len, new_len, flags) }?;
    NonNull::new(out).ok_or(syscall::ENOMEM)
}

/// Errno reported by the stubs on targets without the facility.
#[cfg(not(target_os = "linux"))]
const ENOSYS: i32 = 38;

#[cfg(not(target_os = "linux"))]
pub fn map(_len: usize) -> Result<NonNull<u8>, i32> {
    Err(ENOSYS)
}

/// # Safety
///
/// Never reachable: no mapping can exist on this target.
#[cfg(not(target_os = "linux"))]
pub unsafe fn unmap(_ptr: NonNull<u8>, _len: usize) -> Result<(), i32> {
    Err(ENOSYS)
}

/// # Safety
///
/// Never reachable: no mapping can exist on this target.
#[cfg(not(target_os = "linux"))]
pub unsafe fn remap(
    _ptr: NonNull<u8>,
    _old_len: usize,
    _new_len: usize,
    _mode: RemapMode,
) -> Result<NonNull<u8>, i32> {
    Err(ENOSYS)
}
