//! Linux memory-mapping syscalls.
//!
//! Typed wrappers over `libc` for the three calls the big-region backend
//! needs: `mmap`, `munmap` and `mremap`. Failures come back as the errno
//! instead of a sentinel pointer.
//!
//! # Safety
//!
//! The wrappers encode argument types but cannot verify pointer validity.
//! That remains the caller's responsibility (in practice, [`crate::vm`]'s).

/// Pages can be read.
pub const PROT_READ: i32 = libc::PROT_READ;
/// Pages can be written.
pub const PROT_WRITE: i32 = libc::PROT_WRITE;
/// Create a private copy-on-write mapping.
pub const MAP_PRIVATE: i32 = libc::MAP_PRIVATE;
/// Not backed by any file; contents start zeroed.
pub const MAP_ANONYMOUS: i32 = libc::MAP_ANONYMOUS;
/// Let the kernel move the mapping if it cannot be resized in place.
pub const MREMAP_MAYMOVE: i32 = libc::MREMAP_MAYMOVE;

/// No contiguous range available: the expected `mremap` failure.
pub const ENOMEM: i32 = libc::ENOMEM;

/// Errno of the call that just failed, `ENOMEM` if the OS reported none.
fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(ENOMEM)
}

fn map_result(ret: *mut libc::c_void) -> Result<*mut u8, i32> {
    if ret == libc::MAP_FAILED {
        Err(last_errno())
    } else {
        Ok(ret.cast())
    }
}

/// `mmap(addr, length, prot, flags, fd, offset)`.
///
/// # Safety
///
/// The mapping parameters must be valid and the resulting range must be
/// used according to the requested protection.
#[inline]
pub unsafe fn sys_mmap(
    addr: *mut u8,
    length: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> Result<*mut u8, i32> {
    // SAFETY: caller is responsible for mapping validity.
    let ret = unsafe { libc::mmap(addr.cast(), length, prot, flags, fd, offset as libc::off_t) };
    map_result(ret)
}

/// `munmap(addr, length)`.
///
/// # Safety
///
/// `addr` must be page-aligned and `[addr, addr + length)` must not be
/// accessed afterwards.
#[inline]
pub unsafe fn sys_munmap(addr: *mut u8, length: usize) -> Result<(), i32> {
    // SAFETY: caller guarantees addr/length validity.
    let rc = unsafe { libc::munmap(addr.cast(), length) };
    if rc == 0 { Ok(()) } else { Err(last_errno()) }
}

/// `mremap(old_addr, old_size, new_size, flags)`.
///
/// Without [`MREMAP_MAYMOVE`] the kernel either resizes the mapping where it
/// is or fails with `ENOMEM`. With it the pages may move to a new address
/// without their contents being copied.
///
/// # Safety
///
/// `old_addr` must be the page-aligned start of a mapping of `old_size`
/// bytes. After a moved result the old range is no longer mapped.
#[inline]
pub unsafe fn sys_mremap(
    old_addr: *mut u8,
    old_size: usize,
    new_size: usize,
    flags: i32,
) -> Result<*mut u8, i32> {
    // SAFETY: caller guarantees the mapping is valid; MREMAP_FIXED is never
    // passed, so no new address argument is read.
    let ret = unsafe { libc::mremap(old_addr.cast(), old_size, new_size, flags) };
    map_result(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> usize {
        crate::vm::page_size()
    }

    fn map_pages(len: usize) -> *mut u8 {
        // SAFETY: anonymous mmap with no fd.
        unsafe {
            sys_mmap(
                core::ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        }
        .expect("mmap should succeed")
    }

    #[test]
    fn mmap_anonymous_roundtrip() {
        let ptr = map_pages(page());
        assert!(!ptr.is_null());

        // SAFETY: freshly mapped RW page, zero-filled.
        unsafe {
            assert_eq!(*ptr, 0);
            *ptr = 42;
            assert_eq!(*ptr, 42);
        }

        // SAFETY: valid mapping.
        assert_eq!(unsafe { sys_munmap(ptr, page()) }, Ok(()));
    }

    #[test]
    fn mmap_without_length_reports_einval() {
        // SAFETY: the kernel rejects a zero-length mapping without side effects.
        let res = unsafe {
            sys_mmap(
                core::ptr::null_mut(),
                0,
                PROT_READ,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_eq!(res, Err(libc::EINVAL));
    }

    #[test]
    fn mremap_maymove_preserves_contents() {
        let page = page();
        let ptr = map_pages(page);
        // SAFETY: fresh RW mapping of one page.
        unsafe { core::ptr::write_bytes(ptr, 0xAB, page) };

        // SAFETY: ptr/page describe the mapping we just created.
        let grown = unsafe { sys_mremap(ptr, page, 16 * page, MREMAP_MAYMOVE) }
            .expect("mremap with MAYMOVE should succeed");

        // SAFETY: the first page carries over, the rest is zero-filled.
        unsafe {
            assert_eq!(*grown, 0xAB);
            assert_eq!(*grown.add(page - 1), 0xAB);
            assert_eq!(*grown.add(page), 0);
        }

        // SAFETY: grown mapping is 16 pages.
        assert!(unsafe { sys_munmap(grown, 16 * page) }.is_ok());
    }

    #[test]
    fn mremap_shrink_in_place_keeps_address() {
        let page = page();
        let ptr = map_pages(4 * page);
        // SAFETY: shrinking a mapping never needs to move it.
        let shrunk = unsafe { sys_mremap(ptr, 4 * page, page, 0) }
            .expect("in-place shrink should succeed");
        assert_eq!(shrunk, ptr);
        // SAFETY: one page remains mapped at ptr.
        assert!(unsafe { sys_munmap(shrunk, page) }.is_ok());
    }

    #[test]
    fn munmap_unaligned_is_einval() {
        let page = page();
        let ptr = map_pages(page);
        // SAFETY: the kernel validates alignment and rejects the call.
        let res = unsafe { sys_munmap(ptr.add(1), page) };
        assert_eq!(res, Err(libc::EINVAL));
        // SAFETY: valid mapping.
        assert!(unsafe { sys_munmap(ptr, page) }.is_ok());
    }
}
