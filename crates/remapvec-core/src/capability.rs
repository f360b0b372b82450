//! Element capabilities: which lifetime operations may take the bulk path.
//!
//! Rust moves every value by copying its bytes, so by default any `T` is
//! trivially relocatable and is stored with the [`Bitwise`] strategy. A type
//! that has to observe its own address (intrusive back-pointers, address
//! registries, instrumentation) implements [`Relocate`] and is stored with
//! [`ElementWise`]; the engine then relocates it one element at a time and
//! never lets the kernel move its pages behind its back.
//!
//! The strategy is a type parameter, so the trivial/non-trivial choice is
//! made at monomorphization time.

use core::mem;
use core::ptr;
use std::fmt;

/// Per-type relocation strategy.
///
/// # Safety
///
/// When `TRIVIAL` is true, a raw byte copy followed by forgetting the source
/// must be a valid relocation of `T`. `relocate_one` must leave `dst`
/// initialized and `src` logically uninitialized, and must not panic.
pub unsafe trait Relocation<T> {
    /// Bulk byte copies are a valid relocation.
    const TRIVIAL: bool;

    /// Relocate one value from `src` to `dst`.
    ///
    /// # Safety
    ///
    /// `src` must hold a live `T`, `dst` must be valid for writes, and the
    /// two must not overlap.
    unsafe fn relocate_one(src: *mut T, dst: *mut T);
}

/// Relocation by byte copy. Valid for every Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bitwise {}

// SAFETY: every Rust value may be moved by memcpy.
unsafe impl<T> Relocation<T> for Bitwise {
    const TRIVIAL: bool = true;

    #[inline]
    unsafe fn relocate_one(src: *mut T, dst: *mut T) {
        // SAFETY: forwarded caller contract.
        unsafe { ptr::copy_nonoverlapping(src, dst, 1) };
    }
}

/// Relocation through [`Relocate::relocate`], one element at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementWise {}

// SAFETY: TRIVIAL is false, so the engine always goes through the type's
// own relocation hook.
unsafe impl<T: Relocate> Relocation<T> for ElementWise {
    const TRIVIAL: bool = false;

    #[inline]
    unsafe fn relocate_one(src: *mut T, dst: *mut T) {
        // SAFETY: forwarded caller contract.
        unsafe { T::relocate(src, dst) };
    }
}

/// A type that must run code when its address changes.
///
/// # Safety
///
/// `relocate` must fully initialize `*dst` from `*src` and leave `*src`
/// logically moved-from (it will not be dropped). It must not panic.
pub unsafe trait Relocate: Sized {
    /// Move the value at `src` to `dst`.
    ///
    /// # Safety
    ///
    /// `src` holds a live value, `dst` is valid for writes, no overlap.
    unsafe fn relocate(src: *mut Self, dst: *mut Self);
}

/// Types whose default value is the all-zero bit pattern.
///
/// Default construction of these degenerates to a `memset`.
///
/// # Safety
///
/// An all-zero byte pattern must be a valid value of the type, equal to
/// what `Default::default()` produces.
pub unsafe trait Zeroable: Default {}

macro_rules! impl_zeroable {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: zero is a valid value and the default for this type.
            unsafe impl Zeroable for $t {}
        )*
    };
}

impl_zeroable!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char
);

// SAFETY: an all-zero array of zeroable elements is the default array.
unsafe impl<T: Zeroable, const N: usize> Zeroable for [T; N] where [T; N]: Default {}

/// Fast-path selector for one operation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Dispatch {
    /// Bulk byte operation (or no-op for destruction).
    Trivial,
    /// Per-element user code.
    NonTrivial,
}

impl Dispatch {
    #[must_use]
    pub const fn from_trivial(trivial: bool) -> Self {
        if trivial { Self::Trivial } else { Self::NonTrivial }
    }

    #[must_use]
    pub const fn is_trivial(self) -> bool {
        matches!(self, Self::Trivial)
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trivial => "trivial",
            Self::NonTrivial => "non-trivial",
        })
    }
}

/// Capability table for an element type under a relocation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Capabilities {
    /// Destruction is a no-op (`!needs_drop::<T>()`).
    pub destroy: Dispatch,
    /// Relocation may be a bulk byte copy.
    pub relocate: Dispatch,
    /// Shifting within a buffer may be a `memmove`.
    pub shift: Dispatch,
    /// Element size in bytes.
    pub size: usize,
    /// Element alignment in bytes.
    pub align: usize,
}

impl Capabilities {
    /// Compute the table for `T` stored with strategy `R`.
    #[must_use]
    pub const fn of<T, R: Relocation<T>>() -> Self {
        Self {
            destroy: Dispatch::from_trivial(!mem::needs_drop::<T>()),
            relocate: Dispatch::from_trivial(R::TRIVIAL),
            shift: Dispatch::from_trivial(R::TRIVIAL),
            size: mem::size_of::<T>(),
            align: mem::align_of::<T>(),
        }
    }

    #[must_use]
    pub const fn trivially_relocatable(&self) -> bool {
        self.relocate.is_trivial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pinned {
        home: *const Pinned,
    }

    // SAFETY: relocate writes dst fully and fixes the self pointer.
    unsafe impl Relocate for Pinned {
        unsafe fn relocate(src: *mut Self, dst: *mut Self) {
            // SAFETY: caller contract.
            unsafe {
                ptr::copy_nonoverlapping(src, dst, 1);
                (*dst).home = dst;
            }
        }
    }

    #[test]
    fn bitwise_is_trivial_for_any_type() {
        let caps = Capabilities::of::<String, Bitwise>();
        assert_eq!(caps.relocate, Dispatch::Trivial);
        assert_eq!(caps.destroy, Dispatch::NonTrivial);
        assert!(caps.trivially_relocatable());
    }

    #[test]
    fn plain_data_destroys_trivially() {
        let caps = Capabilities::of::<u64, Bitwise>();
        assert_eq!(caps.destroy, Dispatch::Trivial);
        assert_eq!(caps.size, 8);
    }

    #[test]
    fn element_wise_is_non_trivial() {
        let caps = Capabilities::of::<Pinned, ElementWise>();
        assert_eq!(caps.relocate, Dispatch::NonTrivial);
        assert_eq!(caps.shift, Dispatch::NonTrivial);
        assert_eq!(caps.relocate.to_string(), "non-trivial");
    }

    #[test]
    fn element_wise_runs_the_hook() {
        let mut src = core::mem::MaybeUninit::<Pinned>::uninit();
        src.write(Pinned {
            home: core::ptr::null(),
        });
        let mut dst = core::mem::MaybeUninit::<Pinned>::uninit();
        // SAFETY: src is live, dst is writable, distinct locals.
        unsafe {
            <ElementWise as Relocation<Pinned>>::relocate_one(src.as_mut_ptr(), dst.as_mut_ptr());
            assert_eq!(dst.assume_init_ref().home, dst.as_ptr());
        }
    }
}
