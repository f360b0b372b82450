//! Capacity fitting and small/big region classification.
//!
//! Small regions come from the heap and hold at least
//! `min_small_bytes` worth of elements, unless that many would already be a
//! big region, in which case small requests are not rounded. Big regions come from anonymous
//! mappings and are rounded up to whole pages. The boundary is the page size
//! for trivially relocatable strategies and the policy's
//! `nontrivial_big_threshold` otherwise.

use core::marker::PhantomData;
use core::mem;

use crate::capability::{Bitwise, Relocation};
use crate::error::{AllocError, Result};
use crate::policy::{Backend, GrowthPolicy};
use crate::vm;

/// Size-class arithmetic for `T` stored with strategy `R`.
pub struct SizePolicy<T, R = Bitwise> {
    policy: GrowthPolicy,
    _marker: PhantomData<fn() -> (T, R)>,
}

impl<T, R> Clone for SizePolicy<T, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, R> Copy for SizePolicy<T, R> {}

impl<T, R> core::fmt::Debug for SizePolicy<T, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SizePolicy")
            .field("elem_size", &mem::size_of::<T>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T, R: Relocation<T>> SizePolicy<T, R> {
    const ELEM: usize = mem::size_of::<T>();

    #[must_use]
    pub const fn new(policy: GrowthPolicy) -> Self {
        Self {
            policy,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &GrowthPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn is_zst() -> bool {
        Self::ELEM == 0
    }

    /// Largest element count whose region fits in `isize::MAX` bytes.
    #[must_use]
    pub const fn max_capacity() -> usize {
        if Self::is_zst() {
            usize::MAX
        } else {
            isize::MAX as usize / Self::ELEM
        }
    }

    /// Whether this element type may use the virtual-memory backend at all.
    #[must_use]
    pub fn vm_eligible(&self) -> bool {
        vm::AVAILABLE
            && !Self::is_zst()
            && self.policy.backend == Backend::Auto
            && mem::align_of::<T>() <= vm::page_size()
    }

    /// Byte size at which a region becomes big.
    #[must_use]
    pub fn big_threshold_bytes(&self) -> usize {
        if R::TRIVIAL {
            vm::page_size()
        } else {
            self.policy.effective_nontrivial_threshold()
        }
    }

    /// Whether a region of `n` elements is served by the big backend.
    #[must_use]
    pub fn is_big(&self, n: usize) -> bool {
        self.vm_eligible() && n.saturating_mul(Self::ELEM) >= self.big_threshold_bytes()
    }

    /// Bytes occupied by `n` elements.
    pub fn region_bytes(&self, n: usize) -> Result<usize> {
        n.checked_mul(Self::ELEM)
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or(AllocError::CapacityOverflow)
    }

    /// Length of the mapping backing a big region of `n` elements.
    pub fn map_len(&self, n: usize) -> Result<usize> {
        vm::page_align(self.region_bytes(n)?)
            .filter(|&len| len <= isize::MAX as usize)
            .ok_or(AllocError::CapacityOverflow)
    }

    /// Element floor for small regions, zero when `min_small_bytes` reaches
    /// the big threshold.
    fn small_floor(&self) -> usize {
        let min_elems = self.policy.min_small_bytes.div_ceil(Self::ELEM);
        if self.is_big(min_elems) { 0 } else { min_elems }
    }

    /// Round a request up to the capacity the backend will actually hand out.
    ///
    /// Idempotent and never below `n`. Zero stays zero; zero-sized types
    /// always report `usize::MAX`.
    pub fn fix_capacity(&self, n: usize) -> Result<usize> {
        if Self::is_zst() {
            return Ok(usize::MAX);
        }
        if n == 0 {
            return Ok(0);
        }
        if self.is_big(n) {
            Ok(self.map_len(n)? / Self::ELEM)
        } else {
            let fitted = n.max(self.small_floor());
            self.region_bytes(fitted)?;
            Ok(fitted)
        }
    }

    /// Capacity to grow to from `capacity` when at least `request` is needed.
    ///
    /// Applies the growth ratio, takes the max with `request`, then fits. If
    /// the scaled value is not representable the plain request is fitted
    /// instead.
    pub fn grow_target(&self, capacity: usize, request: usize) -> Result<usize> {
        let scaled = self
            .policy
            .scale(capacity)
            .unwrap_or(usize::MAX)
            .min(Self::max_capacity());
        let target = scaled.max(request);
        match self.fix_capacity(target) {
            Ok(fitted) => Ok(fitted),
            Err(_) if target > request => self.fix_capacity(request),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ElementWise, Relocate};

    #[allow(dead_code)]
    struct Tracked(u64);

    // SAFETY: plain bitwise copy.
    unsafe impl Relocate for Tracked {
        unsafe fn relocate(src: *mut Self, dst: *mut Self) {
            // SAFETY: caller contract.
            unsafe { core::ptr::copy_nonoverlapping(src, dst, 1) };
        }
    }

    fn ints() -> SizePolicy<u32> {
        SizePolicy::new(GrowthPolicy::default())
    }

    #[test]
    fn small_requests_round_to_sixty_four_bytes() {
        let sp = ints();
        assert_eq!(sp.fix_capacity(0), Ok(0));
        assert_eq!(sp.fix_capacity(1), Ok(16));
        assert_eq!(sp.fix_capacity(16), Ok(16));
        assert_eq!(sp.fix_capacity(17), Ok(17));
    }

    #[test]
    fn no_inline_minimum_keeps_n() {
        let sp: SizePolicy<u32> = SizePolicy::new(GrowthPolicy::default().with_min_small_bytes(0));
        assert_eq!(sp.fix_capacity(3), Ok(3));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn oversized_small_minimum_never_crosses_into_big() {
        let page = vm::page_size();
        let sp: SizePolicy<u32> =
            SizePolicy::new(GrowthPolicy::default().with_min_small_bytes(page + 904));
        assert_eq!(sp.fix_capacity(1), Ok(1));
        assert!(!sp.is_big(1));
        let just_below: SizePolicy<u32> =
            SizePolicy::new(GrowthPolicy::default().with_min_small_bytes(page - 4));
        assert_eq!(just_below.fix_capacity(1), Ok(page / 4 - 1));
        let at_page: SizePolicy<u32> =
            SizePolicy::new(GrowthPolicy::default().with_min_small_bytes(page));
        assert_eq!(at_page.fix_capacity(1), Ok(1));
        for n in [1, 7, page / 4 - 1, page / 4, page / 4 + 1] {
            let once = sp.fix_capacity(n).unwrap();
            assert_eq!(sp.fix_capacity(once), Ok(once), "n={n}");
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn page_threshold_for_trivial_types() {
        let sp = ints();
        let per_page = vm::page_size() / 4;
        assert!(!sp.is_big(per_page - 1));
        assert!(sp.is_big(per_page));
        assert_eq!(sp.fix_capacity(per_page + 1), Ok(2 * per_page));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn element_wise_types_use_the_large_threshold() {
        let sp: SizePolicy<Tracked, ElementWise> = SizePolicy::new(GrowthPolicy::default());
        let per_page = vm::page_size() / 8;
        assert!(!sp.is_big(per_page * 2));
        assert!(sp.is_big((32 << 20) / 8));

        let low: SizePolicy<Tracked, ElementWise> =
            SizePolicy::new(GrowthPolicy::default().with_nontrivial_big_threshold(0));
        assert!(low.is_big(per_page));
    }

    #[test]
    fn heap_only_never_goes_big() {
        let sp: SizePolicy<u8> =
            SizePolicy::new(GrowthPolicy::default().with_backend(Backend::HeapOnly));
        assert!(!sp.is_big(1 << 30));
        assert_eq!(sp.fix_capacity(1 << 20), Ok(1 << 20));
    }

    #[test]
    fn zero_sized_types_have_unbounded_capacity() {
        let sp: SizePolicy<()> = SizePolicy::new(GrowthPolicy::default());
        assert_eq!(sp.fix_capacity(0), Ok(usize::MAX));
        assert_eq!(sp.fix_capacity(12), Ok(usize::MAX));
        assert!(!sp.is_big(usize::MAX));
    }

    #[test]
    fn overflow_is_reported() {
        let sp: SizePolicy<u64> = SizePolicy::new(GrowthPolicy::default());
        assert_eq!(sp.fix_capacity(usize::MAX), Err(AllocError::CapacityOverflow));
        assert_eq!(sp.region_bytes(usize::MAX / 4), Err(AllocError::CapacityOverflow));
    }

    #[test]
    fn grow_target_applies_ratio_then_request() {
        let sp: SizePolicy<u64> =
            SizePolicy::new(GrowthPolicy::default().with_backend(Backend::HeapOnly));
        assert_eq!(sp.grow_target(0, 1), Ok(8));
        assert_eq!(sp.grow_target(10, 11), Ok(20));
        assert_eq!(sp.grow_target(10, 50), Ok(50));
        let max = SizePolicy::<u64>::max_capacity();
        assert_eq!(sp.grow_target(max - 1, max), Ok(max));
    }

    #[test]
    fn fix_capacity_is_idempotent_across_the_boundary() {
        let sp = ints();
        for n in (0..20_000).step_by(7) {
            let once = sp.fix_capacity(n).unwrap();
            assert!(once >= n);
            assert_eq!(sp.fix_capacity(once), Ok(once), "n={n}");
        }
    }
}
