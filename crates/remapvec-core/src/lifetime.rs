//! Object-lifetime primitives over raw memory ranges.
//!
//! Functions taking a `*mut T` destination write into *raw* (uninitialized)
//! slots; functions taking `&mut [T]` assign into *live* slots. Each picks a
//! bulk byte operation when the element capabilities allow it and falls
//! back to per-element code otherwise.
//!
//! None of these fail. Preconditions are checked with `debug_assert!` only.
//! Primitives that call user code (`Default`, `Clone`, iterators) keep a
//! drop guard over the prefix they have constructed, so a panic never
//! leaks or double-drops a constructed value.

use core::mem;
use core::ptr;

use crate::capability::{Relocation, Zeroable};

/// Drops `[start, start + done)` unless disarmed.
struct PartialInit<T> {
    start: *mut T,
    done: usize,
}

impl<T> PartialInit<T> {
    #[inline]
    fn new(start: *mut T) -> Self {
        Self { start, done: 0 }
    }

    #[inline]
    fn finish(self) -> usize {
        let done = self.done;
        mem::forget(self);
        done
    }
}

impl<T> Drop for PartialInit<T> {
    fn drop(&mut self) {
        // SAFETY: exactly `done` slots were initialized by the owner.
        unsafe { destroy(self.start, self.done) };
    }
}

#[inline]
fn ranges_disjoint<T>(a: *const T, b: *const T, n: usize) -> bool {
    let bytes = n.saturating_mul(mem::size_of::<T>());
    let (a, b) = (a as usize, b as usize);
    a.saturating_add(bytes) <= b || b.saturating_add(bytes) <= a
}

/// Default-construct `n` elements in raw memory.
///
/// # Safety
///
/// `dest` must be valid for `n` writes of `T`.
pub unsafe fn construct<T: Default>(dest: *mut T, n: usize) {
    debug_assert!(n == 0 || !dest.is_null());
    // SAFETY: forwarded caller contract.
    unsafe { construct_with(dest, n, T::default) };
}

/// Default-construct `n` zeroable elements with a single `memset`.
///
/// # Safety
///
/// `dest` must be valid for `n` writes of `T`.
pub unsafe fn construct_zeroed<T: Zeroable>(dest: *mut T, n: usize) {
    debug_assert!(n == 0 || !dest.is_null());
    // SAFETY: Zeroable guarantees the zero pattern is the default value.
    unsafe { ptr::write_bytes(dest, 0, n) };
}

/// Construct `n` elements from successive calls to `f`.
///
/// # Safety
///
/// `dest` must be valid for `n` writes of `T`.
pub unsafe fn construct_with<T, F: FnMut() -> T>(dest: *mut T, n: usize, mut f: F) {
    let mut guard = PartialInit::new(dest);
    while guard.done < n {
        // SAFETY: slot `done` is inside the caller-provided range.
        unsafe { dest.add(guard.done).write(f()) };
        guard.done += 1;
    }
    guard.finish();
}

/// Copy-construct `n` clones of `value` into raw memory.
///
/// # Safety
///
/// `dest` must be valid for `n` writes of `T` and must not alias `value`.
pub unsafe fn ufill<T: Clone>(dest: *mut T, n: usize, value: &T) {
    debug_assert!(n == 0 || !dest.is_null());
    // SAFETY: forwarded caller contract.
    unsafe { construct_with(dest, n, || value.clone()) };
}

/// Copy-assign `value` into every live slot of `dest`.
pub fn fill<T: Clone>(dest: &mut [T], value: &T) {
    for slot in dest {
        slot.clone_from(value);
    }
}

/// Copy-construct `src` element by element into raw memory.
///
/// # Safety
///
/// `dest` must be valid for `src.len()` writes and must not overlap `src`.
pub unsafe fn ucopy<T: Clone>(dest: *mut T, src: &[T]) {
    debug_assert!(src.is_empty() || !dest.is_null());
    debug_assert!(ranges_disjoint(dest.cast_const(), src.as_ptr(), src.len()));
    let mut guard = PartialInit::new(dest);
    for item in src {
        // SAFETY: slot `done` < src.len() lies inside the caller range.
        unsafe { dest.add(guard.done).write(item.clone()) };
        guard.done += 1;
    }
    guard.finish();
}

/// Copy-construct `src` into raw memory with one `memcpy`.
///
/// # Safety
///
/// `dest` must be valid for `src.len()` writes and must not overlap `src`.
pub unsafe fn ucopy_trivial<T: Copy>(dest: *mut T, src: &[T]) {
    debug_assert!(src.is_empty() || !dest.is_null());
    debug_assert!(ranges_disjoint(dest.cast_const(), src.as_ptr(), src.len()));
    // SAFETY: T: Copy, so a byte copy is a valid copy construction.
    unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dest, src.len()) };
}

/// Copy-assign `src` into the live prefix of `dest`.
///
/// Panics if `dest` is shorter than `src`.
pub fn copy<T: Clone>(dest: &mut [T], src: &[T]) {
    dest[..src.len()].clone_from_slice(src);
}

/// Move up to `n` items from `iter` into raw memory.
///
/// Returns the number of slots written, which is less than `n` only if the
/// iterator ran dry.
///
/// # Safety
///
/// `dest` must be valid for `n` writes of `T`.
pub unsafe fn umove<T, I>(dest: *mut T, iter: I, n: usize) -> usize
where
    I: IntoIterator<Item = T>,
{
    debug_assert!(n == 0 || !dest.is_null());
    let mut guard = PartialInit::new(dest);
    for item in iter.into_iter().take(n) {
        // SAFETY: at most `n` slots are written.
        unsafe { dest.add(guard.done).write(item) };
        guard.done += 1;
    }
    guard.finish()
}

/// Move-assign items from `iter` into the live slots of `dest`.
///
/// Returns the number of slots assigned.
pub fn move_assign<T, I>(dest: &mut [T], iter: I) -> usize
where
    I: IntoIterator<Item = T>,
{
    let mut assigned = 0;
    for (slot, item) in dest.iter_mut().zip(iter) {
        *slot = item;
        assigned += 1;
    }
    assigned
}

/// Destroy `n` live elements, leaving raw memory.
///
/// No-op for types without drop glue.
///
/// # Safety
///
/// `ptr` must address `n` live elements, which are dead afterwards.
#[inline]
pub unsafe fn destroy<T>(ptr: *mut T, n: usize) {
    if mem::needs_drop::<T>() && n > 0 {
        debug_assert!(!ptr.is_null());
        // SAFETY: forwarded caller contract.
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr, n)) };
    }
}

/// Relocate `n` elements from `src` to raw memory at `dst`.
///
/// A single `memcpy` for trivially relocatable strategies. Afterwards the
/// source slots are raw memory.
///
/// # Safety
///
/// `src` must address `n` live elements, `dst` must be valid for `n`
/// writes, and the ranges must not overlap.
#[inline]
pub unsafe fn relocate<T, R: Relocation<T>>(src: *mut T, dst: *mut T, n: usize) {
    if n == 0 {
        return;
    }
    debug_assert!(!src.is_null() && !dst.is_null());
    debug_assert!(ranges_disjoint(src.cast_const(), dst.cast_const(), n));
    if R::TRIVIAL {
        // SAFETY: non-overlapping and trivially relocatable.
        unsafe { ptr::copy_nonoverlapping(src, dst, n) };
    } else {
        for i in 0..n {
            // SAFETY: element i is live at src and raw at dst.
            unsafe { R::relocate_one(src.add(i), dst.add(i)) };
        }
    }
}

/// Shift the run `[begin, begin + len)` right by `dist` slots.
///
/// Afterwards the run occupies `[begin + dist, begin + dist + len)` and the
/// vacated slots `[begin, begin + min(dist, len))` are raw.
///
/// # Safety
///
/// The run must be live, and `[begin + len, begin + dist + len)` must be
/// valid raw memory of the same allocation.
pub unsafe fn shiftr<T, R: Relocation<T>>(begin: *mut T, len: usize, dist: usize) {
    if dist == 0 || len == 0 {
        return;
    }
    debug_assert!(!begin.is_null());
    if R::TRIVIAL {
        // SAFETY: memmove within one allocation, caller-checked bounds.
        unsafe { ptr::copy(begin, begin.add(dist), len) };
    } else {
        // Back to front, so every destination slot is already vacated.
        for i in (0..len).rev() {
            // SAFETY: slot i is live, slot i + dist is raw by this point.
            unsafe { R::relocate_one(begin.add(i), begin.add(i + dist)) };
        }
    }
}

/// Shift the run `[begin, begin + len)` left by `dist` slots.
///
/// Afterwards the run occupies `[begin - dist, begin - dist + len)`.
///
/// # Safety
///
/// The run must be live, and `[begin - dist, begin)` must be raw memory of
/// the same allocation (destroy erased elements first).
pub unsafe fn shiftl<T, R: Relocation<T>>(begin: *mut T, len: usize, dist: usize) {
    if dist == 0 || len == 0 {
        return;
    }
    debug_assert!(!begin.is_null());
    // SAFETY: caller guarantees `dist` raw slots precede `begin`.
    let dest = unsafe { begin.sub(dist) };
    if R::TRIVIAL {
        // SAFETY: memmove within one allocation.
        unsafe { ptr::copy(begin, dest, len) };
    } else {
        for i in 0..len {
            // SAFETY: front to back, the destination slot is vacated.
            unsafe { R::relocate_one(begin.add(i), dest.add(i)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Bitwise, ElementWise, Relocate};
    use core::mem::MaybeUninit;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct Tally {
        drops: Rc<Cell<usize>>,
        value: u32,
    }

    impl Drop for Tally {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[derive(Debug, PartialEq)]
    struct Hooked {
        value: u32,
        moves: u32,
    }

    // SAFETY: writes dst fully, src is abandoned.
    unsafe impl Relocate for Hooked {
        unsafe fn relocate(src: *mut Self, dst: *mut Self) {
            // SAFETY: caller contract.
            unsafe {
                let v = src.read();
                dst.write(Hooked {
                    value: v.value,
                    moves: v.moves + 1,
                });
            }
        }
    }

    fn buffer<T, const N: usize>() -> [MaybeUninit<T>; N] {
        [const { MaybeUninit::uninit() }; N]
    }

    #[test]
    fn construct_and_zeroed_agree() {
        let mut a = buffer::<u32, 8>();
        let mut b = buffer::<u32, 8>();
        // SAFETY: both buffers hold 8 raw u32 slots.
        unsafe {
            construct(a.as_mut_ptr().cast::<u32>(), 8);
            construct_zeroed(b.as_mut_ptr().cast::<u32>(), 8);
            let a: [u32; 8] = mem::transmute(a);
            let b: [u32; 8] = mem::transmute(b);
            assert_eq!(a, b);
            assert_eq!(a, [0; 8]);
        }
    }

    #[test]
    fn ufill_then_destroy_balances_drops() {
        let drops = Rc::new(Cell::new(0));
        let proto = Tally {
            drops: Rc::clone(&drops),
            value: 5,
        };
        let mut buf = buffer::<Tally, 4>();
        let p = buf.as_mut_ptr().cast::<Tally>();
        // SAFETY: 4 raw slots, filled then destroyed.
        unsafe {
            ufill(p, 4, &proto);
            assert_eq!((*p.add(3)).value, 5);
            destroy(p, 4);
        }
        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn panicking_clone_drops_partial_prefix() {
        struct Bomb {
            armed_after: Rc<Cell<usize>>,
            drops: Rc<Cell<usize>>,
        }
        impl Clone for Bomb {
            fn clone(&self) -> Self {
                let left = self.armed_after.get();
                assert!(left > 0, "boom");
                self.armed_after.set(left - 1);
                Bomb {
                    armed_after: Rc::clone(&self.armed_after),
                    drops: Rc::clone(&self.drops),
                }
            }
        }
        impl Drop for Bomb {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let proto = Bomb {
            armed_after: Rc::new(Cell::new(2)),
            drops: Rc::clone(&drops),
        };
        let mut buf = buffer::<Bomb, 5>();
        let p = buf.as_mut_ptr().cast::<Bomb>();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // SAFETY: 5 raw slots.
            unsafe { ufill(p, 5, &proto) };
        }));
        assert!(res.is_err());
        assert_eq!(drops.get(), 2, "the two constructed clones are dropped");
    }

    #[test]
    fn ucopy_variants_match() {
        let src = [1u64, 2, 3, 4, 5];
        let mut a = buffer::<u64, 5>();
        let mut b = buffer::<u64, 5>();
        // SAFETY: 5 raw slots each, disjoint from src.
        unsafe {
            ucopy(a.as_mut_ptr().cast::<u64>(), &src);
            ucopy_trivial(b.as_mut_ptr().cast::<u64>(), &src);
            assert_eq!(mem::transmute::<_, [u64; 5]>(a), src);
            assert_eq!(mem::transmute::<_, [u64; 5]>(b), src);
        }
    }

    #[test]
    fn copy_and_fill_assign_live_slots() {
        let mut dest = vec![String::from("x"); 4];
        copy(&mut dest, &[String::from("a"), String::from("b")]);
        assert_eq!(dest, ["a", "b", "x", "x"]);
        fill(&mut dest[2..], &String::from("z"));
        assert_eq!(dest, ["a", "b", "z", "z"]);
    }

    #[test]
    fn umove_stops_at_n_or_exhaustion() {
        let mut buf = buffer::<String, 4>();
        let p = buf.as_mut_ptr().cast::<String>();
        let items = vec![String::from("a"), String::from("b")];
        // SAFETY: 4 raw slots, 2 written then destroyed.
        unsafe {
            assert_eq!(umove(p, items, 4), 2);
            assert_eq!(&*p.add(1), "b");
            destroy(p, 2);
        }
        let mut live = [0u8; 3];
        assert_eq!(move_assign(&mut live, [7u8, 8, 9, 10]), 3);
        assert_eq!(live, [7, 8, 9]);
    }

    #[test]
    fn relocate_bitwise_and_element_wise() {
        let mut src = buffer::<Hooked, 3>();
        let mut dst = buffer::<Hooked, 3>();
        let s = src.as_mut_ptr().cast::<Hooked>();
        let d = dst.as_mut_ptr().cast::<Hooked>();
        // SAFETY: 3 slots each, disjoint stack buffers.
        unsafe {
            for i in 0..3 {
                s.add(i).write(Hooked { value: i as u32, moves: 0 });
            }
            relocate::<Hooked, ElementWise>(s, d, 3);
            assert_eq!(*d.add(2), Hooked { value: 2, moves: 1 });
            relocate::<Hooked, Bitwise>(d, s, 3);
            assert_eq!(*s.add(2), Hooked { value: 2, moves: 1 });
        }
    }

    #[test]
    fn shiftr_then_shiftl_restores_order() {
        let mut buf = buffer::<Hooked, 8>();
        let p = buf.as_mut_ptr().cast::<Hooked>();
        // SAFETY: 5 live elements in 8 slots; shifts stay in bounds.
        unsafe {
            for i in 0..5 {
                p.add(i).write(Hooked { value: i as u32, moves: 0 });
            }
            // open a gap of 3 at index 1
            shiftr::<Hooked, ElementWise>(p.add(1), 4, 3);
            for i in 0..4 {
                assert_eq!((*p.add(4 + i)).value, i as u32 + 1);
                assert_eq!((*p.add(4 + i)).moves, 1);
            }
            shiftl::<Hooked, ElementWise>(p.add(4), 4, 3);
            let values: Vec<u32> = (0..5).map(|i| (*p.add(i)).value).collect();
            assert_eq!(values, [0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn shift_trivial_overlapping_runs() {
        let mut data = [1u16, 2, 3, 4, 5, 0, 0];
        let p = data.as_mut_ptr();
        // SAFETY: the array has room for the shifted run.
        unsafe { shiftr::<u16, Bitwise>(p, 5, 2) };
        assert_eq!(&data[2..], &[1, 2, 3, 4, 5]);
        // SAFETY: shifting back into the (now stale) prefix.
        unsafe { shiftl::<u16, Bitwise>(data.as_mut_ptr().add(2), 5, 2) };
        assert_eq!(&data[..5], &[1, 2, 3, 4, 5]);
    }
}
