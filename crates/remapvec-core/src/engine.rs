//! The grow/expand/shrink engine.
//!
//! An [`Allocator`] owns one region and the triple `(data, size, capacity)`.
//! Slots `[0, size)` are live, `[size, capacity)` are raw. `data` is null iff
//! `capacity == 0`, except for zero-sized types, which get a dangling pointer
//! and a capacity of `usize::MAX` and never allocate.
//!
//! Every capacity change is a transition labelled by the size classes of the
//! old and new capacities:
//!
//! | old -> new    | strategy                                               |
//! |---------------|--------------------------------------------------------|
//! | small -> small| heap `realloc` if trivially relocatable, else relocate |
//! | small <-> big | fresh region, relocate, release the old one            |
//! | big -> big    | `mremap` (policy order), else relocate                 |
//!
//! Remap failure is never an error: it falls through to relocation. The only
//! errors are arithmetic overflow and backend exhaustion.
//!
//! The engine never destroys elements on drop. Whoever tracks `size` must
//! destroy the live prefix first.

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};
use std::sync::Arc;

use crate::capability::{Bitwise, Capabilities, Relocation};
use crate::capacity::SizePolicy;
use crate::config;
use crate::error::Result;
use crate::lifetime;
use crate::observe::{AllocEvent, AllocObserver, Region, RemapOutcome, Strategy};
use crate::policy::{GrowthPolicy, RemapOrder};
use crate::raw;
use crate::vm::{self, RemapMode};

/// Outcome of [`Allocator::try_expand_or_alloc_raw`].
#[must_use = "a fresh block must be committed or discarded"]
#[derive(Debug, PartialEq, Eq)]
pub enum Expansion<T> {
    /// The current region now has the requested capacity at the same
    /// address; live elements were not touched.
    InPlace,
    /// A separate raw block. The current region is unchanged.
    Fresh { ptr: NonNull<T>, capacity: usize },
}

impl<T> Expansion<T> {
    /// Whether pointers into the old buffer are still valid.
    #[must_use]
    pub const fn in_place(&self) -> bool {
        matches!(self, Self::InPlace)
    }
}

/// Owner of one growable region of `T`.
pub struct Allocator<T, R: Relocation<T> = Bitwise> {
    data: *mut T,
    size: usize,
    capacity: usize,
    sizing: SizePolicy<T, R>,
    observer: Option<Arc<dyn AllocObserver>>,
    _owns: PhantomData<T>,
}

// SAFETY: the allocator exclusively owns its region, like `Vec<T>`. It is not
// internally synchronized; `&Allocator` only exposes reads.
unsafe impl<T: Send, R: Relocation<T>> Send for Allocator<T, R> {}
// SAFETY: see above.
unsafe impl<T: Sync, R: Relocation<T>> Sync for Allocator<T, R> {}

impl<T, R: Relocation<T>> Default for Allocator<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Relocation<T>> fmt::Debug for Allocator<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("data", &self.data)
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("big", &self.is_big_region())
            .field("trivial", &R::TRIVIAL)
            .finish()
    }
}

impl<T, R: Relocation<T>> Allocator<T, R> {
    /// Empty allocator using the process-wide policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(config::global_policy())
    }

    /// Empty allocator; nothing is allocated.
    #[must_use]
    pub const fn with_policy(policy: GrowthPolicy) -> Self {
        let (data, capacity) = if SizePolicy::<T, R>::is_zst() {
            (NonNull::dangling().as_ptr(), usize::MAX)
        } else {
            (ptr::null_mut(), 0)
        };
        Self {
            data,
            size: 0,
            capacity,
            sizing: SizePolicy::new(policy),
            observer: None,
            _owns: PhantomData,
        }
    }

    /// Pre-sized allocator holding `fix_capacity(n)` slots.
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self::with_capacity_and_policy(n, config::global_policy())
    }

    #[must_use]
    pub fn with_capacity_and_policy(n: usize, policy: GrowthPolicy) -> Self {
        Self::try_with_capacity_and_policy(n, policy).unwrap_or_else(|err| err.handle())
    }

    pub fn try_with_capacity_and_policy(n: usize, policy: GrowthPolicy) -> Result<Self> {
        let mut alloc = Self::with_policy(policy);
        alloc.try_expand(n)?;
        Ok(alloc)
    }

    // ---------------------------------------------------------------------
    // State
    // ---------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn data(&self) -> *mut T {
        self.data
    }

    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.data
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw slots past the live prefix.
    #[inline]
    #[must_use]
    pub fn spare(&self) -> usize {
        self.capacity - self.size
    }

    /// Record that `[0, size)` is live.
    ///
    /// # Safety
    ///
    /// `size <= capacity`, and exactly the slots `[0, size)` must hold live
    /// elements afterwards.
    #[inline]
    pub unsafe fn set_size(&mut self, size: usize) {
        debug_assert!(size <= self.capacity, "size {size} > capacity {}", self.capacity);
        self.size = size;
    }

    #[must_use]
    pub fn policy(&self) -> &GrowthPolicy {
        self.sizing.policy()
    }

    #[must_use]
    pub fn sizing(&self) -> &SizePolicy<T, R> {
        &self.sizing
    }

    pub fn fix_capacity(&self, n: usize) -> Result<usize> {
        self.sizing.fix_capacity(n)
    }

    #[must_use]
    pub fn is_big(&self, n: usize) -> bool {
        self.sizing.is_big(n)
    }

    /// Whether the current region is served by the virtual-memory backend.
    #[must_use]
    pub fn is_big_region(&self) -> bool {
        !self.data.is_null() && self.sizing.is_big(self.capacity)
    }

    /// Attach an observer, replacing any previous one.
    pub fn observe(&mut self, observer: Arc<dyn AllocObserver>) {
        observer.record(&AllocEvent::Attach {
            capabilities: self.capabilities(),
        });
        self.observer = Some(observer);
    }

    /// Fast-path table for `T` under `R`.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities::of::<T, R>()
    }

    pub fn take_observer(&mut self) -> Option<Arc<dyn AllocObserver>> {
        self.observer.take()
    }

    #[must_use]
    pub fn observer(&self) -> Option<&Arc<dyn AllocObserver>> {
        self.observer.as_ref()
    }

    #[inline]
    fn emit(&self, event: impl FnOnce() -> AllocEvent) {
        if let Some(observer) = &self.observer {
            observer.record(&event());
        }
    }

    fn footprint(&self, n: usize) -> usize {
        if self.sizing.is_big(n) {
            self.sizing.map_len(n)
        } else {
            self.sizing.region_bytes(n)
        }
        .unwrap_or(0)
    }

    // ---------------------------------------------------------------------
    // Raw primitives
    // ---------------------------------------------------------------------

    /// Raw storage for `n` elements from the backend matching `n`'s class.
    ///
    /// `n` must already be fitted. Zero and zero-sized requests yield a
    /// dangling pointer.
    pub fn alloc(&self, n: usize) -> Result<NonNull<T>> {
        if n == 0 || SizePolicy::<T, R>::is_zst() {
            return Ok(NonNull::dangling());
        }
        let ptr = raw::alloc(&self.sizing, n)?;
        self.emit(|| AllocEvent::Alloc {
            region: Region::from_big(self.sizing.is_big(n)),
            elements: n,
            bytes: self.footprint(n),
        });
        Ok(ptr)
    }

    /// Release storage from [`alloc`](Self::alloc) with the same `n`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `self.alloc(n)` (or be this allocator's region of
    /// capacity `n` that has just been detached) and must not be used again.
    pub unsafe fn dealloc(&self, ptr: NonNull<T>, n: usize) {
        if n == 0 || SizePolicy::<T, R>::is_zst() {
            return;
        }
        self.emit(|| AllocEvent::Dealloc {
            region: Region::from_big(self.sizing.is_big(n)),
            elements: n,
            bytes: self.footprint(n),
        });
        // SAFETY: forwarded caller contract.
        unsafe { raw::dealloc(&self.sizing, ptr, n) };
    }

    /// Relocate `n` elements between two distinct regions, reporting it.
    ///
    /// # Safety
    ///
    /// Same contract as [`lifetime::relocate`].
    pub unsafe fn relocate(&self, src: *mut T, dst: *mut T, n: usize) {
        if n == 0 {
            return;
        }
        // SAFETY: forwarded caller contract.
        unsafe { lifetime::relocate::<T, R>(src, dst, n) };
        self.emit(|| AllocEvent::Relocate {
            elements: n,
            bulk: R::TRIVIAL,
        });
    }

    // ---------------------------------------------------------------------
    // Capacity changes
    // ---------------------------------------------------------------------

    /// Grow to at least `n` slots, fitted but without the growth ratio.
    pub fn try_expand(&mut self, n: usize) -> Result<()> {
        if n <= self.capacity {
            return Ok(());
        }
        let target = self.sizing.fix_capacity(n)?;
        self.resize_to(target, n)
    }

    /// Grow to at least `n` slots, applying the growth ratio first.
    pub fn try_grow(&mut self, n: usize) -> Result<()> {
        if n <= self.capacity {
            return Ok(());
        }
        let target = self.sizing.grow_target(self.capacity, n)?;
        self.resize_to(target, n)
    }

    /// Reduce capacity toward `max(n, size)`.
    ///
    /// Shrinking to zero releases the region.
    pub fn try_shrink(&mut self, n: usize) -> Result<()> {
        if SizePolicy::<T, R>::is_zst() {
            return Ok(());
        }
        let n = n.max(self.size);
        if n >= self.capacity {
            return Ok(());
        }
        if n == 0 {
            self.release();
            return Ok(());
        }
        let target = self.sizing.fix_capacity(n)?;
        if target >= self.capacity {
            return Ok(());
        }
        self.resize_to(target, n)
    }

    pub fn expand(&mut self, n: usize) {
        self.try_expand(n).unwrap_or_else(|err| err.handle());
    }

    pub fn grow(&mut self, n: usize) {
        self.try_grow(n).unwrap_or_else(|err| err.handle());
    }

    pub fn shrink(&mut self, n: usize) {
        self.try_shrink(n).unwrap_or_else(|err| err.handle());
    }

    fn release(&mut self) {
        if let Some(old) = NonNull::new(self.data) {
            let capacity = self.capacity;
            // SAFETY: detaching our own region of `capacity` slots.
            unsafe { self.dealloc(old, capacity) };
        }
        self.data = ptr::null_mut();
        self.capacity = 0;
    }

    fn resize_to(&mut self, new_cap: usize, min_cap: usize) -> Result<()> {
        debug_assert!(new_cap >= self.size && new_cap >= min_cap);
        let Some(old) = NonNull::new(self.data) else {
            let fresh = self.alloc(new_cap)?;
            self.data = fresh.as_ptr();
            self.capacity = new_cap;
            return Ok(());
        };
        let old_big = self.sizing.is_big(self.capacity);
        let new_big = self.sizing.is_big(new_cap);
        match (old_big, new_big) {
            (false, false) if R::TRIVIAL => self.heap_resize(old, new_cap),
            (true, true) => {
                if self.remap_big(old, new_cap, min_cap) {
                    Ok(())
                } else {
                    self.relocate_to(new_cap)
                }
            }
            _ => self.relocate_to(new_cap),
        }
    }

    fn heap_resize(&mut self, old: NonNull<T>, new_cap: usize) -> Result<()> {
        let old_cap = self.capacity;
        // SAFETY: `old` is our live small block of `old_cap` slots.
        let ptr = unsafe { raw::heap_realloc(old, old_cap, new_cap) }?;
        self.emit(|| AllocEvent::HeapRealloc {
            old_elements: old_cap,
            new_elements: new_cap,
            moved: ptr != old,
        });
        self.data = ptr.as_ptr();
        self.capacity = new_cap;
        self.emit(|| AllocEvent::Transition {
            from: Region::Small,
            to: Region::Small,
            old_capacity: old_cap,
            new_capacity: new_cap,
            strategy: Strategy::HeapRealloc,
        });
        Ok(())
    }

    /// Try every remap the policy allows for this element type.
    fn remap_big(&mut self, old: NonNull<T>, new_cap: usize, min_cap: usize) -> bool {
        let growing = new_cap > self.capacity;
        let policy = *self.sizing.policy();
        let may_move_first = R::TRIVIAL && growing && policy.remap_order == RemapOrder::MayMoveFirst;

        if may_move_first && self.remap_once(old, new_cap, RemapMode::MayMove) {
            return true;
        }
        if self.remap_once(old, new_cap, RemapMode::InPlace) {
            return true;
        }
        if growing && policy.remap_search && self.remap_search(min_cap, new_cap) {
            return true;
        }
        // A kernel-side move is a bitwise relocation.
        R::TRIVIAL && !may_move_first && self.remap_once(old, new_cap, RemapMode::MayMove)
    }

    fn remap_once(&mut self, old: NonNull<T>, new_cap: usize, mode: RemapMode) -> bool {
        let old_cap = self.capacity;
        // SAFETY: `old` is our live big region of `old_cap` slots.
        let res = unsafe { raw::remap(&self.sizing, old, old_cap, new_cap, mode) };
        let outcome = match res {
            Ok(ptr) if ptr == old => RemapOutcome::InPlace,
            Ok(_) => RemapOutcome::Moved,
            Err(_) => RemapOutcome::Failed,
        };
        self.emit(|| AllocEvent::Remap {
            mode,
            old_bytes: self.footprint(old_cap),
            new_bytes: self.footprint(new_cap),
            outcome,
        });
        let Ok(ptr) = res else {
            return false;
        };
        self.data = ptr.as_ptr();
        self.capacity = new_cap;
        self.emit(|| AllocEvent::Transition {
            from: Region::Big,
            to: Region::Big,
            old_capacity: old_cap,
            new_capacity: new_cap,
            strategy: if outcome == RemapOutcome::InPlace {
                Strategy::RemapInPlace
            } else {
                Strategy::RemapMoved
            },
        });
        true
    }

    /// Binary-search, in pages, the largest in-place extension that still
    /// holds `min_cap` elements. `full_cap` is known to have failed.
    fn remap_search(&mut self, min_cap: usize, full_cap: usize) -> bool {
        let page = vm::page_size();
        let elem = mem::size_of::<T>();
        let (Ok(min_fit), Ok(full_len)) = (
            self.sizing.fix_capacity(min_cap),
            self.sizing.map_len(full_cap),
        ) else {
            return false;
        };
        let Ok(min_len) = self.sizing.map_len(min_fit) else {
            return false;
        };
        let mut lo = min_len / page;
        let mut hi = (full_len / page).saturating_sub(1);
        let mut found = false;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let cap = mid * page / elem;
            let Some(current) = NonNull::new(self.data) else {
                return found;
            };
            if cap > self.capacity && self.remap_once(current, cap, RemapMode::InPlace) {
                found = true;
                lo = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                hi = mid - 1;
            }
        }
        found && self.capacity >= min_cap
    }

    fn relocate_to(&mut self, new_cap: usize) -> Result<()> {
        let old_cap = self.capacity;
        let old = self.data;
        let fresh = self.alloc(new_cap)?;
        // SAFETY: `size` live elements at `old`; `fresh` is a distinct block
        // of `new_cap >= size` raw slots.
        unsafe { self.relocate(old, fresh.as_ptr(), self.size) };
        if let Some(old) = NonNull::new(old) {
            // SAFETY: the old region is now raw and detached from `self`.
            unsafe { self.dealloc(old, old_cap) };
        }
        self.data = fresh.as_ptr();
        self.capacity = new_cap;
        self.emit(|| AllocEvent::Transition {
            from: Region::from_big(self.sizing.is_big(old_cap)),
            to: Region::from_big(self.sizing.is_big(new_cap)),
            old_capacity: old_cap,
            new_capacity: new_cap,
            strategy: Strategy::Relocate,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Composite operations for containers
    // ---------------------------------------------------------------------

    fn destroy_contents(&mut self) {
        let size = mem::replace(&mut self.size, 0);
        // SAFETY: `[0, size)` was live; size is already zero if a drop panics.
        unsafe { lifetime::destroy(self.data, size) };
    }

    /// Destroy the contents and make room for at least `n` raw slots.
    ///
    /// Returns whether the old data pointer is still valid (the region was
    /// big enough already, or an in-place remap extended it).
    pub fn try_expand_or_dealloc_and_alloc_raw(&mut self, n: usize) -> Result<bool> {
        self.destroy_contents();
        if n <= self.capacity {
            return Ok(true);
        }
        let target = self.sizing.fix_capacity(n)?;
        if let Some(old) = NonNull::new(self.data) {
            if self.sizing.is_big(self.capacity)
                && self.sizing.is_big(target)
                && self.remap_once(old, target, RemapMode::InPlace)
            {
                return Ok(true);
            }
        }
        let old_cap = self.capacity;
        self.release();
        let fresh = self.alloc(target)?;
        self.data = fresh.as_ptr();
        self.capacity = target;
        self.emit(|| AllocEvent::Transition {
            from: Region::from_big(self.sizing.is_big(old_cap)),
            to: Region::from_big(self.sizing.is_big(target)),
            old_capacity: old_cap,
            new_capacity: target,
            strategy: Strategy::Replace,
        });
        Ok(false)
    }

    pub fn expand_or_dealloc_and_alloc_raw(&mut self, n: usize) -> bool {
        self.try_expand_or_dealloc_and_alloc_raw(n)
            .unwrap_or_else(|err| err.handle())
    }

    /// Make room for `n` elements without touching the contents.
    ///
    /// Either the region grows where it stands ([`Expansion::InPlace`]) or a
    /// separate raw block sized by the growth policy is handed back
    /// ([`Expansion::Fresh`]) for the caller to fill; finish with
    /// [`commit_fresh`](Self::commit_fresh) or
    /// [`discard_fresh`](Self::discard_fresh).
    pub fn try_expand_or_alloc_raw(&mut self, n: usize) -> Result<Expansion<T>> {
        if n <= self.capacity {
            return Ok(Expansion::InPlace);
        }
        let target = self.sizing.grow_target(self.capacity, n)?;
        if let Some(old) = NonNull::new(self.data) {
            if self.sizing.is_big(self.capacity) && self.sizing.is_big(target) {
                if self.remap_once(old, target, RemapMode::InPlace) {
                    return Ok(Expansion::InPlace);
                }
                if self.sizing.policy().remap_search && self.remap_search(n, target) {
                    return Ok(Expansion::InPlace);
                }
            }
        }
        let ptr = self.alloc(target)?;
        Ok(Expansion::Fresh {
            ptr,
            capacity: target,
        })
    }

    pub fn expand_or_alloc_raw(&mut self, n: usize) -> Expansion<T> {
        self.try_expand_or_alloc_raw(n)
            .unwrap_or_else(|err| err.handle())
    }

    /// Install a filled fresh block, releasing the old region without
    /// destroying anything in it.
    ///
    /// # Safety
    ///
    /// `ptr`/`capacity` must come from [`Expansion::Fresh`] of this
    /// allocator, `[0, size)` of the block must be live, and every live
    /// element of the old region must have been relocated out of it.
    pub unsafe fn commit_fresh(&mut self, ptr: NonNull<T>, capacity: usize, size: usize) {
        debug_assert!(size <= capacity);
        let old_cap = self.capacity;
        self.release();
        self.data = ptr.as_ptr();
        self.capacity = capacity;
        self.size = size;
        self.emit(|| AllocEvent::Transition {
            from: Region::from_big(self.sizing.is_big(old_cap)),
            to: Region::from_big(self.sizing.is_big(capacity)),
            old_capacity: old_cap,
            new_capacity: capacity,
            strategy: Strategy::Relocate,
        });
    }

    /// Release an unused fresh block.
    ///
    /// # Safety
    ///
    /// `ptr`/`capacity` must come from [`Expansion::Fresh`] of this
    /// allocator and hold no live elements.
    pub unsafe fn discard_fresh(&self, ptr: NonNull<T>, capacity: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.dealloc(ptr, capacity) };
    }

    /// Exchange the full state with `other`, policy and observer included.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }
}

impl<T, R: Relocation<T>> Drop for Allocator<T, R> {
    fn drop(&mut self) {
        // Live elements are the owner's business.
        self.release();
    }
}
