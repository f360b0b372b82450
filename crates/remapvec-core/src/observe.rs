//! Injectable instrumentation for the growth engine.
//!
//! Engines carry an optional [`AllocObserver`]. With none attached no event
//! is even constructed. Two observers ship with the crate: [`AllocStats`]
//! (lock-free counters) and [`LifecycleLog`] (structured records).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::capability::Capabilities;
use crate::vm::RemapMode;

/// Backend a region is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Region {
    Small,
    Big,
}

impl Region {
    #[must_use]
    pub const fn from_big(big: bool) -> Self {
        if big { Self::Big } else { Self::Small }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Big => "big",
        }
    }
}

/// Result of one `mremap` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RemapOutcome {
    /// Resized at the same address.
    InPlace,
    /// Resized by the kernel at a new address.
    Moved,
    /// Refused; the region is untouched.
    Failed,
}

/// How the engine satisfied a capacity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Strategy {
    /// Heap `realloc`.
    HeapRealloc,
    /// `mremap` without moving.
    RemapInPlace,
    /// `mremap` with the kernel moving the pages.
    RemapMoved,
    /// Fresh region, relocate, release the old one.
    Relocate,
    /// Old contents discarded, fresh region.
    Replace,
}

impl Strategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HeapRealloc => "heap_realloc",
            Self::RemapInPlace => "remap_in_place",
            Self::RemapMoved => "remap_moved",
            Self::Relocate => "relocate",
            Self::Replace => "replace",
        }
    }
}

/// One engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocEvent {
    Alloc {
        region: Region,
        elements: usize,
        bytes: usize,
    },
    Dealloc {
        region: Region,
        elements: usize,
        bytes: usize,
    },
    HeapRealloc {
        old_elements: usize,
        new_elements: usize,
        moved: bool,
    },
    Remap {
        mode: RemapMode,
        old_bytes: usize,
        new_bytes: usize,
        outcome: RemapOutcome,
    },
    Relocate {
        elements: usize,
        bulk: bool,
    },
    Transition {
        from: Region,
        to: Region,
        old_capacity: usize,
        new_capacity: usize,
        strategy: Strategy,
    },
    /// The observer was attached to an engine for this element layout.
    Attach { capabilities: Capabilities },
}

/// Receives engine events. Must be cheap; it runs on the growth path.
pub trait AllocObserver: Send + Sync {
    fn record(&self, event: &AllocEvent);
}

/// Lock-free event counters.
#[derive(Debug, Default)]
pub struct AllocStats {
    allocs: AtomicU64,
    deallocs: AtomicU64,
    heap_reallocs: AtomicU64,
    remaps_in_place: AtomicU64,
    remaps_moved: AtomicU64,
    remaps_failed: AtomicU64,
    relocations: AtomicU64,
    elements_relocated: AtomicU64,
    bulk_relocations: AtomicU64,
    transitions: AtomicU64,
    small_to_big: AtomicU64,
    big_to_small: AtomicU64,
}

/// Point-in-time copy of [`AllocStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub allocs: u64,
    pub deallocs: u64,
    pub heap_reallocs: u64,
    pub remaps_in_place: u64,
    pub remaps_moved: u64,
    pub remaps_failed: u64,
    pub relocations: u64,
    pub elements_relocated: u64,
    pub bulk_relocations: u64,
    pub transitions: u64,
    pub small_to_big: u64,
    pub big_to_small: u64,
}

impl AllocStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            allocs: load(&self.allocs),
            deallocs: load(&self.deallocs),
            heap_reallocs: load(&self.heap_reallocs),
            remaps_in_place: load(&self.remaps_in_place),
            remaps_moved: load(&self.remaps_moved),
            remaps_failed: load(&self.remaps_failed),
            relocations: load(&self.relocations),
            elements_relocated: load(&self.elements_relocated),
            bulk_relocations: load(&self.bulk_relocations),
            transitions: load(&self.transitions),
            small_to_big: load(&self.small_to_big),
            big_to_small: load(&self.big_to_small),
        }
    }
}

impl StatsSnapshot {
    /// Successful remaps of either kind.
    #[must_use]
    pub const fn remaps_succeeded(&self) -> u64 {
        self.remaps_in_place + self.remaps_moved
    }
}

impl AllocObserver for AllocStats {
    fn record(&self, event: &AllocEvent) {
        let bump = |c: &AtomicU64, by: u64| {
            c.fetch_add(by, Ordering::Relaxed);
        };
        match *event {
            AllocEvent::Alloc { .. } => bump(&self.allocs, 1),
            AllocEvent::Dealloc { .. } => bump(&self.deallocs, 1),
            AllocEvent::HeapRealloc { .. } => bump(&self.heap_reallocs, 1),
            AllocEvent::Remap { outcome, .. } => match outcome {
                RemapOutcome::InPlace => bump(&self.remaps_in_place, 1),
                RemapOutcome::Moved => bump(&self.remaps_moved, 1),
                RemapOutcome::Failed => bump(&self.remaps_failed, 1),
            },
            AllocEvent::Relocate { elements, bulk } => {
                bump(&self.relocations, 1);
                bump(&self.elements_relocated, elements as u64);
                if bulk {
                    bump(&self.bulk_relocations, 1);
                }
            }
            AllocEvent::Transition { from, to, .. } => {
                bump(&self.transitions, 1);
                match (from, to) {
                    (Region::Small, Region::Big) => bump(&self.small_to_big, 1),
                    (Region::Big, Region::Small) => bump(&self.big_to_small, 1),
                    _ => {}
                }
            }
            AllocEvent::Attach { .. } => {}
        }
    }
}

/// Lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum AllocatorLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured allocator lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AllocatorLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this lifecycle record.
    pub trace_id: String,
    /// Severity level.
    pub level: AllocatorLogLevel,
    /// Backend symbol (`heap`, `mmap`, `munmap`, `mremap`, `realloc`, ...).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `dealloc`, `remap`, `relocate`, `transition`).
    pub event: &'static str,
    /// Element count involved in the event.
    pub elements: Option<usize>,
    /// Byte count involved in the event.
    pub bytes: Option<usize>,
    /// Region class involved in the event.
    pub region: Option<Region>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Snapshot: regions currently held by observed engines.
    pub live_regions: u64,
    /// Snapshot: successful remaps so far.
    pub remap_successes: u64,
    /// Snapshot: failed remaps so far.
    pub remap_failures: u64,
}

#[derive(Debug)]
struct LogState {
    next_decision_id: u64,
    live_regions: u64,
    remap_successes: u64,
    remap_failures: u64,
    records: Vec<AllocatorLogRecord>,
}

/// Buffers every event as an [`AllocatorLogRecord`].
#[derive(Debug)]
pub struct LifecycleLog {
    min_level: AllocatorLogLevel,
    state: Mutex<LogState>,
}

impl Default for LifecycleLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleLog {
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_level(AllocatorLogLevel::Trace)
    }

    /// Drop records below `min_level` (counters still advance).
    #[must_use]
    pub fn with_min_level(min_level: AllocatorLogLevel) -> Self {
        Self {
            min_level,
            state: Mutex::new(LogState {
                next_decision_id: 1,
                live_regions: 0,
                remap_successes: 0,
                remap_failures: 0,
                records: Vec::new(),
            }),
        }
    }

    /// Copy of the buffered records.
    #[must_use]
    pub fn records(&self) -> Vec<AllocatorLogRecord> {
        self.state.lock().records.clone()
    }

    /// Take the buffered records, leaving the buffer empty.
    pub fn drain(&self) -> Vec<AllocatorLogRecord> {
        std::mem::take(&mut self.state.lock().records)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    level: AllocatorLogLevel,
    symbol: &'static str,
    event: &'static str,
    elements: Option<usize>,
    bytes: Option<usize>,
    region: Option<Region>,
    outcome: &'static str,
    details: String,
}

fn describe(event: &AllocEvent) -> Entry {
    match *event {
        AllocEvent::Alloc {
            region,
            elements,
            bytes,
        } => Entry {
            level: AllocatorLogLevel::Trace,
            symbol: if region == Region::Big { "mmap" } else { "heap" },
            event: "alloc",
            elements: Some(elements),
            bytes: Some(bytes),
            region: Some(region),
            outcome: "success",
            details: String::new(),
        },
        AllocEvent::Dealloc {
            region,
            elements,
            bytes,
        } => Entry {
            level: AllocatorLogLevel::Trace,
            symbol: if region == Region::Big { "munmap" } else { "heap" },
            event: "dealloc",
            elements: Some(elements),
            bytes: Some(bytes),
            region: Some(region),
            outcome: "success",
            details: String::new(),
        },
        AllocEvent::HeapRealloc {
            old_elements,
            new_elements,
            moved,
        } => Entry {
            level: AllocatorLogLevel::Trace,
            symbol: "realloc",
            event: "realloc",
            elements: Some(new_elements),
            bytes: None,
            region: Some(Region::Small),
            outcome: if moved { "moved" } else { "in_place" },
            details: format!("old_elements={old_elements}"),
        },
        AllocEvent::Remap {
            mode,
            old_bytes,
            new_bytes,
            outcome,
        } => Entry {
            level: if outcome == RemapOutcome::Failed {
                AllocatorLogLevel::Debug
            } else {
                AllocatorLogLevel::Trace
            },
            symbol: "mremap",
            event: "remap",
            elements: None,
            bytes: Some(new_bytes),
            region: Some(Region::Big),
            outcome: match outcome {
                RemapOutcome::InPlace => "in_place",
                RemapOutcome::Moved => "moved",
                RemapOutcome::Failed => "failed",
            },
            details: format!("mode={mode:?};old_bytes={old_bytes}"),
        },
        AllocEvent::Relocate { elements, bulk } => Entry {
            level: AllocatorLogLevel::Debug,
            symbol: "relocate",
            event: "relocate",
            elements: Some(elements),
            bytes: None,
            region: None,
            outcome: if bulk { "bulk" } else { "element_wise" },
            details: String::new(),
        },
        AllocEvent::Transition {
            from,
            to,
            old_capacity,
            new_capacity,
            strategy,
        } => Entry {
            level: AllocatorLogLevel::Info,
            symbol: "engine",
            event: "transition",
            elements: Some(new_capacity),
            bytes: None,
            region: Some(to),
            outcome: strategy.as_str(),
            details: format!(
                "{}->{};old_capacity={old_capacity}",
                from.as_str(),
                to.as_str()
            ),
        },
        AllocEvent::Attach { capabilities } => Entry {
            level: AllocatorLogLevel::Info,
            symbol: "engine",
            event: "attach",
            elements: None,
            bytes: Some(capabilities.size),
            region: None,
            outcome: "attached",
            details: format!(
                "destroy={};relocate={};shift={};align={}",
                capabilities.destroy, capabilities.relocate, capabilities.shift, capabilities.align
            ),
        },
    }
}

impl AllocObserver for LifecycleLog {
    fn record(&self, event: &AllocEvent) {
        let entry = describe(event);
        let mut state = self.state.lock();
        match *event {
            AllocEvent::Alloc { .. } => state.live_regions += 1,
            AllocEvent::Dealloc { .. } => state.live_regions = state.live_regions.saturating_sub(1),
            AllocEvent::Remap { outcome, .. } => {
                if outcome == RemapOutcome::Failed {
                    state.remap_failures += 1;
                } else {
                    state.remap_successes += 1;
                }
            }
            _ => {}
        }
        let decision_id = state.next_decision_id;
        state.next_decision_id = state.next_decision_id.wrapping_add(1);
        if entry.level < self.min_level {
            return;
        }
        let record = AllocatorLogRecord {
            decision_id,
            trace_id: format!("core::remapvec::{}::{:016x}", entry.symbol, decision_id),
            level: entry.level,
            symbol: entry.symbol,
            event: entry.event,
            elements: entry.elements,
            bytes: entry.bytes,
            region: entry.region,
            outcome: entry.outcome,
            details: entry.details,
            live_regions: state.live_regions,
            remap_successes: state.remap_successes,
            remap_failures: state.remap_failures,
        };
        state.records.push(record);
    }
}

impl fmt::Display for AllocatorLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} {}.{} outcome={}",
            self.level, self.trace_id, self.symbol, self.event, self.outcome
        )?;
        if !self.details.is_empty() {
            write!(f, " {}", self.details)?;
        }
        Ok(())
    }
}
