//! Growth engine for remapvec.
//!
//! Layered leaf-first:
//! - [`capability`]: relocation strategies and trivial-operation dispatch.
//! - [`lifetime`]: construct/copy/move/destroy/relocate/shift over raw ranges.
//! - [`policy`] and [`config`]: growth ratio, size-class knobs, environment.
//! - [`capacity`]: capacity fitting and small/big classification.
//! - [`syscall`] and [`vm`]: anonymous mappings and `mremap` (Linux).
//! - [`raw`]: allocate/deallocate routed to the heap or to a mapping.
//! - [`engine`]: the grow/expand/shrink state machine.
//! - [`observe`]: optional instrumentation hooks.
//!
//! None of these types are internally synchronized.

pub mod capability;
pub mod capacity;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifetime;
pub mod observe;
pub mod policy;
pub mod raw;
#[cfg(target_os = "linux")]
pub mod syscall;
pub mod vm;

pub use capability::{Bitwise, Capabilities, Dispatch, ElementWise, Relocate, Relocation, Zeroable};
pub use capacity::SizePolicy;
pub use config::global_policy;
pub use engine::{Allocator, Expansion};
pub use error::{AllocError, ConfigError};
pub use observe::{
    AllocEvent, AllocObserver, AllocStats, AllocatorLogLevel, AllocatorLogRecord, LifecycleLog,
    Region, RemapOutcome, StatsSnapshot, Strategy,
};
pub use policy::{Backend, GrowthPolicy, RemapOrder};
