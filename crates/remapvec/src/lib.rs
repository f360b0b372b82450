//! Growable vectors whose big buffers extend in place with `mremap`.
//!
//! [`Vector`] stores small contents on the heap and moves to anonymous
//! page mappings once they outgrow a page (or the configured threshold for
//! types that relocate element-wise); growth then remaps pages instead of
//! copying. [`InlineVec`] is the fixed-capacity, allocation-free companion.
//!
//! The engine underneath is re-exported as [`core`](crate::core) for callers
//! that manage raw buffers themselves.

pub mod error;
pub mod inline_vec;
pub mod vector;

pub use remapvec_core as core;

pub use error::{CapacityError, VecError};
pub use inline_vec::InlineVec;
pub use remapvec_core::{
    AllocError, AllocObserver, AllocStats, Backend, Bitwise, ConfigError, ElementWise,
    GrowthPolicy, LifecycleLog, Relocate, Relocation, RemapOrder, Zeroable, global_policy,
};
pub use vector::{IntoIter, Vector};
