//! Growth policy knobs shared by every engine instance.
//!
//! One `GrowthPolicy` value parameterizes the whole family of tunings: the
//! growth ratio, the small-block minimum, the big-region threshold for
//! element-wise types, the order in which remap modes are tried, and whether
//! a failed in-place extension searches for a smaller one.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default growth numerator (`2/1`).
pub const DEFAULT_GROWTH_NUMERATOR: usize = 2;
/// Default growth denominator.
pub const DEFAULT_GROWTH_DENOMINATOR: usize = 1;
/// Minimum bytes worth of elements in a small block.
pub const DEFAULT_MIN_SMALL_BYTES: usize = 64;
/// Big-region threshold for element-wise relocated types.
pub const DEFAULT_NONTRIVIAL_BIG_THRESHOLD: usize = 32 << 20;

/// Order in which `mremap` modes are attempted when a big region grows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RemapOrder {
    /// Try a non-moving remap, then a moving one.
    #[default]
    InPlaceFirst,
    /// Try a moving remap straight away.
    MayMoveFirst,
}

impl RemapOrder {
    /// Parse from string (case-insensitive, `_` and `-` interchangeable).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InPlaceFirst => "in-place-first",
            Self::MayMoveFirst => "may-move-first",
        }
    }
}

impl FromStr for RemapOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "in-place-first" | "in-place" | "inplace" | "default" => Ok(Self::InPlaceFirst),
            "may-move-first" | "may-move" | "maymove" | "move" => Ok(Self::MayMoveFirst),
            _ => Err(ConfigError::BadRemapOrder(s.to_owned())),
        }
    }
}

impl fmt::Display for RemapOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backends the engine may use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Backend {
    /// Heap for small regions, virtual memory for big ones.
    #[default]
    Auto,
    /// Heap for everything.
    HeapOnly,
}

impl Backend {
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::HeapOnly => "heap",
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "default" | "mmap" | "vm" => Ok(Self::Auto),
            "heap" | "heap-only" | "heap_only" | "malloc" => Ok(Self::HeapOnly),
            _ => Err(ConfigError::BadBackend(s.to_owned())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct GrowthPolicy {
    /// Growth ratio numerator. Must exceed `denominator`.
    pub numerator: usize,
    /// Growth ratio denominator. Must be at least 1.
    pub denominator: usize,
    /// Small blocks hold at least this many bytes worth of elements.
    pub min_small_bytes: usize,
    /// Region size at which element-wise types switch to the big backend.
    pub nontrivial_big_threshold: usize,
    pub remap_order: RemapOrder,
    /// Binary-search the largest in-place extension before falling back.
    pub remap_search: bool,
    pub backend: Backend,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl GrowthPolicy {
    pub const DEFAULT: Self = Self {
        numerator: DEFAULT_GROWTH_NUMERATOR,
        denominator: DEFAULT_GROWTH_DENOMINATOR,
        min_small_bytes: DEFAULT_MIN_SMALL_BYTES,
        nontrivial_big_threshold: DEFAULT_NONTRIVIAL_BIG_THRESHOLD,
        remap_order: RemapOrder::InPlaceFirst,
        remap_search: false,
        backend: Backend::Auto,
    };

    /// Set the growth ratio, rejecting ratios that do not grow.
    pub fn with_growth(mut self, numerator: usize, denominator: usize) -> Result<Self, ConfigError> {
        check_ratio(numerator, denominator)?;
        self.numerator = numerator;
        self.denominator = denominator;
        Ok(self)
    }

    #[must_use]
    pub const fn with_min_small_bytes(mut self, bytes: usize) -> Self {
        self.min_small_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_nontrivial_big_threshold(mut self, bytes: usize) -> Self {
        self.nontrivial_big_threshold = bytes;
        self
    }

    #[must_use]
    pub const fn with_remap_order(mut self, order: RemapOrder) -> Self {
        self.remap_order = order;
        self
    }

    #[must_use]
    pub const fn with_remap_search(mut self, search: bool) -> Self {
        self.remap_search = search;
        self
    }

    #[must_use]
    pub const fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Check the growth ratio.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio(self.numerator, self.denominator)
    }

    /// Big-region threshold for element-wise types, never below one page.
    #[must_use]
    pub fn effective_nontrivial_threshold(&self) -> usize {
        self.nontrivial_big_threshold.max(crate::vm::page_size())
    }

    /// `capacity * numerator / denominator`, or `None` on overflow.
    ///
    /// Always strictly greater than `capacity` for a valid ratio, even when
    /// integer division would otherwise round the step away.
    #[must_use]
    pub fn scale(&self, capacity: usize) -> Option<usize> {
        let scaled = capacity.checked_mul(self.numerator)? / self.denominator.max(1);
        Some(scaled.max(capacity.checked_add(1)?))
    }
}

fn check_ratio(numerator: usize, denominator: usize) -> Result<(), ConfigError> {
    if denominator == 0 {
        return Err(ConfigError::ZeroDenominator);
    }
    if numerator <= denominator {
        return Err(ConfigError::RatioNotGrowing {
            numerator,
            denominator,
        });
    }
    Ok(())
}
