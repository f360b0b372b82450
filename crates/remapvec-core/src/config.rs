//! Environment-driven policy configuration.
//!
//! The process-wide default policy is read from the environment once:
//! - `REMAPVEC_GROWTH`: growth ratio, `"3/2"` or `"1.5"` (default `2/1`).
//! - `REMAPVEC_BIG_THRESHOLD`: big-region threshold for element-wise types,
//!   bytes with an optional `K`/`M`/`G` suffix (default `32M`).
//! - `REMAPVEC_REMAP`: `in-place-first` (default), `may-move-first`, or
//!   `search` (in-place first, with a binary search for the largest in-place
//!   extension).
//! - `REMAPVEC_BACKEND`: `auto` (default) or `heap`.
//!
//! Malformed values fall back to the defaults; the strict parsers here are
//! available for callers that want to surface the error.

use std::sync::OnceLock;

use crate::error::ConfigError;
use crate::policy::{Backend, GrowthPolicy, RemapOrder};

pub const ENV_GROWTH: &str = "REMAPVEC_GROWTH";
pub const ENV_BIG_THRESHOLD: &str = "REMAPVEC_BIG_THRESHOLD";
pub const ENV_REMAP: &str = "REMAPVEC_REMAP";
pub const ENV_BACKEND: &str = "REMAPVEC_BACKEND";

/// Most fractional digits accepted in a decimal growth factor.
const MAX_FRACTION_DIGITS: u32 = 6;

static GLOBAL_POLICY: OnceLock<GrowthPolicy> = OnceLock::new();

/// Policy resolved from the environment on first call, cached thereafter.
#[must_use]
pub fn global_policy() -> GrowthPolicy {
    *GLOBAL_POLICY.get_or_init(GrowthPolicy::from_env)
}

impl GrowthPolicy {
    /// Resolve a policy from the `REMAPVEC_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve a policy from an arbitrary key lookup (loose parsing).
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = Self::DEFAULT;
        if let Some((numerator, denominator)) =
            lookup(ENV_GROWTH).and_then(|raw| parse_growth(&raw).ok())
        {
            policy.numerator = numerator;
            policy.denominator = denominator;
        }
        if let Some(bytes) = lookup(ENV_BIG_THRESHOLD).and_then(|raw| parse_bytes(&raw).ok()) {
            policy.nontrivial_big_threshold = bytes;
        }
        if let Some(raw) = lookup(ENV_REMAP) {
            let raw = raw.trim().to_ascii_lowercase();
            if raw == "search" || raw == "in-place-search" {
                policy.remap_order = RemapOrder::InPlaceFirst;
                policy.remap_search = true;
            } else {
                policy.remap_order = RemapOrder::from_str_loose(&raw);
            }
        }
        if let Some(raw) = lookup(ENV_BACKEND) {
            policy.backend = Backend::from_str_loose(&raw);
        }
        policy
    }
}

/// Parse a growth ratio: `"n/d"` or a decimal such as `"1.5"`.
///
/// The result is reduced and validated to be strictly greater than one.
pub fn parse_growth(raw: &str) -> Result<(usize, usize), ConfigError> {
    let s = raw.trim();
    let bad = || ConfigError::BadGrowth(raw.to_owned());
    let (numerator, denominator) = if let Some((n, d)) = s.split_once('/') {
        let n: usize = n.trim().parse().map_err(|_| bad())?;
        let d: usize = d.trim().parse().map_err(|_| bad())?;
        (n, d)
    } else if let Some((int, frac)) = s.split_once('.') {
        let digits = frac.len() as u32;
        if digits == 0 || digits > MAX_FRACTION_DIGITS || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let int: usize = int.parse().map_err(|_| bad())?;
        let frac: usize = frac.parse().map_err(|_| bad())?;
        let scale = 10usize.pow(digits);
        let n = int
            .checked_mul(scale)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(bad)?;
        (n, scale)
    } else {
        (s.parse().map_err(|_| bad())?, 1)
    };
    if denominator == 0 {
        return Err(ConfigError::ZeroDenominator);
    }
    let g = gcd(numerator, denominator);
    let (numerator, denominator) = (numerator / g.max(1), denominator / g.max(1));
    GrowthPolicy::DEFAULT.with_growth(numerator, denominator)?;
    Ok((numerator, denominator))
}

/// Parse a byte count with an optional binary suffix (`K`, `M`, `G`,
/// optionally followed by `B` or `iB`).
pub fn parse_bytes(raw: &str) -> Result<usize, ConfigError> {
    let s = raw.trim().to_ascii_uppercase();
    let bad = || ConfigError::BadBytes(raw.to_owned());
    let s = s
        .strip_suffix("IB")
        .or_else(|| s.strip_suffix('B'))
        .unwrap_or(s.as_str());
    let (digits, shift) = match s.as_bytes().last() {
        Some(b'K') => (&s[..s.len() - 1], 10),
        Some(b'M') => (&s[..s.len() - 1], 20),
        Some(b'G') => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let value: usize = digits.trim().parse().map_err(|_| bad())?;
    value.checked_mul(1usize << shift).ok_or_else(bad)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
