//! Error types for the growth engine and its configuration.

use std::alloc::Layout;

use thiserror::Error;

/// Failure to obtain backing memory.
///
/// Remap failures never appear here: they are retried internally through
/// allocate-and-relocate. Only arithmetic overflow and backend exhaustion
/// reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The requested element count does not fit in `isize::MAX` bytes.
    #[error("capacity overflow")]
    CapacityOverflow,
    /// The heap or the virtual-memory backend refused the request.
    #[error("memory allocation of {bytes} bytes (align {align}) failed")]
    Exhausted { bytes: usize, align: usize },
}

impl AllocError {
    pub(crate) fn exhausted(layout: Layout) -> Self {
        Self::Exhausted {
            bytes: layout.size(),
            align: layout.align(),
        }
    }

    /// Terminate the way the standard collections do.
    ///
    /// Overflow panics with `"capacity overflow"`; exhaustion goes to
    /// [`std::alloc::handle_alloc_error`], which aborts by default.
    #[cold]
    #[track_caller]
    pub fn handle(self) -> ! {
        match self {
            Self::CapacityOverflow => panic!("capacity overflow"),
            Self::Exhausted { bytes, align } => match Layout::from_size_align(bytes, align) {
                Ok(layout) => std::alloc::handle_alloc_error(layout),
                Err(_) => panic!("capacity overflow"),
            },
        }
    }
}

/// Invalid growth-policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("growth ratio {numerator}/{denominator} must be greater than 1")]
    RatioNotGrowing { numerator: usize, denominator: usize },
    #[error("growth denominator must be non-zero")]
    ZeroDenominator,
    #[error("cannot parse growth factor {0:?}")]
    BadGrowth(String),
    #[error("cannot parse byte size {0:?}")]
    BadBytes(String),
    #[error("unknown remap strategy {0:?}")]
    BadRemapOrder(String),
    #[error("unknown backend {0:?}")]
    BadBackend(String),
}

/// Shorthand used throughout the engine.
pub type Result<T, E = AllocError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_carries_layout() {
        let layout = Layout::from_size_align(4096, 8).unwrap();
        assert_eq!(
            AllocError::exhausted(layout),
            AllocError::Exhausted {
                bytes: 4096,
                align: 8
            }
        );
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(AllocError::CapacityOverflow.to_string(), "capacity overflow");
        let err = ConfigError::RatioNotGrowing {
            numerator: 1,
            denominator: 1,
        };
        assert_eq!(err.to_string(), "growth ratio 1/1 must be greater than 1");
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn handle_overflow_panics() {
        AllocError::CapacityOverflow.handle();
    }
}
