//! Monotonic clock
//!
//! [`Instant`] and [`Duration`] are signed nanosecond values measured against
//! a process-wide epoch that is fixed the first time the clock is read.

mod duration;
mod instant;

pub use duration::Duration;
pub use instant::Instant;

/// A deadline-bound operation ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {waited}")]
pub struct Timeout {
    /// How long the caller actually waited
    pub waited: Duration,
}

impl Timeout {
    /// Timeout measured from `start` to now
    pub fn since(start: Instant) -> Self {
        Self {
            waited: Instant::now().since(start),
        }
    }
}
