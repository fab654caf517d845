//! Signed nanosecond durations

use super::Instant;
use std::fmt;
use std::ops::{Add, Neg, Sub};

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A signed span of time with nanosecond resolution
///
/// Unlike [`std::time::Duration`] this may be negative, so the difference of
/// two [`Instant`]s is always representable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    nanos: i64,
}

impl Duration {
    /// The empty duration
    pub const ZERO: Duration = Duration { nanos: 0 };

    /// The largest representable duration
    pub const MAX: Duration = Duration { nanos: i64::MAX };

    /// Create a duration from nanoseconds
    pub const fn of_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    /// Create a duration from milliseconds
    pub const fn of_millis(millis: i64) -> Self {
        Self {
            nanos: millis.saturating_mul(NANOS_PER_MILLI),
        }
    }

    /// Create a duration from (fractional) seconds, truncating toward zero
    pub fn of_seconds(seconds: f64) -> Self {
        // `as` saturates for out-of-range floats and maps NaN to zero
        Self {
            nanos: (seconds * NANOS_PER_SECOND as f64) as i64,
        }
    }

    /// Elapsed time from `start` to `end` (negative if `end` is earlier)
    pub fn between(start: Instant, end: Instant) -> Self {
        Self {
            nanos: end.to_nanos().saturating_sub(start.to_nanos()),
        }
    }

    /// The same span in the opposite direction
    pub const fn negated(self) -> Self {
        Self {
            nanos: self.nanos.saturating_neg(),
        }
    }

    /// Whole nanoseconds
    pub const fn to_nanos(self) -> i64 {
        self.nanos
    }

    /// Whole milliseconds, truncated toward zero
    pub const fn to_millis(self) -> i64 {
        self.nanos / NANOS_PER_MILLI
    }

    /// Fractional seconds
    pub fn to_seconds(self) -> f64 {
        self.nanos as f64 / NANOS_PER_SECOND as f64
    }

    /// Whether this span is strictly longer than `other`
    pub fn is_greater_than(self, other: Duration) -> bool {
        self.nanos > other.nanos
    }

    /// Whether this span is strictly shorter than `other`
    pub fn is_less_than(self, other: Duration) -> bool {
        self.nanos < other.nanos
    }

    /// Whether this span is below zero
    pub const fn is_negative(self) -> bool {
        self.nanos < 0
    }

    /// Convert to a std duration, clamping negative spans to zero
    pub fn to_std(self) -> std::time::Duration {
        if self.nanos <= 0 {
            std::time::Duration::ZERO
        } else {
            std::time::Duration::from_nanos(self.nanos as u64)
        }
    }
}

impl From<std::time::Duration> for Duration {
    fn from(duration: std::time::Duration) -> Self {
        Self {
            nanos: i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX),
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::of_nanos(self.nanos.saturating_add(rhs.nanos))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration::of_nanos(self.nanos.saturating_sub(rhs.nanos))
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        self.negated()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.to_seconds())
    }
}
