//! Monotonic instants anchored to a process-wide epoch

use super::Duration;
use once_cell::sync::Lazy;
use std::fmt;
use std::ops::{Add, Sub};
use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_MILLI: i64 = 1_000_000;
const MILLIS_PER_SECOND: i64 = 1_000;
const SECONDS_PER_MINUTE: i64 = 60;

/// Zero reference for every [`Instant`] in the process
///
/// Captured once at first use: a monotonic reading paired with the wall
/// clock at that moment. Later instants advance only with the monotonic
/// clock, so wall-clock adjustments never move them.
struct Epoch {
    monotonic: std::time::Instant,
    wall_nanos: i64,
}

static EPOCH: Lazy<Epoch> = Lazy::new(|| {
    let wall_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    Epoch {
        monotonic: std::time::Instant::now(),
        wall_nanos,
    }
});

/// A point in time, in nanoseconds since the Unix epoch
///
/// Instants taken with [`Instant::now`] are monotonic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    nanos: i64,
}

impl Instant {
    /// The current instant
    pub fn now() -> Self {
        let epoch = &*EPOCH;
        let elapsed = i64::try_from(epoch.monotonic.elapsed().as_nanos()).unwrap_or(i64::MAX);
        Self {
            nanos: epoch.wall_nanos.saturating_add(elapsed),
        }
    }

    /// The instant the process clock was first read
    pub fn start() -> Self {
        Self {
            nanos: EPOCH.wall_nanos,
        }
    }

    /// An instant from milliseconds since the Unix epoch
    pub const fn of_epoch_millis(millis: i64) -> Self {
        Self {
            nanos: millis.saturating_mul(NANOS_PER_MILLI),
        }
    }

    /// Time elapsed since the process epoch
    pub fn since_start(self) -> Duration {
        self.since(Self::start())
    }

    /// Whether `self` is strictly earlier than `other`
    pub fn is_before(self, other: Instant) -> bool {
        self.nanos < other.nanos
    }

    /// Whether `self` is strictly later than `other`
    pub fn is_after(self, other: Instant) -> bool {
        self.nanos > other.nanos
    }

    /// `self - earlier`; negative when `earlier` is actually later
    pub fn since(self, earlier: Instant) -> Duration {
        Duration::of_nanos(self.nanos.saturating_sub(earlier.nanos))
    }

    /// `later - self`; negative when `later` is actually earlier
    pub fn until(self, later: Instant) -> Duration {
        self.since(later).negated()
    }

    /// Shift forward by `duration`
    pub fn add(self, duration: Duration) -> Instant {
        Instant {
            nanos: self.nanos.saturating_add(duration.to_nanos()),
        }
    }

    /// Shift backward by `duration`
    pub fn subtract(self, duration: Duration) -> Instant {
        Instant {
            nanos: self.nanos.saturating_sub(duration.to_nanos()),
        }
    }

    /// Nanoseconds since the Unix epoch
    pub const fn to_nanos(self) -> i64 {
        self.nanos
    }

    /// Milliseconds since the Unix epoch
    pub const fn to_epoch_millis(self) -> i64 {
        self.nanos / NANOS_PER_MILLI
    }

    /// Map onto the std monotonic clock, for parking with a deadline
    ///
    /// Instants before the epoch map to the epoch itself (already elapsed).
    /// Returns `None` when the instant is too far out to represent.
    pub(crate) fn to_std(self) -> Option<std::time::Instant> {
        let epoch = &*EPOCH;
        let offset = self.since(Self::start());
        epoch.monotonic.checked_add(offset.to_std())
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::add(self, rhs)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        self.subtract(rhs)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.since(rhs)
    }
}

impl fmt::Display for Instant {
    /// Formats as `minutes:seconds.millis` relative to process start
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.since_start().to_millis();
        let seconds = millis / MILLIS_PER_SECOND;
        let minutes = seconds / SECONDS_PER_MINUTE;
        write!(
            f,
            "{}:{}.{:03}",
            minutes,
            seconds % SECONDS_PER_MINUTE,
            millis % MILLIS_PER_SECOND
        )
    }
}
