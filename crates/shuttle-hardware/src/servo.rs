//! Blocking drive-to-angle for positional servos
//!
//! Hobby servos give no position feedback. [`ServoControl`] therefore
//! estimates where the servo is from the last command and a constant angular
//! speed, and sleeps for the estimated travel time after each command.

use crate::config::ServoConfig;
use crate::defaults::{SERVO_ASSUMED_SPAN_RAD, SERVO_RAW_TOLERANCE};
use crate::error::{ConfigError, ControlError};
use parking_lot::Mutex as ParkingLotMutex;
use shuttle_core::context;
use shuttle_core::time::{Duration, Instant};
use shuttle_core::PreemptibleLock;

/// A positional servo driven by a raw setpoint in `[0, 1]`
pub trait Servo: Send + Sync {
    /// Command a raw position
    fn set_position(&self, raw: f64);
}

/// What is known about the servo's motion
#[derive(Debug, Default)]
struct Estimate {
    /// Where the current movement started from
    previous: Option<f64>,
    /// Where the servo was last told to go
    target: Option<f64>,
    /// When that command was issued
    movement_start: Option<Instant>,
}

/// Synchronous wrapper that moves a [`Servo`] and waits for it
pub struct ServoControl<S> {
    servo: S,
    config: ServoConfig,
    lock: PreemptibleLock,
    estimate: ParkingLotMutex<Estimate>,
}

impl<S: Servo> ServoControl<S> {
    /// Wrap a servo with the given geometry
    ///
    /// Fails if the speed or range is not positive and finite.
    pub fn new(servo: S, config: ServoConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            servo,
            config,
            lock: PreemptibleLock::new(),
            estimate: ParkingLotMutex::new(Estimate::default()),
        })
    }

    /// Move to `angle` (radians) and sleep for the estimated travel time
    ///
    /// A newer command preempts this one; the interrupted call returns
    /// `Interrupted` while the servo continues toward the newer target.
    pub fn go_to_angle(&self, angle: f64) -> Result<(), ControlError> {
        let _guard = self.lock.lock_interruptibly_guard()?;
        let travel = self.command(angle)?;
        tracing::trace!(angle, travel = %travel, "servo commanded");
        context::sleep(travel)?;
        Ok(())
    }

    /// Smallest reachable angle
    pub fn minimum_angle(&self) -> f64 {
        if self.config.flip_direction {
            self.config.zero_position - self.config.range_rad
        } else {
            -self.config.zero_position
        }
    }

    /// Largest reachable angle
    pub fn maximum_angle(&self) -> f64 {
        if self.config.flip_direction {
            self.config.zero_position
        } else {
            self.config.range_rad - self.config.zero_position
        }
    }

    /// Whether `angle` is within the servo's range of motion
    pub fn is_in_bounds(&self, angle: f64) -> bool {
        angle >= self.minimum_angle() && angle <= self.maximum_angle()
    }

    /// Estimated current angle, or `None` before the first command
    ///
    /// Interpolates linearly between the previous and the target angle at
    /// the configured speed.
    pub fn servo_position(&self) -> Option<f64> {
        self.position_at(&self.estimate.lock(), Instant::now())
    }

    /// The wrapped servo
    pub fn servo(&self) -> &S {
        &self.servo
    }

    /// Validate, update the estimate and issue the raw command; returns the
    /// estimated travel time
    fn command(&self, angle: f64) -> Result<Duration, ControlError> {
        let raw = self.raw_position(angle);
        if !(-SERVO_RAW_TOLERANCE..=1.0 + SERVO_RAW_TOLERANCE).contains(&raw) {
            return Err(ControlError::OutOfRange { angle, raw });
        }

        let mut estimate = self.estimate.lock();
        let now = Instant::now();
        let from = self
            .position_at(&estimate, now)
            .unwrap_or_else(|| worst_case_start(angle));
        estimate.previous = Some(from);
        estimate.target = Some(angle);
        estimate.movement_start = Some(now);
        self.servo.set_position(raw);

        Ok(self.travel_time(from, angle))
    }

    fn raw_position(&self, angle: f64) -> f64 {
        if self.config.flip_direction {
            (self.config.zero_position - angle) / self.config.range_rad
        } else {
            (self.config.zero_position + angle) / self.config.range_rad
        }
    }

    fn travel_time(&self, from: f64, to: f64) -> Duration {
        Duration::of_seconds((to - from).abs() / self.config.speed_rad_per_sec)
    }

    fn position_at(&self, estimate: &Estimate, now: Instant) -> Option<f64> {
        let (previous, target, start) =
            match (estimate.previous, estimate.target, estimate.movement_start) {
                (Some(p), Some(t), Some(s)) => (p, t, s),
                _ => return None,
            };

        let end = start.add(self.travel_time(previous, target));
        if now.is_after(end) {
            return Some(target);
        }
        let travelled = now.since(start).to_seconds() * self.config.speed_rad_per_sec;
        Some(previous + travelled * (target - previous).signum())
    }
}

/// Start of whichever end of a full turn is farther from `target`
fn worst_case_start(target: f64) -> f64 {
    let from_low = target.abs();
    let from_high = (target - SERVO_ASSUMED_SPAN_RAD).abs();
    if from_low > from_high {
        0.0
    } else {
        SERVO_ASSUMED_SPAN_RAD
    }
}
