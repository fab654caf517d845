//! Blocking drive-to-position for linear motors

use crate::config::MotorConfig;
use crate::error::ControlError;
use shuttle_core::context;
use shuttle_core::time::{Duration, Instant, Timeout};
use shuttle_core::PreemptibleLock;

/// A device that drives toward a target position on its own
///
/// Typically a motor controller running closed-loop position control on an
/// embedded board. Positions are in meters.
pub trait LinearActuator: Send + Sync {
    /// Command a new target position
    fn set_target_position_meters(&self, position: f64);

    /// Whether the device is still moving toward its target
    fn is_busy(&self) -> bool;

    /// The last commanded target
    fn target_position_meters(&self) -> f64;

    /// Current measured position
    fn position_meters(&self) -> f64;

    /// Current measured velocity, meters per second
    fn velocity_meters(&self) -> f64;
}

/// Synchronous wrapper that moves a [`LinearActuator`] and waits for it
///
/// Moves are serialized by a [`PreemptibleLock`]: issuing a new move while
/// another is in flight cancels the older one, which returns
/// `ControlError::Interrupted`, and the newer target takes over.
pub struct LinearMotorControl<D> {
    device: D,
    lock: PreemptibleLock,
    timeout: Duration,
    poll_interval: Duration,
}

impl<D: LinearActuator> LinearMotorControl<D> {
    /// Wrap a device with the default timeout and poll interval
    pub fn new(device: D) -> Self {
        Self::with_config(device, &MotorConfig::default())
    }

    /// Wrap a device using the given motor settings
    pub fn with_config(device: D, config: &MotorConfig) -> Self {
        Self {
            device,
            lock: PreemptibleLock::new(),
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Override how long a move may take
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override how often the busy flag is polled
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Move to `position` (meters) and block until the device settles
    ///
    /// Fails with `Timeout` if the device is still busy after the configured
    /// timeout, and with `Interrupted` if the caller is cancelled or a newer
    /// move preempts this one. The lock is released in every case.
    pub fn go_to_position(&self, position: f64) -> Result<(), ControlError> {
        let _guard = self.lock.lock_interruptibly_guard()?;
        self.device.set_target_position_meters(position);

        let start = Instant::now();
        while self.device.is_busy() {
            if Instant::now().since(start).is_greater_than(self.timeout) {
                tracing::warn!(target_m = position, timeout = %self.timeout, "linear motor timed out");
                return Err(Timeout::since(start).into());
            }
            context::sleep(self.poll_interval)?;
        }
        Ok(())
    }

    /// The last commanded target, in meters
    pub fn target_position_meters(&self) -> f64 {
        self.device.target_position_meters()
    }

    /// Current position, in meters
    pub fn position_meters(&self) -> f64 {
        self.device.position_meters()
    }

    /// Current velocity, in meters per second
    pub fn velocity_meters(&self) -> f64 {
        self.device.velocity_meters()
    }

    /// Whether a move is in progress
    pub fn is_moving(&self) -> bool {
        self.lock.is_locked()
    }

    /// The wrapped device
    pub fn device(&self) -> &D {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as ParkingLotMutex;

    /// Settles after a fixed number of busy polls
    struct Scripted {
        target: ParkingLotMutex<f64>,
        busy_polls: ParkingLotMutex<u32>,
        settle_after: u32,
    }

    impl Scripted {
        fn new(settle_after: u32) -> Self {
            Self {
                target: ParkingLotMutex::new(0.0),
                busy_polls: ParkingLotMutex::new(0),
                settle_after,
            }
        }
    }

    impl LinearActuator for Scripted {
        fn set_target_position_meters(&self, position: f64) {
            *self.target.lock() = position;
            *self.busy_polls.lock() = 0;
        }

        fn is_busy(&self) -> bool {
            let mut polls = self.busy_polls.lock();
            *polls += 1;
            *polls <= self.settle_after
        }

        fn target_position_meters(&self) -> f64 {
            *self.target.lock()
        }

        fn position_meters(&self) -> f64 {
            *self.target.lock()
        }

        fn velocity_meters(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_settles_after_polling() {
        let motor = LinearMotorControl::new(Scripted::new(3)).poll_interval(Duration::of_millis(1));
        motor.go_to_position(0.25).unwrap();
        assert_eq!(motor.target_position_meters(), 0.25);
        assert_eq!(*motor.device().busy_polls.lock(), 4);
        assert!(!motor.is_moving());
    }

    #[test]
    fn test_times_out_when_never_settling() {
        let motor = LinearMotorControl::new(Scripted::new(u32::MAX))
            .timeout(Duration::of_millis(30))
            .poll_interval(Duration::of_millis(5));
        let err = motor.go_to_position(1.0).unwrap_err();
        assert!(matches!(err, ControlError::Timeout(_)));
        assert!(!motor.is_moving());
    }

    #[test]
    fn test_pending_cancellation_skips_the_move() {
        let motor = LinearMotorControl::new(Scripted::new(0));
        context::current().interrupt();
        assert!(matches!(
            motor.go_to_position(1.0),
            Err(ControlError::Interrupted(_))
        ));
        assert_eq!(motor.target_position_meters(), 0.0);
        assert!(!context::current().is_interrupted());
    }
}
