//! Default constants for hardware control.

/// Default interval between device-busy polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30;

/// Default time a linear motor may take to reach its target, in milliseconds.
pub const DEFAULT_MOTOR_TIMEOUT_MS: u64 = 5_000;

/// Slack allowed when checking a raw servo target against `[0, 1]`.
pub const SERVO_RAW_TOLERANCE: f64 = 1e-6;

/// Angular extent assumed when the servo position is unknown (one full turn).
pub const SERVO_ASSUMED_SPAN_RAD: f64 = 2.0 * std::f64::consts::PI;
