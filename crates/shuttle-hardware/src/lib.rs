//! Shuttle Hardware
//!
//! Synchronous device control built on `shuttle-core`:
//! - **LinearMotorControl**: drive to a position, polling the device until it settles
//! - **ServoControl**: drive to an angle, sleeping for the estimated travel time
//! - **MetricPositionSensor**: cancellable position readings in meters
//! - **HardwareConfig**: TOML configuration for timeouts, poll rates and servo geometry
//!
//! Every device operation holds the device's preemptible lock, so issuing a
//! new command cancels the one in flight instead of queueing behind it.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod defaults;
pub mod error;
pub mod linear_motor;
pub mod sensor;
pub mod servo;

pub use config::{HardwareConfig, MotorConfig, ServoConfig};
pub use error::{ConfigError, ControlError};
pub use linear_motor::{LinearActuator, LinearMotorControl};
pub use sensor::{MetricPositionSensor, OffsetSensor};
pub use servo::{Servo, ServoControl};
