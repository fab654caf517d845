//! Hardware configuration (shuttle.toml)
//!
//! ```toml
//! [motor]
//! timeout_ms = 5000
//! poll_interval_ms = 30
//!
//! [servo]
//! speed_rad_per_sec = 5.2
//! range_rad = 4.71
//! flip_direction = false
//! zero_position = 0.0
//! ```

use crate::defaults::{DEFAULT_MOTOR_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shuttle_core::Duration;
use std::path::Path;

/// Top-level hardware configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Linear motor settings
    #[serde(default)]
    pub motor: MotorConfig,

    /// Servo geometry, if a servo is attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servo: Option<ServoConfig>,
}

/// Settings for [`LinearMotorControl`](crate::LinearMotorControl)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// How long the motor may stay busy before the move fails
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How often the busy flag is polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_MOTOR_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl MotorConfig {
    /// Move timeout as a clock duration
    pub fn timeout(&self) -> Duration {
        Duration::of_millis(i64::try_from(self.timeout_ms).unwrap_or(i64::MAX))
    }

    /// Poll interval as a clock duration
    pub fn poll_interval(&self) -> Duration {
        Duration::of_millis(i64::try_from(self.poll_interval_ms).unwrap_or(i64::MAX))
    }
}

/// Geometry and speed of a positional servo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Constant angular speed, radians per second
    pub speed_rad_per_sec: f64,

    /// Angle covered by the full raw range `[0, 1]`, radians
    pub range_rad: f64,

    /// Whether increasing angles map to decreasing raw positions
    #[serde(default)]
    pub flip_direction: bool,

    /// Angle offset of the zero position, radians
    #[serde(default)]
    pub zero_position: f64,
}

impl ServoConfig {
    /// Check that speed and range are positive and finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.speed_rad_per_sec.is_finite() && self.speed_rad_per_sec > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "servo speed must be positive, got {}",
                self.speed_rad_per_sec
            )));
        }
        if !(self.range_rad.is_finite() && self.range_rad > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "servo range must be positive, got {}",
                self.range_rad
            )));
        }
        if !self.zero_position.is_finite() {
            return Err(ConfigError::Invalid(
                "servo zero position must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl HardwareConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HardwareConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.motor.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "motor timeout must be positive".to_string(),
            ));
        }
        if self.motor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "motor poll interval must be positive".to_string(),
            ));
        }
        if let Some(servo) = &self.servo {
            servo.validate()?;
        }
        Ok(())
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HardwareConfig::from_toml_str("").unwrap();
        assert_eq!(config.motor.timeout_ms, 5_000);
        assert_eq!(config.motor.poll_interval_ms, 30);
        assert_eq!(config.motor.poll_interval(), Duration::of_millis(30));
        assert!(config.servo.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[motor]
timeout_ms = 2500
poll_interval_ms = 10

[servo]
speed_rad_per_sec = 5.0
range_rad = 3.0
flip_direction = true
zero_position = 1.5
"#;

        let config = HardwareConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.motor.timeout(), Duration::of_millis(2_500));
        let servo = config.servo.unwrap();
        assert_eq!(servo.speed_rad_per_sec, 5.0);
        assert!(servo.flip_direction);
        assert_eq!(servo.zero_position, 1.5);
    }

    #[test]
    fn test_servo_defaults() {
        let toml = r#"
[servo]
speed_rad_per_sec = 2.0
range_rad = 3.14
"#;

        let servo = HardwareConfig::from_toml_str(toml).unwrap().servo.unwrap();
        assert!(!servo.flip_direction);
        assert_eq!(servo.zero_position, 0.0);
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let toml = r#"
[motor]
poll_interval_ms = 0
"#;

        let err = HardwareConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_non_positive_servo_speed() {
        let toml = r#"
[servo]
speed_rad_per_sec = 0.0
range_rad = 3.0
"#;

        assert!(matches!(
            HardwareConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        let err = HardwareConfig::from_toml_str("[motor\ntimeout_ms = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = HardwareConfig {
            motor: MotorConfig::default(),
            servo: Some(ServoConfig {
                speed_rad_per_sec: 4.0,
                range_rad: 3.0,
                flip_direction: false,
                zero_position: 0.5,
            }),
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(HardwareConfig::from_toml_str(&text).unwrap(), config);
    }
}
