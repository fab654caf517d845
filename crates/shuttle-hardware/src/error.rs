//! Hardware control errors

use shuttle_core::{Interrupted, Timeout};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by synchronous device operations
#[derive(Debug, Error)]
pub enum ControlError {
    /// The operation was cancelled, typically by a newer command preempting it
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// The device did not settle in time
    #[error("device did not settle: {0}")]
    Timeout(#[from] Timeout),

    /// The requested servo angle maps outside the servo's raw range
    #[error("servo angle {angle} rad out of range (raw position {raw})")]
    OutOfRange {
        /// Requested angle in radians
        angle: f64,
        /// The raw `[0, 1]` position it maps to
        raw: f64,
    },
}

/// Errors that can occur while loading hardware configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of its allowed range
    #[error("Invalid config: {0}")]
    Invalid(String),
}
