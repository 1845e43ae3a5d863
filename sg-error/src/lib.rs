//! Unified error handling for SkyGuard
//!
//! This crate provides the error types used across all SkyGuard components.
//! The per-iteration categories (`SensorError`, `DispatchError`, `InputError`)
//! are small and cloneable so the control loop can report them without
//! giving up ownership; `SkyguardError` wraps them together with the startup
//! and configuration failures that end the process.

use std::io;
use std::path::PathBuf;

/// Result type alias using SkyguardError
pub type Result<T> = std::result::Result<T, SkyguardError>;

/// A sensor read failed or returned something unusable.
///
/// Transient: the control loop skips whatever depends on the reading for
/// the current iteration and carries on.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("{sensor} sensor timed out after {timeout_ms} ms")]
    Timeout {
        sensor: &'static str,
        timeout_ms: u64,
    },

    #[error("Failed to read {sensor} sensor: {reason}")]
    Read {
        sensor: &'static str,
        reason: String,
    },

    #[error("Malformed {sensor} reading: {reason}")]
    Malformed {
        sensor: &'static str,
        reason: String,
    },
}

impl SensorError {
    pub fn read(sensor: &'static str, reason: impl Into<String>) -> Self {
        Self::Read {
            sensor,
            reason: reason.into(),
        }
    }

    pub fn malformed(sensor: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            sensor,
            reason: reason.into(),
        }
    }
}

/// An evasive command or an alert could not be delivered.
///
/// Reported and logged; never stops the deterrent script or its cleanup.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Vehicle link unresponsive: {0}")]
    LinkUnresponsive(String),

    #[error("Vehicle link rejected command: {0}")]
    Rejected(String),

    #[error("Transport {device} unavailable: {reason}")]
    TransportUnavailable {
        device: String,
        reason: String,
    },

    #[error("Transport write timed out after {timeout_ms} ms")]
    Timeout {
        timeout_ms: u64,
    },

    #[error("Transport write failed: {0}")]
    Write(String),
}

/// A thermal frame had the wrong shape or contents.
///
/// Fatal for the classification call only.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Thermal frame has {actual} samples, expected {expected}")]
    FrameSize {
        expected: usize,
        actual: usize,
    },

    #[error("Thermal frame is {rows}x{cols}, classifier expects {expected_rows}x{expected_cols}")]
    FrameShape {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Thermal frame sample {index} is not a finite temperature")]
    NonFiniteSample {
        index: usize,
    },
}

/// Unified error type for all SkyGuard operations
#[derive(thiserror::Error, Debug)]
pub enum SkyguardError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("GPIO {pin} error: {reason}")]
    Gpio {
        pin: u32,
        reason: String,
    },

    #[error("Serial port {path} error: {reason}")]
    SerialPort {
        path: PathBuf,
        reason: String,
    },

    #[error("Hardware not found: {0}")]
    HardwareNotFound(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Per-iteration Errors
    // ============================================================================
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Input(#[from] InputError),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl SkyguardError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a GPIO error for a pin
    pub fn gpio(pin: u32, reason: impl Into<String>) -> Self {
        Self::Gpio {
            pin,
            reason: reason.into(),
        }
    }

    /// Create a serial port error
    pub fn serial(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SerialPort {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error only affects the current control-loop iteration
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Sensor(_) | Self::Dispatch(_) | Self::Input(_))
    }
}

// Allow converting from String to SkyguardError
impl From<String> for SkyguardError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to SkyguardError
impl From<&str> for SkyguardError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
