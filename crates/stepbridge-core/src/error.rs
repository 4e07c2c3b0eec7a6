//! Error handling for StepBridge
//!
//! Error types for each layer of the broker:
//! - Connection errors (serial transport)
//! - Conversion errors (degree/step conversion of a single command)
//! - Configuration errors (startup configuration)
//!
//! All error types use `thiserror` for ergonomic error handling.

use crate::axis::AxisId;
use thiserror::Error;

/// Connection error type
///
/// Represents transport faults on either serial link. These are recovered
/// by reopening both links and are never reported to the host.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// The link was closed (by a reconnect or shutdown)
    #[error("Link {port} is closed")]
    LinkClosed {
        /// The name of the closed port.
        port: String,
    },

    /// Baud rate not supported
    #[error("Baud rate {baud} not supported")]
    UnsupportedBaudRate {
        /// The unsupported baud rate.
        baud: u32,
    },

    /// Shutdown was requested while waiting for the links
    #[error("Shutdown requested")]
    ShutdownRequested,
}

/// Conversion error type
///
/// Aborts processing of a single `Move`; the host receives an error line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// No configuration is registered for the axis
    #[error("No configuration for axis {axis}")]
    UnknownAxisConfig {
        /// The axis the command addressed.
        axis: AxisId,
    },

    /// The converted step count does not fit the device's step counter
    #[error("Converting {value} degrees on axis {axis} overflows the step range")]
    OutOfRange {
        /// The axis the command addressed.
        axis: AxisId,
        /// The requested value in degrees.
        value: i64,
    },
}

/// Configuration error type
///
/// Represents problems with the axis table or link settings. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Axis id outside 1..=6
    #[error("Axis id {id} is outside 1..=6")]
    InvalidAxisId {
        /// The offending axis id.
        id: String,
    },

    /// Axis configured twice
    #[error("Axis {axis} is configured more than once")]
    DuplicateAxis {
        /// The duplicated axis.
        axis: AxisId,
    },

    /// Axis missing from the table
    #[error("Axis {axis} has no configuration")]
    MissingAxis {
        /// The missing axis.
        axis: AxisId,
    },

    /// Steps per revolution must be positive
    #[error("Axis {axis}: steps_per_rev must be > 0")]
    InvalidStepsPerRev {
        /// The axis with the bad value.
        axis: AxisId,
    },

    /// Gear ratio must be positive and finite
    #[error("Axis {axis}: gear_ratio must be a positive finite number, got {ratio}")]
    InvalidGearRatio {
        /// The axis with the bad value.
        axis: AxisId,
        /// The rejected ratio.
        ratio: f64,
    },
}

/// Main error type for StepBridge
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Conversion error
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a transport-level error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if the error was caused by a shutdown request
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::ShutdownRequested))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
