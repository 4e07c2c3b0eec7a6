//! # StepBridge Core
//!
//! Core types for the StepBridge serial broker.
//! Provides the axis registry, degree/step conversion, the host command
//! grammar, the wire constants shared by both links, and the error taxonomy.

pub mod axis;
pub mod command;
pub mod constants;
pub mod error;
pub mod shutdown;
pub mod units;

pub use axis::{AxisConfig, AxisId, AxisRegistry, AXIS_COUNT};
pub use command::{Command, MoveKind, ProfileKind};
pub use error::{ConfigError, ConnectionError, ConversionError, Error, Result};
pub use shutdown::ShutdownSignal;
pub use units::Unit;
