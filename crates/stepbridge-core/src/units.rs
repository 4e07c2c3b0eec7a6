//! Unit conversion utilities
//!
//! Converts host-side move values into device steps.
//!
//! Degree conversion computes `value * steps_per_rev * gear_ratio / 360` in
//! `f64` and rounds half away from zero (`f64::round`), so `-0.5` steps
//! becomes `-1` and `0.5` becomes `1`. Step values pass through untouched.

use crate::axis::{AxisConfig, AxisId, AxisRegistry};
use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a move value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Device-native motor steps
    #[default]
    Steps,
    /// Joint angle in degrees
    Degrees,
}

impl Unit {
    /// Wire suffix letter
    pub fn suffix(self) -> char {
        match self {
            Self::Steps => 'S',
            Self::Degrees => 'G',
        }
    }

    /// Parse a wire suffix letter
    pub fn from_suffix(suffix: u8) -> Option<Self> {
        match suffix {
            b'S' => Some(Self::Steps),
            b'G' => Some(Self::Degrees),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps => write!(f, "steps"),
            Self::Degrees => write!(f, "degrees"),
        }
    }
}

/// Convert degrees to steps for a single axis
pub fn degrees_to_steps(config: &AxisConfig, degrees: i64) -> Result<i64, ConversionError> {
    let steps = (degrees as f64 * config.steps_per_joint_rev() / 360.0).round();

    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    if !steps.is_finite() || steps >= i64::MAX as f64 || steps < i64::MIN as f64 {
        return Err(ConversionError::OutOfRange {
            axis: config.axis,
            value: degrees,
        });
    }
    Ok(steps as i64)
}

impl AxisRegistry {
    /// Convert a move value on `axis` into a device step count
    pub fn convert(&self, axis: AxisId, value: i64, unit: Unit) -> Result<i64, ConversionError> {
        let config = self
            .get(axis)
            .ok_or(ConversionError::UnknownAxisConfig { axis })?;

        match unit {
            Unit::Steps => Ok(value),
            Unit::Degrees => degrees_to_steps(config, value),
        }
    }
}
