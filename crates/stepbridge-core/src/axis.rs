//! Axis registry
//!
//! Static per-axis configuration, loaded once at startup and used only for
//! degree/step conversion.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of independently addressable axes.
pub const AXIS_COUNT: u8 = 6;

/// Axis identifier, always in `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AxisId(u8);

impl AxisId {
    /// Create an axis id, returning `None` outside `1..=6`
    pub fn new(id: u8) -> Option<Self> {
        (1..=AXIS_COUNT).contains(&id).then_some(Self(id))
    }

    /// Parse a single ASCII wire digit (`b'1'..=b'6'`)
    pub fn from_digit(digit: u8) -> Option<Self> {
        if digit.is_ascii_digit() {
            Self::new(digit - b'0')
        } else {
            None
        }
    }

    /// Numeric value of the axis
    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterate over every axis id in order
    pub fn all() -> impl Iterator<Item = AxisId> {
        (1..=AXIS_COUNT).map(AxisId)
    }

    fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for AxisId {
    type Error = ConfigError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id).ok_or_else(|| ConfigError::InvalidAxisId { id: id.to_string() })
    }
}

impl From<AxisId> for u8 {
    fn from(axis: AxisId) -> Self {
        axis.0
    }
}

/// Mechanical configuration of one axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisConfig {
    /// Axis this entry describes
    pub axis: AxisId,
    /// Motor steps per full output revolution (before gearing)
    pub steps_per_rev: u32,
    /// Reduction between motor and joint
    pub gear_ratio: f64,
}

impl AxisConfig {
    /// Create an axis config with a 1:1 gear ratio
    pub fn new(axis: AxisId, steps_per_rev: u32) -> Self {
        Self {
            axis,
            steps_per_rev,
            gear_ratio: 1.0,
        }
    }

    /// Set the gear ratio
    pub fn with_gear_ratio(mut self, gear_ratio: f64) -> Self {
        self.gear_ratio = gear_ratio;
        self
    }

    /// Motor steps for one full joint revolution
    pub fn steps_per_joint_rev(&self) -> f64 {
        f64::from(self.steps_per_rev) * self.gear_ratio
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps_per_rev == 0 {
            return Err(ConfigError::InvalidStepsPerRev { axis: self.axis });
        }
        if !self.gear_ratio.is_finite() || self.gear_ratio <= 0.0 {
            return Err(ConfigError::InvalidGearRatio {
                axis: self.axis,
                ratio: self.gear_ratio,
            });
        }
        Ok(())
    }
}

/// Immutable table of axis configurations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisRegistry {
    axes: [Option<AxisConfig>; AXIS_COUNT as usize],
}

impl AxisRegistry {
    /// Build a registry, rejecting invalid or duplicated entries
    pub fn from_configs(
        configs: impl IntoIterator<Item = AxisConfig>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::default();
        for config in configs {
            config.validate()?;
            let slot = &mut registry.axes[config.axis.index()];
            if slot.is_some() {
                return Err(ConfigError::DuplicateAxis { axis: config.axis });
            }
            *slot = Some(config);
        }
        Ok(registry)
    }

    /// Fail unless every axis `1..=6` is configured
    pub fn require_complete(&self) -> Result<(), ConfigError> {
        match AxisId::all().find(|axis| self.get(*axis).is_none()) {
            Some(axis) => Err(ConfigError::MissingAxis { axis }),
            None => Ok(()),
        }
    }

    /// Look up the configuration of an axis
    pub fn get(&self, axis: AxisId) -> Option<&AxisConfig> {
        self.axes[axis.index()].as_ref()
    }

    /// Number of configured axes
    pub fn len(&self) -> usize {
        self.axes.iter().flatten().count()
    }

    /// True when no axis is configured
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over configured axes in id order
    pub fn iter(&self) -> impl Iterator<Item = &AxisConfig> {
        self.axes.iter().flatten()
    }
}
