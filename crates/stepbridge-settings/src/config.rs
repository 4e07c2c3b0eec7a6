//! Broker configuration
//!
//! Loaded once at startup from a JSON or TOML file (chosen by extension).
//! Any problem is fatal: the broker never starts with a partial axis table.
//!
//! ```toml
//! timeout_ms = 1000
//! reconnect_backoff_ms = 2000
//!
//! [host]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [device]
//! port = "/dev/ttyACM0"
//!
//! [axes.1]
//! steps_per_rev = 200
//! gear_ratio = 1.0
//! ```

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use stepbridge_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_RECONNECT_BACKOFF_MS, DEFAULT_TIMEOUT_MS,
};
use stepbridge_core::{AxisConfig, AxisId, AxisRegistry, ConfigError};

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_reconnect_backoff_ms() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}

fn default_gear_ratio() -> f64 {
    1.0
}

/// One serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// Port path
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// One axis entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSettings {
    /// Motor steps per revolution
    pub steps_per_rev: u32,
    /// Motor-to-joint reduction
    #[serde(default = "default_gear_ratio")]
    pub gear_ratio: f64,
}

/// Complete startup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Host-facing port
    pub host: PortSettings,
    /// Device-facing port
    pub device: PortSettings,
    /// Read/write timeout of both links, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between reconnect attempts, in milliseconds
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Axis table keyed by axis id ("1".."6")
    pub axes: BTreeMap<String, AxisSettings>,
}

impl BrokerConfig {
    /// Load config from file (JSON or TOML) and validate it
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(&content)
        } else {
            Err(SettingsError::LoadError(
                "Config file must be .json or .toml".to_string(),
            ))
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> SettingsResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> SettingsResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        for (key, port) in [("host", &self.host), ("device", &self.device)] {
            if port.port.trim().is_empty() {
                return Err(SettingsError::invalid(
                    format!("{}.port", key),
                    "must not be empty",
                ));
            }
            if port.baud_rate == 0 {
                return Err(SettingsError::invalid(
                    format!("{}.baud_rate", key),
                    "must be > 0",
                ));
            }
        }

        if self.host.port == self.device.port {
            return Err(SettingsError::invalid(
                "device.port",
                "must differ from host.port",
            ));
        }

        if self.timeout_ms == 0 {
            return Err(SettingsError::invalid("timeout_ms", "must be > 0"));
        }

        if self.reconnect_backoff_ms == 0 {
            return Err(SettingsError::invalid("reconnect_backoff_ms", "must be > 0"));
        }

        self.axis_registry()?.require_complete()?;
        Ok(())
    }

    /// Build the axis registry from the `axes` table
    pub fn axis_registry(&self) -> SettingsResult<AxisRegistry> {
        let configs = self
            .axes
            .iter()
            .map(|(key, axis)| -> Result<AxisConfig, ConfigError> {
                let id = key
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .and_then(AxisId::new)
                    .ok_or_else(|| ConfigError::InvalidAxisId { id: key.clone() })?;
                Ok(AxisConfig::new(id, axis.steps_per_rev).with_gear_ratio(axis.gear_ratio))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(AxisRegistry::from_configs(configs)?)
    }

    /// Link read/write timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pause between reconnect attempts
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
