//! StepBridge Settings Crate
//!
//! Loads and validates the broker's startup configuration.

pub mod config;
pub mod error;

pub use config::{AxisSettings, BrokerConfig, PortSettings};
pub use error::{SettingsError, SettingsResult};
