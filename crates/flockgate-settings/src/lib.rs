//! FlockGate Settings Crate
//!
//! Handles gateway configuration files and their validation.

pub mod config;
pub mod error;

pub use config::{
    Config, ManufacturerSettings, MonitorSettings, ReconnectSettings, SerialDeviceSettings,
    TerminalSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
