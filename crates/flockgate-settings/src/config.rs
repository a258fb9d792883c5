//! Configuration management for FlockGate
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats; the default file lives in the
//! platform config directory.
//!
//! Configuration is organized into logical sections:
//! - Serial settings for the GPS receiver and the detector
//! - Reconnection policy
//! - Liveness monitor and heartbeat timing
//! - Raw terminal buffering
//! - Manufacturer table source

use flockgate_communication::{GatewayConfig, LinkSettings, ReconnectPolicy};
use flockgate_core::EventBusConfig;
use flockgate_devicedb::IEEE_OUI_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// Serial settings for one device role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialDeviceSettings {
    /// Port to open at startup; `None` waits for a manual connect
    #[serde(default)]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Read timeout; bounds how long a read loop takes to notice a disconnect
    pub timeout_ms: u64,
}

impl SerialDeviceSettings {
    fn gps() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            timeout_ms: 1000,
        }
    }

    fn detector() -> Self {
        Self {
            port: None,
            baud_rate: 115200,
            timeout_ms: 1000,
        }
    }

    fn link(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Wait after reopening before the test read
    pub settle_delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 3000,
            settle_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub liveness_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Sleep between empty polls in the read loops
    pub idle_poll_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            liveness_interval_ms: 2000,
            heartbeat_interval_ms: 30_000,
            idle_poll_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalSettings {
    pub buffer_size: usize,
    pub replay_lines: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            replay_lines: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerSettings {
    pub table_path: PathBuf,
    pub refresh_url: String,
    /// Download a fresh table at startup
    #[serde(default)]
    pub refresh_on_start: bool,
}

impl Default for ManufacturerSettings {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("oui.txt"),
            refresh_url: IEEE_OUI_URL.to_string(),
            refresh_on_start: false,
        }
    }
}

/// Complete gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "SerialDeviceSettings::gps")]
    pub gps: SerialDeviceSettings,
    #[serde(default = "SerialDeviceSettings::detector")]
    pub detector: SerialDeviceSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub terminal: TerminalSettings,
    #[serde(default)]
    pub manufacturers: ManufacturerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gps: SerialDeviceSettings::gps(),
            detector: SerialDeviceSettings::detector(),
            reconnect: ReconnectSettings::default(),
            monitor: MonitorSettings::default(),
            terminal: TerminalSettings::default(),
            manufacturers: ManufacturerSettings::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// `<config dir>/flockgate/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("flockgate").join("config.toml"))
            .ok_or_else(|| {
                ConfigError::UnsupportedPlatform(std::env::consts::OS.to_string()).into()
            })
    }

    /// Load configuration from file (JSON or TOML by extension)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file (JSON or TOML by extension)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| SettingsError::SaveError(e.to_string()))?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        for (name, device) in [("gps", &self.gps), ("detector", &self.detector)] {
            if device.baud_rate == 0 {
                return Err(SettingsError::invalid(
                    &format!("{name}.baud_rate"),
                    "must be > 0",
                ));
            }
            if device.timeout_ms == 0 {
                return Err(SettingsError::invalid(
                    &format!("{name}.timeout_ms"),
                    "must be > 0",
                ));
            }
            if device.port.as_deref().is_some_and(|p| p.trim().is_empty()) {
                return Err(SettingsError::invalid(
                    &format!("{name}.port"),
                    "must not be blank",
                ));
            }
        }

        if self.reconnect.max_attempts == 0 {
            return Err(SettingsError::invalid(
                "reconnect.max_attempts",
                "must be > 0",
            ));
        }

        if self.monitor.liveness_interval_ms == 0 || self.monitor.heartbeat_interval_ms == 0 {
            return Err(SettingsError::invalid("monitor", "intervals must be > 0"));
        }

        if self.terminal.replay_lines > self.terminal.buffer_size {
            return Err(SettingsError::invalid(
                "terminal.replay_lines",
                "cannot exceed terminal.buffer_size",
            ));
        }

        Ok(())
    }

    /// Runtime configuration for the gateway
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            gps: self.gps.link(),
            detector: self.detector.link(),
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect.max_attempts,
                retry_delay: Duration::from_millis(self.reconnect.retry_delay_ms),
                settle_delay: Duration::from_millis(self.reconnect.settle_delay_ms),
            },
            liveness_interval: Duration::from_millis(self.monitor.liveness_interval_ms),
            heartbeat_interval: Duration::from_millis(self.monitor.heartbeat_interval_ms),
            idle_poll: Duration::from_millis(self.monitor.idle_poll_ms),
            bus: EventBusConfig {
                terminal_buffer_size: self.terminal.buffer_size,
                terminal_replay_lines: self.terminal.replay_lines,
                ..EventBusConfig::default()
            },
        }
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )
            .into()),
        }
    }
}
