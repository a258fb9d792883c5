//! Data models for fixes, detections and connection state
//!
//! This module provides:
//! - GPS fixes decoded from the receiver
//! - Detection records and the incoming raw detection shape
//! - The detection store with same-key merge semantics
//! - Device roles and per-role connection status

pub mod detection;
pub mod store;

pub use detection::{DetectionRecord, Enrichment, RawDetection, MAX_EXTRA_FIELDS};
pub use store::{DetectionStore, IngestOutcome};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position fix reported by the GPS receiver.
///
/// Produced once per successfully decoded fix-data sentence and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// Signed decimal degrees, negative south of the equator
    pub latitude: f64,
    /// Signed decimal degrees, negative west of Greenwich
    pub longitude: f64,
    /// Meters above mean sea level
    #[serde(default)]
    pub altitude: f64,
    /// 0 = no fix
    pub fix_quality: u8,
    /// Satellites in use
    pub satellites: u32,
    /// UTC time field as sent by the receiver
    pub timestamp: String,
}

impl GpsFix {
    /// Whether the receiver reported a usable fix
    pub fn has_fix(&self) -> bool {
        self.fix_quality > 0
    }
}

/// The two serial devices the gateway owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// NMEA GPS receiver
    Gps,
    /// Radio sniffing detector emitting JSON lines
    Detector,
}

impl DeviceRole {
    /// Both roles, GPS first
    pub const ALL: [DeviceRole; 2] = [DeviceRole::Gps, DeviceRole::Detector];

    /// Name used in event kinds (`gps_disconnected`, `flock_reconnected`, ...)
    pub fn event_prefix(&self) -> &'static str {
        match self {
            DeviceRole::Gps => "gps",
            DeviceRole::Detector => "flock",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Gps => write!(f, "gps"),
            DeviceRole::Detector => write!(f, "detector"),
        }
    }
}

/// Connection lifecycle of one device role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No handle is open
    #[default]
    Disconnected,
    /// A handle is open and a read loop owns it
    Connected,
    /// The reconnection supervisor is retrying
    Reconnecting,
    /// Reconnection attempts were exhausted; waits for a manual connect
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Snapshot of a role's connection cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Which device this describes
    pub role: DeviceRole,
    /// Current lifecycle state
    pub state: ConnectionState,
    /// Port assigned to the role, kept across unexpected disconnects
    pub port: Option<String>,
    /// Consecutive reconnect attempts since the last successful connect
    pub reconnect_attempts: u32,
    /// Most recent failure reason
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    /// Whether the role currently holds an open handle
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_prefix() {
        assert_eq!(DeviceRole::Gps.event_prefix(), "gps");
        assert_eq!(DeviceRole::Detector.event_prefix(), "flock");
    }

    #[test]
    fn test_has_fix() {
        let mut fix = GpsFix {
            latitude: 48.1173,
            longitude: 11.5167,
            altitude: 545.4,
            fix_quality: 1,
            satellites: 8,
            timestamp: "123519".to_string(),
        };
        assert!(fix.has_fix());
        fix.fix_quality = 0;
        assert!(!fix.has_fix());
    }

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
    }
}
