//! Event type definitions for the event bus.
//!
//! Every event serializes as `{"event": "<kind>", "data": ...}` where
//! `<kind>` is the snake_case name subscribers switch on.

use serde::{Deserialize, Serialize};

use crate::data::{DetectionRecord, DeviceRole, GpsFix};

/// Root event enum for everything the gateway publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A new fix was decoded
    GpsUpdate(GpsFix),
    /// The GPS read loop or liveness check lost the device
    GpsDisconnected,
    /// The supervisor reopened the GPS port
    GpsReconnected {
        /// Port that was reopened.
        port: String,
    },
    /// The detector read loop or liveness check lost the device
    FlockDisconnected,
    /// The supervisor reopened the detector port
    FlockReconnected {
        /// Port that was reopened.
        port: String,
    },
    /// The supervisor gave up
    ReconnectFailed {
        /// `"gps"` or `"flock"`.
        device: String,
    },
    /// First sighting of a device
    NewDetection(DetectionRecord),
    /// A stored detection was merged or relabelled
    DetectionUpdated(DetectionRecord),
    /// The store was emptied
    DetectionsCleared,
    /// One raw line from the detector (terminal group only)
    SerialData(String),
    /// Terminal subscription accepted
    SerialConnected,
    /// Terminal subscription rejected
    SerialError {
        /// Human readable reason.
        message: String,
    },
    /// Keep-alive for subscribers
    Heartbeat,
}

impl GatewayEvent {
    /// `<role>_disconnected`
    pub fn disconnected(role: DeviceRole) -> Self {
        match role {
            DeviceRole::Gps => GatewayEvent::GpsDisconnected,
            DeviceRole::Detector => GatewayEvent::FlockDisconnected,
        }
    }

    /// `<role>_reconnected`
    pub fn reconnected(role: DeviceRole, port: impl Into<String>) -> Self {
        let port = port.into();
        match role {
            DeviceRole::Gps => GatewayEvent::GpsReconnected { port },
            DeviceRole::Detector => GatewayEvent::FlockReconnected { port },
        }
    }

    /// `reconnect_failed` for a role
    pub fn reconnect_failed(role: DeviceRole) -> Self {
        GatewayEvent::ReconnectFailed {
            device: role.event_prefix().to_string(),
        }
    }

    /// The wire name of this event
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::GpsUpdate(_) => "gps_update",
            GatewayEvent::GpsDisconnected => "gps_disconnected",
            GatewayEvent::GpsReconnected { .. } => "gps_reconnected",
            GatewayEvent::FlockDisconnected => "flock_disconnected",
            GatewayEvent::FlockReconnected { .. } => "flock_reconnected",
            GatewayEvent::ReconnectFailed { .. } => "reconnect_failed",
            GatewayEvent::NewDetection(_) => "new_detection",
            GatewayEvent::DetectionUpdated(_) => "detection_updated",
            GatewayEvent::DetectionsCleared => "detections_cleared",
            GatewayEvent::SerialData(_) => "serial_data",
            GatewayEvent::SerialConnected => "serial_connected",
            GatewayEvent::SerialError { .. } => "serial_error",
            GatewayEvent::Heartbeat => "heartbeat",
        }
    }

    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            GatewayEvent::GpsUpdate(_) => EventCategory::Gps,
            GatewayEvent::GpsDisconnected
            | GatewayEvent::GpsReconnected { .. }
            | GatewayEvent::FlockDisconnected
            | GatewayEvent::FlockReconnected { .. }
            | GatewayEvent::ReconnectFailed { .. } => EventCategory::Connection,
            GatewayEvent::NewDetection(_)
            | GatewayEvent::DetectionUpdated(_)
            | GatewayEvent::DetectionsCleared => EventCategory::Detection,
            GatewayEvent::SerialData(_)
            | GatewayEvent::SerialConnected
            | GatewayEvent::SerialError { .. } => EventCategory::Terminal,
            GatewayEvent::Heartbeat => EventCategory::System,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            GatewayEvent::GpsUpdate(fix) => format!(
                "GPS fix {:.6},{:.6} (quality {}, {} sats)",
                fix.latitude, fix.longitude, fix.fix_quality, fix.satellites
            ),
            GatewayEvent::GpsReconnected { port } | GatewayEvent::FlockReconnected { port } => {
                format!("{} on {}", self.kind(), port)
            }
            GatewayEvent::ReconnectFailed { device } => {
                format!("Reconnection to {} failed", device)
            }
            GatewayEvent::NewDetection(r) | GatewayEvent::DetectionUpdated(r) => format!(
                "{} #{} {:?} x{}",
                self.kind(),
                r.id,
                r.mac_address,
                r.detection_count
            ),
            GatewayEvent::SerialData(line) => format!("serial: {}", line),
            GatewayEvent::SerialError { message } => format!("serial error: {}", message),
            _ => self.kind().to_string(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Position updates.
    Gps,
    /// Device connection lifecycle.
    Connection,
    /// Detection store changes.
    Detection,
    /// Raw terminal stream and its control messages.
    Terminal,
    /// Keep-alives.
    System,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Gps => write!(f, "Gps"),
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Detection => write!(f, "Detection"),
            EventCategory::Terminal => write!(f, "Terminal"),
            EventCategory::System => write!(f, "System"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_specific_names() {
        assert_eq!(
            GatewayEvent::disconnected(DeviceRole::Gps).kind(),
            "gps_disconnected"
        );
        assert_eq!(
            GatewayEvent::disconnected(DeviceRole::Detector).kind(),
            "flock_disconnected"
        );
        assert_eq!(
            GatewayEvent::reconnected(DeviceRole::Detector, "COM4").kind(),
            "flock_reconnected"
        );
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(GatewayEvent::reconnect_failed(DeviceRole::Gps)).unwrap();
        assert_eq!(json["event"], "reconnect_failed");
        assert_eq!(json["data"]["device"], "gps");

        let json = serde_json::to_value(GatewayEvent::SerialData("hello".to_string())).unwrap();
        assert_eq!(json["event"], "serial_data");
        assert_eq!(json["data"], "hello");

        let json = serde_json::to_value(GatewayEvent::DetectionsCleared).unwrap();
        assert_eq!(json["event"], "detections_cleared");
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let events = [
            GatewayEvent::GpsDisconnected,
            GatewayEvent::FlockReconnected {
                port: "p".to_string(),
            },
            GatewayEvent::SerialConnected,
            GatewayEvent::Heartbeat,
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.kind());
        }
    }
}
