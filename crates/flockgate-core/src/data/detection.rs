//! Detection records
//!
//! A [`RawDetection`] is what the detector (or an API caller) hands us: a
//! JSON object with a handful of well-known optional fields and whatever
//! else the firmware decided to include. A [`DetectionRecord`] is the stored,
//! enriched form keyed by MAC address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::GpsFix;
use crate::error::DecodeError;

/// Upper bound on unknown upstream fields carried per record
pub const MAX_EXTRA_FIELDS: usize = 64;

/// Keys owned by the gateway; never copied from upstream into the side map
const RESERVED_KEYS: &[&str] = &[
    "id",
    "alias",
    "detection_count",
    "first_seen",
    "last_seen",
    "gps",
    "server_timestamp",
    "last_rssi",
    "last_channel",
    "last_frequency",
    "last_ssid",
    "last_device_name",
];

/// An incoming detection before enrichment and storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct RawDetection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Upstream-supplied vendor, used when no MAC lookup is possible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Human readable device uptime, e.g. `"12.345s"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_time: Option<String>,
    /// Device uptime in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Forward-compatible unknown fields, at most [`MAX_EXTRA_FIELDS`]
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RawDetection {
    /// Parse one JSON object
    pub fn from_json_str(text: &str) -> Result<Self, DecodeError> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(Self::from(map)),
            Ok(_) => Err(DecodeError::NotJson("not an object".to_string())),
            Err(e) => Err(DecodeError::NotJson(e.to_string())),
        }
    }

    /// Convenience constructor used by tests and the API layer
    pub fn with_mac(mac_address: impl Into<String>, detection_method: impl Into<String>) -> Self {
        Self {
            mac_address: Some(mac_address.into()),
            detection_method: Some(detection_method.into()),
            ..Default::default()
        }
    }
}

impl From<Map<String, Value>> for RawDetection {
    fn from(mut map: Map<String, Value>) -> Self {
        let mut raw = RawDetection {
            mac_address: take_string(&mut map, "mac_address"),
            detection_method: take_label(&mut map, "detection_method"),
            protocol: take_string(&mut map, "protocol"),
            ssid: take_string(&mut map, "ssid"),
            rssi: take_with(&mut map, "rssi", Value::as_i64),
            signal_strength: take_string(&mut map, "signal_strength"),
            channel: take_with(&mut map, "channel", |v| {
                v.as_u64().and_then(|c| u32::try_from(c).ok())
            }),
            frequency: take_with(&mut map, "frequency", Value::as_f64),
            device_name: take_string(&mut map, "device_name"),
            manufacturer: take_string(&mut map, "manufacturer"),
            detection_time: take_string(&mut map, "detection_time"),
            timestamp: take_with(&mut map, "timestamp", Value::as_u64),
            extra: BTreeMap::new(),
        };

        for (key, value) in map {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if raw.extra.len() >= MAX_EXTRA_FIELDS {
                tracing::debug!("Dropping extra detection field {}", key);
                continue;
            }
            raw.extra.insert(key, value);
        }

        raw
    }
}

/// Remove `key` when it holds a string; anything else stays in the map
fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    take_with(map, key, |v| v.as_str().map(str::to_string))
}

/// Remove `key` and render any non-null value as text
fn take_label(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key)? {
        Value::String(text) => Some(text),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn take_with<T>(
    map: &mut Map<String, Value>,
    key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let converted = map.get(key).and_then(&convert)?;
    map.remove(key);
    Some(converted)
}

/// Gateway-side data attached to a detection before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    /// Snapshot of the current fix, only when it has quality > 0
    pub gps: Option<GpsFix>,
    /// Manufacturer resolved from the MAC prefix
    pub manufacturer: Option<String>,
    /// When the gateway received the record
    pub server_timestamp: DateTime<Utc>,
}

impl Enrichment {
    /// Capture enrichment for a record received at `now`
    ///
    /// A fix without quality is ignored so stored detections never carry a
    /// stale "no fix" position.
    pub fn capture(
        current_fix: Option<&GpsFix>,
        manufacturer: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            gps: current_fix.filter(|fix| fix.has_fix()).cloned(),
            manufacturer,
            server_timestamp: now,
        }
    }
}

/// A stored, deduplicated detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rssi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_channel: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// User label, empty until set
    #[serde(default)]
    pub alias: String,
    pub detection_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<GpsFix>,
    pub server_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DetectionRecord {
    /// Build a brand new record for the first sighting of a key
    pub fn create(id: u64, raw: RawDetection, enrichment: Enrichment, now: DateTime<Utc>) -> Self {
        Self {
            id,
            mac_address: raw.mac_address,
            detection_method: raw.detection_method,
            protocol: raw.protocol,
            ssid: raw.ssid,
            rssi: raw.rssi,
            signal_strength: raw.signal_strength,
            channel: raw.channel,
            frequency: raw.frequency,
            device_name: raw.device_name,
            detection_time: raw.detection_time,
            timestamp: raw.timestamp,
            last_rssi: None,
            last_channel: None,
            last_frequency: None,
            last_ssid: None,
            last_device_name: None,
            manufacturer: enrichment.manufacturer.or(raw.manufacturer),
            alias: String::new(),
            detection_count: 1,
            first_seen: now,
            last_seen: now,
            gps: enrichment.gps,
            server_timestamp: enrichment.server_timestamp,
            extra: raw.extra,
        }
    }

    /// Fold another sighting of the same key into this record.
    ///
    /// Observational fields are updated one by one and only when the new
    /// sighting carries them; the GPS snapshot is replaced as a whole
    /// whenever the new enrichment produced one.
    pub fn merge(&mut self, raw: RawDetection, enrichment: Enrichment, now: DateTime<Utc>) {
        self.detection_count += 1;
        self.last_seen = now;

        if raw.rssi.is_some() {
            self.last_rssi = raw.rssi;
        }
        if raw.channel.is_some() {
            self.last_channel = raw.channel;
        }
        if raw.frequency.is_some() {
            self.last_frequency = raw.frequency;
        }
        if raw.ssid.is_some() {
            self.last_ssid = raw.ssid;
        }
        if raw.device_name.is_some() {
            self.last_device_name = raw.device_name;
        }

        if self.detection_method.is_none() {
            self.detection_method = raw.detection_method;
        }

        if enrichment.gps.is_some() {
            self.gps = enrichment.gps;
        }
    }

    /// Position of the most recent enriched sighting, if any
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.gps.as_ref().map(|g| (g.latitude, g.longitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(quality: u8) -> GpsFix {
        GpsFix {
            latitude: 37.7749,
            longitude: -122.4194,
            altitude: 12.0,
            fix_quality: quality,
            satellites: 7,
            timestamp: "101010".to_string(),
        }
    }

    #[test]
    fn test_raw_detection_known_fields() {
        let raw = RawDetection::from_json_str(
            r#"{"mac_address":"aa:bb:cc:dd:ee:ff","detection_method":"beacon","rssi":-61,"channel":6,"threat_score":85}"#,
        )
        .unwrap();
        assert_eq!(raw.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(raw.detection_method.as_deref(), Some("beacon"));
        assert_eq!(raw.rssi, Some(-61));
        assert_eq!(raw.channel, Some(6));
        assert_eq!(raw.extra.get("threat_score"), Some(&Value::from(85)));
    }

    #[test]
    fn test_raw_detection_mistyped_field_kept_as_extra() {
        let raw = RawDetection::from_json_str(r#"{"rssi":"strong","detection_method":"x"}"#)
            .unwrap();
        assert_eq!(raw.rssi, None);
        assert_eq!(raw.extra.get("rssi"), Some(&Value::from("strong")));
    }

    #[test]
    fn test_raw_detection_numeric_method_kept_as_text() {
        let raw = RawDetection::from_json_str(r#"{"detection_method":3,"mac_address":"x"}"#)
            .unwrap();
        assert_eq!(raw.detection_method.as_deref(), Some("3"));
        assert!(raw.extra.is_empty());

        let raw = RawDetection::from_json_str(r#"{"detection_method":null}"#).unwrap();
        assert_eq!(raw.detection_method, None);
        assert!(raw.extra.is_empty());
    }

    #[test]
    fn test_raw_detection_reserved_keys_dropped() {
        let raw = RawDetection::from_json_str(r#"{"id":99,"alias":"x","gps":{}}"#).unwrap();
        assert!(raw.extra.is_empty());
    }

    #[test]
    fn test_raw_detection_extra_fields_bounded() {
        let mut map = Map::new();
        for i in 0..(MAX_EXTRA_FIELDS + 10) {
            map.insert(format!("field_{i:03}"), Value::from(i));
        }
        let raw = RawDetection::from(map);
        assert_eq!(raw.extra.len(), MAX_EXTRA_FIELDS);
    }

    #[test]
    fn test_raw_detection_rejects_non_object() {
        assert!(RawDetection::from_json_str("[1,2,3]").is_err());
        assert!(RawDetection::from_json_str("booting...").is_err());
    }

    #[test]
    fn test_enrichment_ignores_fix_without_quality() {
        let now = Utc::now();
        assert!(Enrichment::capture(Some(&fix(0)), None, now).gps.is_none());
        assert!(Enrichment::capture(Some(&fix(1)), None, now).gps.is_some());
        assert!(Enrichment::capture(None, None, now).gps.is_none());
    }

    #[test]
    fn test_merge_updates_last_fields_only_when_present() {
        let now = Utc::now();
        let mut first = RawDetection::with_mac("aa:bb:cc:00:00:01", "probe_request");
        first.rssi = Some(-40);
        let mut record =
            DetectionRecord::create(1, first, Enrichment::capture(Some(&fix(1)), None, now), now);

        let mut second = RawDetection::default();
        second.mac_address = Some("aa:bb:cc:00:00:01".to_string());
        second.channel = Some(11);
        record.merge(second, Enrichment::capture(None, None, now), now);

        assert_eq!(record.detection_count, 2);
        assert_eq!(record.rssi, Some(-40));
        assert_eq!(record.last_rssi, None);
        assert_eq!(record.last_channel, Some(11));
        assert_eq!(record.detection_method.as_deref(), Some("probe_request"));
        // No new fix: previous snapshot kept
        assert!(record.gps.is_some());
    }

    #[test]
    fn test_merge_fills_missing_detection_method() {
        let now = Utc::now();
        let mut raw = RawDetection::default();
        raw.mac_address = Some("00:11:22:33:44:55".to_string());
        let mut record = DetectionRecord::create(1, raw, Enrichment::capture(None, None, now), now);
        assert!(record.detection_method.is_none());

        record.merge(
            RawDetection::with_mac("00:11:22:33:44:55", "beacon"),
            Enrichment::capture(None, None, now),
            now,
        );
        assert_eq!(record.detection_method.as_deref(), Some("beacon"));

        record.merge(
            RawDetection::with_mac("00:11:22:33:44:55", "probe_request"),
            Enrichment::capture(None, None, now),
            now,
        );
        assert_eq!(record.detection_method.as_deref(), Some("beacon"));
    }

    #[test]
    fn test_record_serializes_flat() {
        let now = Utc::now();
        let mut raw = RawDetection::with_mac("aa:bb:cc:11:22:33", "beacon");
        raw.extra.insert("threat_score".to_string(), Value::from(100));
        let record = DetectionRecord::create(
            3,
            raw,
            Enrichment::capture(None, Some("Acme".to_string()), now),
            now,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["manufacturer"], "Acme");
        assert_eq!(json["alias"], "");
        assert_eq!(json["threat_score"], 100);
        assert!(json.get("gps").is_none());
    }
}
