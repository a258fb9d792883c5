//! Detector output classification
//!
//! The detector firmware interleaves JSON detection records with free-form
//! boot and status text on the same serial line.

use flockgate_core::{DecodeError, RawDetection};
use serde_json::Value;

/// One non-empty line from the detector
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorLine {
    /// A JSON object carrying a `detection_method`
    Detection(RawDetection),
    /// Anything else: status text, JSON without a method, partial writes
    Diagnostic(String),
}

/// Decode a detection record.
///
/// Any JSON object with a `detection_method` key is a detection, whatever the
/// key's value type.
pub fn parse_detection(line: &str) -> Result<RawDetection, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::EmptyLine);
    }
    let map = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(DecodeError::NotJson("not an object".to_string())),
        Err(e) => return Err(DecodeError::NotJson(e.to_string())),
    };
    if !map.contains_key("detection_method") {
        return Err(DecodeError::MissingDetectionMethod);
    }
    Ok(RawDetection::from(map))
}

/// Classify a trimmed, non-empty line
pub fn classify_line(line: &str) -> DetectorLine {
    match parse_detection(line) {
        Ok(raw) => DetectorLine::Detection(raw),
        Err(e) => {
            tracing::trace!("Detector diagnostic ({}): {}", e, line);
            DetectorLine::Diagnostic(line.to_string())
        }
    }
}
