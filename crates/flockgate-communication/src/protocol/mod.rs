//! Line decoders for the two device protocols
//!
//! - [`nmea`]: GGA fix-data sentences from the GPS receiver
//! - [`detection_line`]: JSON-lines output of the detector firmware

pub mod detection_line;
pub mod nmea;

pub use detection_line::{classify_line, parse_detection, DetectorLine};
pub use nmea::{decode_sentence, parse_fix};
