//! NMEA 0183 GGA decoding
//!
//! Framing and field parsing are done by the `nmea` crate; this module maps a
//! GGA sentence from any talker onto a [`GpsFix`]. Every other sentence type
//! is reported as unsupported. The trailing checksum is not verified.

use flockgate_core::{DecodeError, GpsFix};
use nmea::sentences::{parse_gga, FixType};
use nmea::{parse_nmea_sentence, SentenceType};

/// Minimum comma separated fields in a GGA sentence, address field included
pub const GGA_MIN_FIELDS: usize = 15;

/// Decode a GGA sentence from any talker (`$GPGGA`, `$GNGGA`, ...)
pub fn parse_fix(sentence: &str) -> Result<GpsFix, DecodeError> {
    let sentence = sentence.trim();
    if sentence.is_empty() {
        return Err(DecodeError::EmptyLine);
    }

    // Reframe with a placeholder checksum so sentences sent without one parse too
    let body = sentence.split('*').next().unwrap_or(sentence);
    let framed = format!("{}*00", body);
    let parsed = parse_nmea_sentence(&framed).map_err(malformed)?;

    if parsed.message_id != SentenceType::GGA {
        return Err(DecodeError::UnsupportedSentence(format!(
            "{:?}",
            parsed.message_id
        )));
    }

    let fields = body.split(',').count();
    if fields < GGA_MIN_FIELDS {
        return Err(DecodeError::TooFewFields {
            expected: GGA_MIN_FIELDS,
            actual: fields,
        });
    }
    let timestamp = body.split(',').nth(1).unwrap_or_default().to_string();

    let gga = parse_gga(parsed).map_err(malformed)?;
    let latitude = gga.latitude.ok_or(DecodeError::MissingField("latitude"))?;
    let longitude = gga.longitude.ok_or(DecodeError::MissingField("longitude"))?;
    if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
        return Err(DecodeError::InvalidNumber {
            field: "position",
            value: format!("{},{}", latitude, longitude),
        });
    }

    let fix_type = gga.fix_type.ok_or(DecodeError::MissingField("fix_quality"))?;
    let satellites = gga
        .fix_satellites
        .ok_or(DecodeError::MissingField("satellites"))?;

    Ok(GpsFix {
        latitude,
        longitude,
        altitude: gga.altitude.map(f64::from).unwrap_or(0.0),
        fix_quality: fix_quality(fix_type),
        satellites,
        timestamp,
    })
}

/// Like [`parse_fix`], logging and discarding the reason on failure
pub fn decode_sentence(sentence: &str) -> Option<GpsFix> {
    match parse_fix(sentence) {
        Ok(fix) => Some(fix),
        Err(e) => {
            tracing::trace!("Ignoring NMEA line: {}", e);
            None
        }
    }
}

fn malformed(e: nmea::Error<'_>) -> DecodeError {
    DecodeError::Malformed(format!("{:?}", e))
}

/// GGA quality indicator digit
fn fix_quality(fix_type: FixType) -> u8 {
    match fix_type {
        FixType::Invalid => 0,
        FixType::Gps => 1,
        FixType::DGps => 2,
        FixType::Pps => 3,
        FixType::Rtk => 4,
        FixType::FloatRtk => 5,
        FixType::Estimated => 6,
        FixType::Manual => 7,
        FixType::Simulation => 8,
    }
}
