//! OUI text parsing
//!
//! Understands three line shapes:
//!
//! ```text
//! 28-6F-B9   (hex)		Nokia Shanghai Bell Co., Ltd.
//! 286FB9     (base 16)		Nokia Shanghai Bell Co., Ltd.
//! 286FB9	Nokia Shanghai Bell Co., Ltd.
//! ```
//!
//! The last one is what [`crate::ManufacturerTable::save_to_file`] writes.
//! Anything else, including `#` comments and address-block lines, is skipped.

use serde::{Deserialize, Serialize};

/// One prefix/manufacturer pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OuiEntry {
    /// Six uppercase hex digits
    #[serde(rename = "mac")]
    pub prefix: String,
    pub manufacturer: String,
}

/// Strip separators and uppercase; `Some` only for exactly six hex digits
pub fn normalize_prefix(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '-' | ':' | '.' | ' ' | '\t'))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (cleaned.len() == 6 && cleaned.chars().all(|c| c.is_ascii_hexdigit())).then_some(cleaned)
}

/// Parse a single line in any of the supported shapes
pub fn parse_line(line: &str) -> Option<OuiEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (prefix, manufacturer) = if let Some((prefix, name)) = line.split_once("(hex)") {
        (prefix, name)
    } else if let Some((prefix, name)) = line.split_once("(base 16)") {
        (prefix, name)
    } else {
        let mut parts = line.split('\t').map(str::trim).filter(|p| !p.is_empty());
        let prefix = parts.next()?;
        let name = parts.last().unwrap_or_default();
        (prefix, name)
    };

    let manufacturer = manufacturer.trim();
    if manufacturer.is_empty() {
        return None;
    }
    Some(OuiEntry {
        prefix: normalize_prefix(prefix)?,
        manufacturer: manufacturer.to_string(),
    })
}

/// Parse a whole OUI document, skipping unrecognised lines
pub fn parse_oui_text(text: &str) -> Vec<OuiEntry> {
    text.lines().filter_map(parse_line).collect()
}
