pub mod error;
pub mod oui;
pub mod table;

pub use error::{DeviceError, DeviceResult};
pub use oui::{normalize_prefix, parse_oui_text, OuiEntry};
pub use table::{ManufacturerTable, IEEE_OUI_URL, SEARCH_LIMIT, UNKNOWN_MANUFACTURER};
