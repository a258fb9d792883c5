//! MAC prefix to manufacturer table
//!
//! The table is held behind an `Arc` snapshot. Readers clone the `Arc` and
//! work on an immutable map; [`ManufacturerTable::replace_all`] builds a new
//! map off to the side and swaps it in one step.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DeviceError, DeviceResult};
use crate::oui::{normalize_prefix, parse_oui_text, OuiEntry};

/// Returned by [`ManufacturerTable::lookup`] when no entry matches
pub const UNKNOWN_MANUFACTURER: &str = "Unknown Manufacturer";

/// Maximum results of a name search
pub const SEARCH_LIMIT: usize = 100;

/// Public IEEE MA-L registry
pub const IEEE_OUI_URL: &str = "https://standards-oui.ieee.org/oui/oui.txt";

type Entries = BTreeMap<String, String>;

/// Thread-safe manufacturer lookup table
#[derive(Debug, Default)]
pub struct ManufacturerTable {
    entries: RwLock<Arc<Entries>>,
}

impl ManufacturerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from parsed entries
    pub fn from_entries(entries: impl IntoIterator<Item = OuiEntry>) -> Self {
        let table = Self::new();
        table.replace_all(entries);
        table
    }

    /// Parse OUI text into a new table
    pub fn from_oui_text(text: &str) -> Self {
        Self::from_entries(parse_oui_text(text))
    }

    /// Load a table from an OUI file, replacing the current contents
    ///
    /// Returns the number of entries loaded.
    pub fn load_file(&self, path: &Path) -> DeviceResult<usize> {
        let bytes = std::fs::read(path)
            .map_err(|e| DeviceError::LoadError(format!("{}: {}", path.display(), e)))?;
        let text = String::from_utf8_lossy(&bytes);
        let count = self.replace_all(parse_oui_text(&text));
        tracing::info!("Loaded {} OUI entries from {}", count, path.display());
        Ok(count)
    }

    /// Manufacturer for a MAC address, or [`UNKNOWN_MANUFACTURER`]
    pub fn lookup(&self, mac_address: &str) -> String {
        let prefix: String = mac_address
            .chars()
            .filter(char::is_ascii_hexdigit)
            .take(6)
            .collect();
        let snapshot = self.snapshot();
        normalize_prefix(&prefix)
            .and_then(|p| snapshot.get(&p).cloned())
            .unwrap_or_else(|| UNKNOWN_MANUFACTURER.to_string())
    }

    /// Exact match on a six hex digit prefix
    pub fn search_by_prefix(&self, prefix: &str) -> Option<OuiEntry> {
        let prefix = normalize_prefix(prefix)?;
        self.snapshot().get(&prefix).map(|manufacturer| OuiEntry {
            prefix,
            manufacturer: manufacturer.clone(),
        })
    }

    /// Case-insensitive substring match on the manufacturer name
    pub fn search_by_name(&self, query: &str) -> Vec<OuiEntry> {
        let needle = query.to_lowercase();
        self.snapshot()
            .iter()
            .filter(|(_, name)| name.to_lowercase().contains(&needle))
            .take(SEARCH_LIMIT)
            .map(|(prefix, name)| OuiEntry {
                prefix: prefix.clone(),
                manufacturer: name.clone(),
            })
            .collect()
    }

    /// Search by prefix when the query starts with six hex digits, by name otherwise
    pub fn search(&self, query: &str) -> Vec<OuiEntry> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let cleaned: String = query
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();
        let head: String = cleaned.chars().take(6).collect();
        if head.len() == 6 && head.chars().all(|c| c.is_ascii_hexdigit()) {
            self.search_by_prefix(&head).into_iter().collect()
        } else {
            self.search_by_name(query)
        }
    }

    /// All entries ordered by prefix
    pub fn entries(&self) -> Vec<OuiEntry> {
        self.snapshot()
            .iter()
            .map(|(prefix, name)| OuiEntry {
                prefix: prefix.clone(),
                manufacturer: name.clone(),
            })
            .collect()
    }

    /// Atomically swap in a new set of entries
    ///
    /// Entries with an invalid prefix are skipped; on duplicates the later
    /// entry wins. Returns the new entry count.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = OuiEntry>) -> usize {
        let mut fresh = Entries::new();
        for entry in entries {
            match normalize_prefix(&entry.prefix) {
                Some(prefix) => {
                    fresh.insert(prefix, entry.manufacturer);
                }
                None => tracing::debug!("Skipping OUI entry with bad prefix {:?}", entry.prefix),
            }
        }
        let count = fresh.len();
        *self.entries.write() = Arc::new(fresh);
        count
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the table as `PREFIX<TAB>Manufacturer` lines
    pub fn save_to_file(&self, path: &Path) -> DeviceResult<()> {
        let snapshot = self.snapshot();
        let mut file = std::fs::File::create(path)
            .map_err(|e| DeviceError::SaveError(format!("{}: {}", path.display(), e)))?;
        for (prefix, name) in snapshot.iter() {
            writeln!(file, "{}\t{}", prefix, name)?;
        }
        file.flush()?;
        tracing::debug!("Saved {} OUI entries to {}", snapshot.len(), path.display());
        Ok(())
    }

    /// Download a fresh registry and swap it in
    ///
    /// The current table is kept when the download fails or parses to
    /// nothing. Returns the new entry count.
    pub async fn refresh_from_url(&self, url: &str) -> DeviceResult<usize> {
        tracing::info!("Downloading OUI database from {}", url);

        let client = reqwest::Client::builder()
            .user_agent(concat!("flockgate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()?;

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DeviceError::Download(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let body = response.bytes().await?;
        let entries = parse_oui_text(&String::from_utf8_lossy(&body));
        if entries.is_empty() {
            return Err(DeviceError::EmptyTable(url.to_string()));
        }

        let count = self.replace_all(entries);
        tracing::info!("Refreshed OUI database with {} entries", count);
        Ok(count)
    }

    fn snapshot(&self) -> Arc<Entries> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> ManufacturerTable {
        ManufacturerTable::from_oui_text("AABBCC\tAcme\n001122\tGlobex Corporation\n")
    }

    #[test]
    fn test_lookup_known_prefix() {
        assert_eq!(acme().lookup("aa:bb:cc:11:22:33"), "Acme");
        assert_eq!(acme().lookup("AA-BB-CC-11-22-33"), "Acme");
        assert_eq!(acme().lookup("aabbcc112233"), "Acme");
        assert_eq!(acme().lookup("aabb.cc11.2233"), "Acme");
        assert_eq!(acme().lookup(" AA BB CC 11 22 33 "), "Acme");
    }

    #[test]
    fn test_lookup_never_fails() {
        let empty = ManufacturerTable::new();
        assert_eq!(empty.lookup("aa:bb:cc:11:22:33"), UNKNOWN_MANUFACTURER);
        assert_eq!(acme().lookup(""), UNKNOWN_MANUFACTURER);
        assert_eq!(acme().lookup("aa:bb"), UNKNOWN_MANUFACTURER);
        assert_eq!(acme().lookup("zz:zz:zz:00:00:00"), UNKNOWN_MANUFACTURER);
    }

    #[test]
    fn test_search_dispatch() {
        let table = acme();
        let by_prefix = table.search("aa:bb:cc");
        assert_eq!(by_prefix.len(), 1);
        assert_eq!(by_prefix[0].manufacturer, "Acme");

        let by_name = table.search("globex");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].prefix, "001122");

        assert!(table.search("   ").is_empty());
        assert!(table.search("FFFFFF").is_empty());
    }

    #[test]
    fn test_search_by_name_is_capped() {
        let entries = (0..250).map(|i| OuiEntry {
            prefix: format!("{:06X}", i),
            manufacturer: "Acme Widgets".to_string(),
        });
        let table = ManufacturerTable::from_entries(entries);
        assert_eq!(table.search_by_name("acme").len(), SEARCH_LIMIT);
    }

    #[test]
    fn test_replace_all_swaps_contents() {
        let table = acme();
        let count = table.replace_all(vec![OuiEntry {
            prefix: "dd-ee-ff".to_string(),
            manufacturer: "Initech".to_string(),
        }]);
        assert_eq!(count, 1);
        assert_eq!(table.lookup("DD:EE:FF:00:00:00"), "Initech");
        assert_eq!(table.lookup("AA:BB:CC:00:00:00"), UNKNOWN_MANUFACTURER);
    }
}
