//! Detection store
//!
//! Keeps detections in insertion order, keyed by MAC address. Every mutation
//! happens under a single mutex so readers never observe a half merged
//! record, and the id counter is only ever touched by the store.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::detection::{DetectionRecord, Enrichment, RawDetection};
use crate::error::StoreError;

/// Result of an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// The record after the upsert
    pub record: DetectionRecord,
    /// `true` when a new record was created, `false` on merge
    pub created: bool,
}

#[derive(Debug)]
struct StoreInner {
    records: Vec<DetectionRecord>,
    /// MAC address -> position in `records`
    by_mac: HashMap<String, usize>,
    next_id: u64,
}

impl Default for StoreInner {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            by_mac: HashMap::new(),
            next_id: 1,
        }
    }
}

/// Ordered, deduplicating collection of detection records
#[derive(Debug, Default)]
pub struct DetectionStore {
    inner: Mutex<StoreInner>,
}

impl DetectionStore {
    /// Create an empty store; the first record gets id 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record or merge into the one sharing its MAC address.
    ///
    /// Records without a MAC address never merge.
    pub fn ingest(&self, raw: RawDetection, enrichment: Enrichment) -> IngestOutcome {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let existing = raw
            .mac_address
            .as_ref()
            .and_then(|mac| inner.by_mac.get(mac).copied());

        if let Some(index) = existing {
            let record = &mut inner.records[index];
            record.merge(raw, enrichment, now);
            tracing::debug!(
                "Updated detection: MAC {:?}, count {}, method {:?}",
                record.mac_address,
                record.detection_count,
                record.detection_method
            );
            return IngestOutcome {
                record: record.clone(),
                created: false,
            };
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let record = DetectionRecord::create(id, raw, enrichment, now);
        if let Some(mac) = &record.mac_address {
            let index = inner.records.len();
            inner.by_mac.insert(mac.clone(), index);
        }
        inner.records.push(record.clone());
        tracing::debug!(
            "New detection: id {}, method {:?}, MAC {:?}",
            record.id,
            record.detection_method,
            record.mac_address
        );

        IngestOutcome {
            record,
            created: true,
        }
    }

    /// All records in insertion order, optionally limited to one detection method
    pub fn list_all(&self, detection_method: Option<&str>) -> Vec<DetectionRecord> {
        let inner = self.inner.lock();
        match detection_method {
            Some(method) => inner
                .records
                .iter()
                .filter(|r| r.detection_method.as_deref() == Some(method))
                .cloned()
                .collect(),
            None => inner.records.clone(),
        }
    }

    /// Look up a record by id
    pub fn get(&self, id: u64) -> Option<DetectionRecord> {
        self.inner.lock().records.iter().find(|r| r.id == id).cloned()
    }

    /// Look up a record by MAC address
    pub fn find_by_mac(&self, mac: &str) -> Option<DetectionRecord> {
        let inner = self.inner.lock();
        inner
            .by_mac
            .get(mac)
            .map(|&index| inner.records[index].clone())
    }

    /// Set the user label of a record; the alias is trimmed
    pub fn set_alias(&self, id: u64, alias: &str) -> Result<DetectionRecord, StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound { id })?;
        record.alias = alias.trim().to_string();
        Ok(record.clone())
    }

    /// Remove every record and restart ids at 1
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.records.len();
        *inner = StoreInner::default();
        removed
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Enrichment {
        Enrichment::capture(None, None, Utc::now())
    }

    #[test]
    fn test_ids_start_at_one() {
        let store = DetectionStore::new();
        let out = store.ingest(RawDetection::with_mac("00:00:00:00:00:01", "beacon"), plain());
        assert!(out.created);
        assert_eq!(out.record.id, 1);
    }

    #[test]
    fn test_records_without_mac_never_merge() {
        let store = DetectionStore::new();
        let mut raw = RawDetection::default();
        raw.detection_method = Some("raven_service_uuid".to_string());
        store.ingest(raw.clone(), plain());
        store.ingest(raw, plain());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_set_alias_unknown_id() {
        let store = DetectionStore::new();
        assert_eq!(
            store.set_alias(7, "x"),
            Err(StoreError::NotFound { id: 7 })
        );
    }

    #[test]
    fn test_set_alias_trims() {
        let store = DetectionStore::new();
        let out = store.ingest(RawDetection::with_mac("00:00:00:00:00:01", "beacon"), plain());
        let updated = store.set_alias(out.record.id, "  parking lot cam ").unwrap();
        assert_eq!(updated.alias, "parking lot cam");
        assert_eq!(store.get(out.record.id).unwrap().alias, "parking lot cam");
    }

    #[test]
    fn test_clear_resets_index() {
        let store = DetectionStore::new();
        store.ingest(RawDetection::with_mac("00:00:00:00:00:01", "beacon"), plain());
        assert_eq!(store.clear(), 1);
        assert!(store.find_by_mac("00:00:00:00:00:01").is_none());
        let out = store.ingest(RawDetection::with_mac("00:00:00:00:00:01", "beacon"), plain());
        assert!(out.created);
        assert_eq!(out.record.detection_count, 1);
    }
}
