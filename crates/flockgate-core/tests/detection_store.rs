//! Integration tests for the detection store merge and id semantics

use chrono::Utc;
use flockgate_core::{DetectionStore, Enrichment, GpsFix, RawDetection, StoreError};
use proptest::prelude::*;

fn enrich(manufacturer: Option<&str>) -> Enrichment {
    Enrichment::capture(None, manufacturer.map(str::to_string), Utc::now())
}

fn fix(lat: f64, lon: f64) -> GpsFix {
    GpsFix {
        latitude: lat,
        longitude: lon,
        altitude: 3.5,
        fix_quality: 1,
        satellites: 9,
        timestamp: "120000".to_string(),
    }
}

#[test]
fn test_same_mac_merges_into_one_record() {
    let store = DetectionStore::new();
    let first = store.ingest(
        RawDetection::with_mac("AA:BB:CC:11:22:33", "probe_request"),
        enrich(Some("Acme")),
    );
    let second = store.ingest(
        RawDetection::with_mac("AA:BB:CC:11:22:33", "probe_request"),
        enrich(Some("Acme")),
    );

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(store.len(), 1);

    let record = store.find_by_mac("AA:BB:CC:11:22:33").unwrap();
    assert_eq!(record.id, first.record.id);
    assert_eq!(record.detection_count, 2);
    assert_eq!(record.manufacturer.as_deref(), Some("Acme"));
    assert!(record.last_seen >= record.first_seen);
}

#[test]
fn test_different_macs_get_increasing_ids() {
    let store = DetectionStore::new();
    let a = store.ingest(RawDetection::with_mac("00:00:00:00:00:0A", "beacon"), enrich(None));
    let b = store.ingest(RawDetection::with_mac("00:00:00:00:00:0B", "beacon"), enrich(None));
    assert_eq!(a.record.id, 1);
    assert_eq!(b.record.id, 2);

    let ids: Vec<u64> = store.list_all(None).iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_clear_restarts_ids() {
    let store = DetectionStore::new();
    store.ingest(RawDetection::with_mac("00:00:00:00:00:0A", "beacon"), enrich(None));
    store.ingest(RawDetection::with_mac("00:00:00:00:00:0B", "beacon"), enrich(None));
    assert_eq!(store.clear(), 2);
    assert!(store.is_empty());

    let out = store.ingest(RawDetection::with_mac("00:00:00:00:00:0C", "beacon"), enrich(None));
    assert_eq!(out.record.id, 1);
}

#[test]
fn test_list_filters_by_method() {
    let store = DetectionStore::new();
    store.ingest(RawDetection::with_mac("00:00:00:00:00:01", "beacon"), enrich(None));
    store.ingest(RawDetection::with_mac("00:00:00:00:00:02", "probe_request"), enrich(None));
    store.ingest(RawDetection::with_mac("00:00:00:00:00:03", "beacon"), enrich(None));

    let beacons = store.list_all(Some("beacon"));
    assert_eq!(beacons.len(), 2);
    assert!(beacons.iter().all(|r| r.detection_method.as_deref() == Some("beacon")));
    assert!(store.list_all(Some("nothing")).is_empty());
}

#[test]
fn test_gps_replaced_wholesale_only_when_new_fix() {
    let store = DetectionStore::new();
    let mac = "00:00:00:00:00:01";

    let with_fix = |f: &GpsFix| Enrichment::capture(Some(f), None, Utc::now());
    store.ingest(RawDetection::with_mac(mac, "beacon"), with_fix(&fix(1.0, 2.0)));
    store.ingest(RawDetection::with_mac(mac, "beacon"), enrich(None));
    assert_eq!(store.find_by_mac(mac).unwrap().coordinates(), Some((1.0, 2.0)));

    store.ingest(RawDetection::with_mac(mac, "beacon"), with_fix(&fix(5.0, 6.0)));
    assert_eq!(store.find_by_mac(mac).unwrap().coordinates(), Some((5.0, 6.0)));
}

#[test]
fn test_alias_survives_merge() {
    let store = DetectionStore::new();
    let out = store.ingest(RawDetection::with_mac("00:00:00:00:00:01", "beacon"), enrich(None));
    store.set_alias(out.record.id, "gate camera").unwrap();
    store.ingest(RawDetection::with_mac("00:00:00:00:00:01", "beacon"), enrich(None));
    assert_eq!(store.get(out.record.id).unwrap().alias, "gate camera");
    assert_eq!(store.set_alias(99, "x"), Err(StoreError::NotFound { id: 99 }));
}

#[test]
fn test_record_serializes_extra_fields_flat() {
    let store = DetectionStore::new();
    let raw = RawDetection::from_json_str(
        r#"{"mac_address":"00:00:00:00:00:01","detection_method":"beacon","threat_score":90}"#,
    )
    .unwrap();
    let out = store.ingest(raw, enrich(None));
    let json = serde_json::to_value(&out.record).unwrap();
    assert_eq!(json["threat_score"], 90);
    assert_eq!(json["detection_count"], 1);
    assert_eq!(json["id"], 1);
}

proptest! {
    #[test]
    fn prop_repeated_mac_counts_every_ingest(n in 1usize..40) {
        let store = DetectionStore::new();
        for _ in 0..n {
            store.ingest(RawDetection::with_mac("DE:AD:BE:EF:00:01", "beacon"), enrich(None));
        }
        let all = store.list_all(None);
        prop_assert_eq!(all.len(), 1);
        prop_assert_eq!(all[0].id, 1);
        prop_assert_eq!(all[0].detection_count, n as u64);
    }

    #[test]
    fn prop_distinct_macs_get_unique_ascending_ids(
        macs in proptest::collection::btree_set("[0-9A-F]{12}", 1..30)
    ) {
        let store = DetectionStore::new();
        for mac in &macs {
            store.ingest(RawDetection::with_mac(mac.as_str(), "beacon"), enrich(None));
        }
        let ids: Vec<u64> = store.list_all(None).iter().map(|r| r.id).collect();
        let expected: Vec<u64> = (1..=macs.len() as u64).collect();
        prop_assert_eq!(ids, expected);
    }
}
