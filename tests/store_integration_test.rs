//! Integration tests for the SQLite record store on disk

use chrono::{Duration, TimeZone, Utc};
use rusty_fxlens::currency::CurrencyGroup;
use rusty_fxlens::error::FxLensError;
use rusty_fxlens::record::{CurrencyRecord, HistRatios, SpotObservation};
use rusty_fxlens::store::{RecordStore, SqliteStore};
use tempfile::TempDir;

fn jpy_record(hour: u32, policy_rate: Option<f64>) -> CurrencyRecord {
    let fetched_at = Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap();
    let day = Utc.with_ymd_and_hms(2024, 6, 28, 0, 0, 0).unwrap();
    CurrencyRecord {
        currency_code: "JPY".to_string(),
        name: "Japanese Yen".to_string(),
        group: CurrencyGroup::G10,
        policy_rate,
        usd_rate: Some(5.25),
        spot: Some(161.25),
        spot_history: vec![
            SpotObservation::new(day - Duration::days(2), 160.5),
            SpotObservation::new(day - Duration::days(1), 160.75),
            SpotObservation::new(day, 161.25),
        ],
        carry: policy_rate.map(|r| r - 5.25),
        realised_vol: Some(0.091),
        carry_vol_ratio: policy_rate.map(|r| (r - 5.25) / 9.1),
        stale_feed: false,
        hist_ratios: HistRatios::new(-0.43, -0.36, -0.26, -0.19),
        ratio_table_version: "2025-01-curated".to_string(),
        fetched_at,
        is_pegged: false,
    }
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fx_data.db");

    {
        let store = SqliteStore::new(&path).unwrap();
        store.upsert(&jpy_record(6, Some(0.1))).unwrap();
        store.upsert(&jpy_record(12, Some(0.25))).unwrap();
    }

    let store = SqliteStore::new(&path).unwrap();
    let latest = store.get_latest("JPY").unwrap();
    assert_eq!(latest, jpy_record(12, Some(0.25)));
    assert_eq!(store.get_history("JPY", 10).unwrap().len(), 2);
    assert_eq!(store.get_spot_archive("JPY").unwrap().len(), 3);
}

#[test]
fn test_read_only_open_sees_writes_and_refuses_upserts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fx_data.db");

    let writer = SqliteStore::new(&path).unwrap();
    writer.upsert(&jpy_record(6, Some(0.1))).unwrap();

    let reader = SqliteStore::open_read_only(&path).unwrap();
    assert_eq!(reader.get_all().unwrap().len(), 1);

    writer.upsert(&jpy_record(12, None)).unwrap();
    let latest = reader.get_latest("JPY").unwrap();
    assert_eq!(latest.policy_rate, None);
    assert_eq!(latest.carry, None);

    let err = reader.upsert(&jpy_record(18, Some(0.1))).unwrap_err();
    assert!(matches!(err, FxLensError::StoreWriteError { .. }));
    assert_eq!(writer.get_history("JPY", 10).unwrap().len(), 2);
}

#[test]
fn test_read_only_open_of_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let result = SqliteStore::open_read_only(&dir.path().join("absent.db"));
    assert!(matches!(result, Err(FxLensError::StorageError(_))));
}

#[test]
fn test_repeated_upsert_is_idempotent_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::new(&dir.path().join("fx_data.db")).unwrap();
    let record = jpy_record(6, Some(0.1));

    for _ in 0..3 {
        store.upsert(&record).unwrap();
    }

    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.snapshot_count().unwrap(), 1);
    assert_eq!(store.get_spot_archive("JPY").unwrap().len(), 3);
    assert_eq!(store.get_latest("JPY").unwrap(), record);
}

#[test]
fn test_history_limit_and_order() {
    let store = SqliteStore::new_in_memory().unwrap();
    for hour in [0, 6, 12, 18] {
        store.upsert(&jpy_record(hour, Some(0.1))).unwrap();
    }

    let history = store.get_history("JPY", 2).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].fetched_at, Utc.with_ymd_and_hms(2024, 7, 1, 18, 0, 0).unwrap());
    assert_eq!(history[1].fetched_at, Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap());
    assert!(store.get_history("EUR", 5).unwrap().is_empty());
}
