//! Record store with SQLite backend
//!
//! Three tables:
//! - `fx_latest`: one row per currency, replaced on every successful cycle
//! - `fx_snapshots`: append-only history, unique on (code, fetched_at)
//! - `spot_history`: archive of daily closes, unique on (date, code)
//!
//! Each upsert writes all three in one transaction, so a reader sees either
//! the previous record or the new one, never a mix. File databases run in WAL
//! mode so readers in other processes don't block a cycle's writes.

use crate::currency::CurrencyGroup;
use crate::error::{FxLensError, Result};
use crate::record::{CurrencyRecord, HistRatios, SpotObservation};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Storage contract shared by the fetch cycle and read-only consumers
pub trait RecordStore: Send + Sync {
    /// Replace the latest record for `record.currency_code`
    fn upsert(&self, record: &CurrencyRecord) -> Result<()>;

    /// Latest record for a currency, or `NotFound`
    fn get_latest(&self, currency_code: &str) -> Result<CurrencyRecord>;

    /// Latest record of every stored currency
    fn get_all(&self) -> Result<Vec<CurrencyRecord>>;
}

const RECORD_COLUMNS: &str = "code, name, grp, is_pegged, policy_rate, usd_rate, spot, carry, \
     realised_vol, carry_vol_ratio, stale_feed, hist_1y, hist_3y, hist_5y, hist_10y, \
     ratio_version, spot_history, fetched_at";

const RECORD_PLACEHOLDERS: &str =
    "?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18";

/// SQLite-backed record store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open database at path
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| FxLensError::StorageError(format!("Failed to open database: {}", e)))?;

        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| FxLensError::StorageError(format!("Failed to set busy timeout: {}", e)))?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| FxLensError::StorageError(format!("Failed to enable WAL: {}", e)))?;
        log::debug!("Opened {} (journal_mode={})", db_path.display(), mode);

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    /// Open an existing database without write access (presentation side)
    pub fn open_read_only(db_path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| FxLensError::StorageError(format!("Failed to open database: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            FxLensError::StorageError(format!("Failed to create in-memory database: {}", e))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FxLensError::StorageError("Connection mutex poisoned".to_string()))
    }

    /// Create database tables
    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;
        let columns = "code TEXT NOT NULL,
                name TEXT NOT NULL,
                grp TEXT NOT NULL,
                is_pegged INTEGER NOT NULL,
                policy_rate REAL,
                usd_rate REAL,
                spot REAL,
                carry REAL,
                realised_vol REAL,
                carry_vol_ratio REAL,
                stale_feed INTEGER NOT NULL,
                hist_1y REAL,
                hist_3y REAL,
                hist_5y REAL,
                hist_10y REAL,
                ratio_version TEXT NOT NULL,
                spot_history TEXT NOT NULL,
                fetched_at TEXT NOT NULL";

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS fx_latest (
                {columns},
                PRIMARY KEY (code)
            );
            CREATE TABLE IF NOT EXISTS fx_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {columns},
                UNIQUE (code, fetched_at)
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_code ON fx_snapshots(code, fetched_at);
            CREATE TABLE IF NOT EXISTS spot_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                code TEXT NOT NULL,
                spot REAL NOT NULL,
                UNIQUE (date, code)
            );",
            columns = columns
        ))
        .map_err(|e| FxLensError::StorageError(format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    /// Snapshots for a currency, newest first
    pub fn get_history(&self, currency_code: &str, limit: usize) -> Result<Vec<CurrencyRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM fx_snapshots WHERE code = ?1 ORDER BY fetched_at DESC LIMIT ?2",
                RECORD_COLUMNS
            ))
            .map_err(|e| FxLensError::StorageError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![currency_code, limit as i64], StoredRow::from_row)
            .map_err(|e| FxLensError::StorageError(format!("Failed to query snapshots: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| FxLensError::StorageError(format!("Failed to collect snapshots: {}", e)))?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }

    /// Archived daily closes for a currency, oldest first
    pub fn get_spot_archive(&self, currency_code: &str) -> Result<Vec<SpotObservation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT date, spot FROM spot_history WHERE code = ?1 ORDER BY date")
            .map_err(|e| FxLensError::StorageError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![currency_code], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(|e| FxLensError::StorageError(format!("Failed to query spot history: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| FxLensError::StorageError(format!("Failed to collect spot history: {}", e)))?;

        rows.into_iter()
            .map(|(date, price)| {
                let timestamp = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|e| FxLensError::StorageError(format!("Bad stored date {}: {}", date, e)))?
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| FxLensError::StorageError("Invalid time".to_string()))?;
                Ok(SpotObservation::new(
                    DateTime::from_naive_utc_and_offset(timestamp, Utc),
                    price,
                ))
            })
            .collect()
    }

    /// Number of currencies with a latest record
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fx_latest", [], |row| row.get(0))
            .map_err(|e| FxLensError::StorageError(format!("Failed to count records: {}", e)))?;
        Ok(count as usize)
    }

    /// Number of snapshot rows across all currencies
    pub fn snapshot_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fx_snapshots", [], |row| row.get(0))
            .map_err(|e| FxLensError::StorageError(format!("Failed to count snapshots: {}", e)))?;
        Ok(count as usize)
    }

    fn write_record(conn: &mut Connection, record: &CurrencyRecord) -> rusqlite::Result<()> {
        let history_json = serde_json::to_string(&record.spot_history)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let ratios = &record.hist_ratios;
        let group = record.group.as_str();
        let values = params![
            &record.currency_code,
            &record.name,
            group,
            record.is_pegged,
            record.policy_rate,
            record.usd_rate,
            record.spot,
            record.carry,
            record.realised_vol,
            record.carry_vol_ratio,
            record.stale_feed,
            ratios.y1,
            ratios.y3,
            ratios.y5,
            ratios.y10,
            &record.ratio_table_version,
            &history_json,
            record.fetched_at,
        ];

        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO fx_latest ({}) VALUES ({})",
                RECORD_COLUMNS, RECORD_PLACEHOLDERS
            ),
            values,
        )?;
        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO fx_snapshots ({}) VALUES ({})",
                RECORD_COLUMNS, RECORD_PLACEHOLDERS
            ),
            values,
        )?;
        for obs in &record.spot_history {
            tx.execute(
                "INSERT OR IGNORE INTO spot_history (date, code, spot) VALUES (?1, ?2, ?3)",
                params![
                    obs.timestamp.date_naive().format("%Y-%m-%d").to_string(),
                    &record.currency_code,
                    obs.price
                ],
            )?;
        }
        tx.commit()
    }
}

impl RecordStore for SqliteStore {
    fn upsert(&self, record: &CurrencyRecord) -> Result<()> {
        let mut conn = self.lock().map_err(|e| FxLensError::StoreWriteError {
            currency: record.currency_code.clone(),
            message: e.to_string(),
        })?;

        Self::write_record(&mut conn, record).map_err(|e| FxLensError::StoreWriteError {
            currency: record.currency_code.clone(),
            message: e.to_string(),
        })
    }

    fn get_latest(&self, currency_code: &str) -> Result<CurrencyRecord> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM fx_latest WHERE code = ?1", RECORD_COLUMNS),
                params![currency_code],
                StoredRow::from_row,
            )
            .optional()
            .map_err(|e| FxLensError::StorageError(format!("Failed to get record: {}", e)))?;

        match row {
            Some(row) => row.into_record(),
            None => Err(FxLensError::NotFound(currency_code.to_string())),
        }
    }

    fn get_all(&self) -> Result<Vec<CurrencyRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM fx_latest ORDER BY code", RECORD_COLUMNS))
            .map_err(|e| FxLensError::StorageError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], StoredRow::from_row)
            .map_err(|e| FxLensError::StorageError(format!("Failed to query records: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| FxLensError::StorageError(format!("Failed to collect records: {}", e)))?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }
}

/// Raw column values, decoded into a record outside the rusqlite closure
struct StoredRow {
    code: String,
    name: String,
    group: String,
    is_pegged: bool,
    policy_rate: Option<f64>,
    usd_rate: Option<f64>,
    spot: Option<f64>,
    carry: Option<f64>,
    realised_vol: Option<f64>,
    carry_vol_ratio: Option<f64>,
    stale_feed: bool,
    hist: [Option<f64>; 4],
    ratio_version: String,
    spot_history: String,
    fetched_at: DateTime<Utc>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            name: row.get(1)?,
            group: row.get(2)?,
            is_pegged: row.get(3)?,
            policy_rate: row.get(4)?,
            usd_rate: row.get(5)?,
            spot: row.get(6)?,
            carry: row.get(7)?,
            realised_vol: row.get(8)?,
            carry_vol_ratio: row.get(9)?,
            stale_feed: row.get(10)?,
            hist: [row.get(11)?, row.get(12)?, row.get(13)?, row.get(14)?],
            ratio_version: row.get(15)?,
            spot_history: row.get(16)?,
            fetched_at: row.get(17)?,
        })
    }

    fn into_record(self) -> Result<CurrencyRecord> {
        let [y1, y3, y5, y10] = self.hist;
        Ok(CurrencyRecord {
            group: CurrencyGroup::from_str(&self.group)?,
            spot_history: serde_json::from_str(&self.spot_history)?,
            currency_code: self.code,
            name: self.name,
            policy_rate: self.policy_rate,
            usd_rate: self.usd_rate,
            spot: self.spot,
            carry: self.carry,
            realised_vol: self.realised_vol,
            carry_vol_ratio: self.carry_vol_ratio,
            stale_feed: self.stale_feed,
            hist_ratios: HistRatios { y1, y3, y5, y10 },
            ratio_table_version: self.ratio_version,
            fetched_at: self.fetched_at,
            is_pegged: self.is_pegged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_record;
    use chrono::{Duration as ChronoDuration, TimeZone};

    #[test]
    fn test_store_creation() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_and_get() {
        let store = SqliteStore::new_in_memory().unwrap();
        let record = sample_record("EUR");
        store.upsert(&record).unwrap();

        let loaded = store.get_latest("EUR").unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_missing_is_not_found() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(matches!(store.get_latest("EUR"), Err(FxLensError::NotFound(_))));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = SqliteStore::new_in_memory().unwrap();
        let record = sample_record("EUR");

        store.upsert(&record).unwrap();
        let once = (store.get_all().unwrap(), store.get_history("EUR", 10).unwrap());
        store.upsert(&record).unwrap();
        let twice = (store.get_all().unwrap(), store.get_history("EUR", 10).unwrap());

        assert_eq!(once, twice);
        assert_eq!(store.snapshot_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_latest_and_appends_history() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = sample_record("EUR");
        let mut second = sample_record("EUR");
        second.fetched_at = first.fetched_at + ChronoDuration::hours(6);
        second.policy_rate = Some(3.25);
        second.carry = Some(-2.0);

        store.upsert(&first).unwrap();
        store.upsert(&second).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get_latest("EUR").unwrap().policy_rate, Some(3.25));

        let history = store.get_history("EUR", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].fetched_at, second.fetched_at);
        assert_eq!(store.get_history("EUR", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_nulls_round_trip_as_nulls() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut record = sample_record("JPY");
        record.policy_rate = None;
        record.carry = None;
        record.carry_vol_ratio = None;
        record.hist_ratios.y3 = None;
        store.upsert(&record).unwrap();

        let loaded = store.get_latest("JPY").unwrap();
        assert_eq!(loaded.policy_rate, None);
        assert_eq!(loaded.carry, None);
        assert_eq!(loaded.hist_ratios.y3, None);
    }

    #[test]
    fn test_spot_archive_dedupes_dates() {
        let store = SqliteStore::new_in_memory().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let mut record = sample_record("EUR");
        record.spot_history = (0..3)
            .map(|i| SpotObservation::new(start + ChronoDuration::days(i), 0.92 + i as f64 * 0.001))
            .collect();
        store.upsert(&record).unwrap();

        let mut later = record.clone();
        later.fetched_at = record.fetched_at + ChronoDuration::days(1);
        later.spot_history = (1..5)
            .map(|i| SpotObservation::new(start + ChronoDuration::days(i), 0.92 + i as f64 * 0.001))
            .collect();
        store.upsert(&later).unwrap();

        let archive = store.get_spot_archive("EUR").unwrap();
        assert_eq!(archive.len(), 5);
        assert_eq!(archive[0].timestamp, start);
        let latest = store.get_latest("EUR").unwrap().spot_history;
        assert_eq!(latest.len(), 4);
        assert_eq!(latest[0].timestamp, later.spot_history[0].timestamp);
    }
}
