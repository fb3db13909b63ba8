//! Database repository layer
//!
//! Owns the connection and provides the read-side queries over the
//! aggregate tables. The write path lives in [`super::stats`], cleanup in
//! [`super::retention`] and consistency checks in [`super::integrity`].

use crate::error::{Error, Result};
use crate::keys::canonical_key;
use crate::types::*;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default bounded wait on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Database handle (single connection guarded by a mutex)
///
/// A handle is usable only after [`Database::migrate`] succeeds; every read
/// and write before that fails with [`Error::NotInitialized`].
pub struct Database {
    conn: Mutex<Connection>,
    initialized: AtomicBool,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create a database, waiting at most `busy_timeout` on locks
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let to_open_error = |source: rusqlite::Error| Error::Open {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(to_open_error)?;
        conn.busy_timeout(busy_timeout).map_err(to_open_error)?;

        // WAL keeps readers and the single writer from blocking each other
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;  -- 16MB cache
            ",
        )
        .map_err(to_open_error)?;

        tracing::debug!(path = %path.display(), ?busy_timeout, "Opened database");

        Ok(Self {
            conn: Mutex::new(conn),
            initialized: AtomicBool::new(false),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            initialized: AtomicBool::new(false),
            path: None,
        })
    }

    /// Run migrations on this database and mark it ready for use
    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.lock();
        super::schema::run_migrations(&mut conn)?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// True once migrations have completed on this handle
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// File backing this handle, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.ready()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the connection, failing fast if migrations have not run
    pub(crate) fn ready(&self) -> Result<MutexGuard<'_, Connection>> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        Ok(self.lock())
    }

    // ============================================
    // Daily aggregates
    // ============================================

    /// Get the daily aggregate for one date
    pub fn get_daily(&self, date: NaiveDate) -> Result<Option<DailyAggregate>> {
        let conn = self.ready()?;
        conn.query_row(
            r#"
            SELECT date, key_count, mouse_distance, left_clicks, right_clicks,
                   middle_clicks, scroll_distance
            FROM daily_aggregate WHERE date = ?1
            "#,
            [date_key(date)],
            Self::row_to_daily,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Daily rows in `[start, end]`, oldest first. Dates without a row are absent.
    pub fn daily_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyAggregate>> {
        let conn = self.ready()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT date, key_count, mouse_distance, left_clicks, right_clicks,
                   middle_clicks, scroll_distance
            FROM daily_aggregate
            WHERE date >= ?1 AND date <= ?2
            ORDER BY date ASC
            "#,
        )?;
        let rows = stmt.query_map(params![date_key(start), date_key(end)], Self::row_to_daily)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    /// Sum of all daily rows in `[start, end]`
    pub fn sum_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Counters> {
        let conn = self.ready()?;
        conn.query_row(
            r#"
            SELECT COALESCE(SUM(key_count), 0), COALESCE(SUM(mouse_distance), 0.0),
                   COALESCE(SUM(left_clicks), 0), COALESCE(SUM(right_clicks), 0),
                   COALESCE(SUM(middle_clicks), 0), COALESCE(SUM(scroll_distance), 0.0)
            FROM daily_aggregate
            WHERE date >= ?1 AND date <= ?2
            "#,
            params![date_key(start), date_key(end)],
            |row| Self::row_to_counters(row, 0),
        )
        .map_err(Error::from)
    }

    /// Sum over every daily row ever written, with the tracked period
    pub fn lifetime_totals(&self) -> Result<LifetimeTotals> {
        let conn = self.ready()?;
        conn.query_row(
            r#"
            SELECT COALESCE(SUM(key_count), 0), COALESCE(SUM(mouse_distance), 0.0),
                   COALESCE(SUM(left_clicks), 0), COALESCE(SUM(right_clicks), 0),
                   COALESCE(SUM(middle_clicks), 0), COALESCE(SUM(scroll_distance), 0.0),
                   MIN(date), MAX(date), COUNT(*)
            FROM daily_aggregate
            "#,
            [],
            |row| {
                let first: Option<String> = row.get(6)?;
                let last: Option<String> = row.get(7)?;
                Ok(LifetimeTotals {
                    totals: Self::row_to_counters(row, 0)?,
                    first_date: first.as_deref().and_then(parse_date_key),
                    last_date: last.as_deref().and_then(parse_date_key),
                    days_tracked: row.get(8)?,
                })
            },
        )
        .map_err(Error::from)
    }

    // ============================================
    // Hourly aggregates
    // ============================================

    /// Hourly rows that exist for a date, by hour
    pub fn hourly_rows(&self, date: NaiveDate) -> Result<Vec<HourlyAggregate>> {
        let conn = self.ready()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT date, hour, key_count, mouse_distance, left_clicks, right_clicks,
                   middle_clicks, scroll_distance
            FROM hourly_aggregate
            WHERE date = ?1
            ORDER BY hour ASC
            "#,
        )?;
        let rows = stmt.query_map([date_key(date)], Self::row_to_hourly)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    /// All 24 hours of a date; hours without a row are zero
    pub fn hourly_breakdown(&self, date: NaiveDate) -> Result<Vec<HourlyAggregate>> {
        let mut hours: Vec<HourlyAggregate> = (0..24)
            .map(|hour| HourlyAggregate {
                date,
                hour,
                totals: Counters::default(),
            })
            .collect();

        for row in self.hourly_rows(date)? {
            if let Some(slot) = hours.get_mut(row.hour as usize) {
                slot.totals = row.totals;
            }
        }

        Ok(hours)
    }

    // ============================================
    // Key counts
    // ============================================

    /// Summed count per key identifier over `[start, end]`
    pub fn key_counts(&self, start: NaiveDate, end: NaiveDate) -> Result<BTreeMap<String, i64>> {
        let conn = self.ready()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT key_identifier, SUM(count)
            FROM key_count
            WHERE date >= ?1 AND date <= ?2
            GROUP BY key_identifier
            "#,
        )?;
        let rows = stmt.query_map(params![date_key(start), date_key(end)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .map_err(Error::from)
    }

    /// Summed count for a single key over `[start, end]`; any spelling works
    pub fn key_total(&self, start: NaiveDate, end: NaiveDate, key: &str) -> Result<i64> {
        let key = canonical_key(key);
        let conn = self.ready()?;
        conn.query_row(
            r#"
            SELECT COALESCE(SUM(count), 0)
            FROM key_count
            WHERE date >= ?1 AND date <= ?2 AND key_identifier = ?3
            "#,
            params![date_key(start), date_key(end), key.as_ref()],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    /// The `limit` most pressed keys over `[start, end]`.
    ///
    /// Ordered by summed count descending; equal counts are ordered by key
    /// identifier ascending.
    pub fn top_keys(&self, start: NaiveDate, end: NaiveDate, limit: usize) -> Result<Vec<KeyTotal>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.ready()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT key_identifier, SUM(count) AS total
            FROM key_count
            WHERE date >= ?1 AND date <= ?2
            GROUP BY key_identifier
            HAVING total > 0
            ORDER BY total DESC, key_identifier ASC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![date_key(start), date_key(end), limit as i64],
            |row| {
                Ok(KeyTotal {
                    key: row.get(0)?,
                    count: row.get(1)?,
                })
            },
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    // ============================================
    // Application usage
    // ============================================

    /// The `limit` most used applications over `[start, end]`
    pub fn top_apps(&self, start: NaiveDate, end: NaiveDate, limit: usize) -> Result<Vec<AppTotal>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.ready()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT app_name, SUM(seconds_used) AS total
            FROM app_usage
            WHERE date >= ?1 AND date <= ?2
            GROUP BY app_name
            HAVING total > 0
            ORDER BY total DESC, app_name ASC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![date_key(start), date_key(end), limit as i64],
            |row| {
                Ok(AppTotal {
                    app: row.get(0)?,
                    seconds: row.get(1)?,
                })
            },
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    // ============================================
    // Store health
    // ============================================

    /// Highest applied migration version
    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.ready()?;
        super::schema::get_schema_version(&conn)
    }

    /// Get database file size in bytes (0 for in-memory stores)
    pub fn get_database_size(&self) -> Result<u64> {
        match &self.path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }

    /// Current journal mode (`wal` for file-backed stores)
    pub fn journal_mode(&self) -> Result<String> {
        let conn = self.ready()?;
        conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .map_err(Error::from)
    }

    /// Result of SQLite's own `PRAGMA integrity_check` (`"ok"` when healthy)
    pub fn sqlite_integrity_check(&self) -> Result<String> {
        let conn = self.ready()?;
        conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))
            .map_err(Error::from)
    }

    /// Number of rows in each aggregate table: (daily, hourly, key, app)
    pub fn row_counts(&self) -> Result<(i64, i64, i64, i64)> {
        let conn = self.ready()?;
        let count = |table: &str| -> rusqlite::Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };
        Ok((
            count("daily_aggregate")?,
            count("hourly_aggregate")?,
            count("key_count")?,
            count("app_usage")?,
        ))
    }

    // ============================================
    // Row mapping
    // ============================================

    pub(crate) fn row_to_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let s: String = row.get(idx)?;
        parse_date_key(&s).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("invalid date key: {s}").into(),
            )
        })
    }

    /// Read the six counter columns starting at `offset`
    pub(crate) fn row_to_counters(row: &Row, offset: usize) -> rusqlite::Result<Counters> {
        Ok(Counters {
            key_count: row.get(offset)?,
            mouse_distance: row.get(offset + 1)?,
            left_clicks: row.get(offset + 2)?,
            right_clicks: row.get(offset + 3)?,
            middle_clicks: row.get(offset + 4)?,
            scroll_distance: row.get(offset + 5)?,
        })
    }

    fn row_to_daily(row: &Row) -> rusqlite::Result<DailyAggregate> {
        Ok(DailyAggregate {
            date: Self::row_to_date(row, 0)?,
            totals: Self::row_to_counters(row, 1)?,
        })
    }

    fn row_to_hourly(row: &Row) -> rusqlite::Result<HourlyAggregate> {
        Ok(HourlyAggregate {
            date: Self::row_to_date(row, 0)?,
            hour: row.get(1)?,
            totals: Self::row_to_counters(row, 2)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date_key(s).unwrap()
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_queries_before_migrate_fail_fast() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.is_initialized());
        assert!(matches!(
            db.get_daily(date("2025-01-01")),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(db.lifetime_totals(), Err(Error::NotInitialized)));
        assert!(matches!(db.connection(), Err(Error::NotInitialized)));

        db.migrate().unwrap();
        assert!(db.is_initialized());
        assert!(db.get_daily(date("2025-01-01")).unwrap().is_none());
    }

    #[test]
    fn test_empty_store_reads() {
        let db = test_db();
        let start = date("2025-01-01");
        let end = date("2025-01-31");

        assert!(db.daily_range(start, end).unwrap().is_empty());
        assert_eq!(db.sum_range(start, end).unwrap(), Counters::default());
        assert!(db.key_counts(start, end).unwrap().is_empty());
        assert!(db.top_keys(start, end, 10).unwrap().is_empty());

        let lifetime = db.lifetime_totals().unwrap();
        assert_eq!(lifetime.days_tracked, 0);
        assert!(lifetime.first_date.is_none());
        assert!(lifetime.last_date.is_none());
    }

    #[test]
    fn test_hourly_breakdown_is_zero_filled() {
        let db = test_db();
        let day = date("2025-01-01");
        db.increment(day, 10, &Counters::keys(5)).unwrap();

        let hours = db.hourly_breakdown(day).unwrap();
        assert_eq!(hours.len(), 24);
        assert_eq!(hours[10].totals.key_count, 5);
        assert_eq!(hours[9].totals, Counters::default());
        assert!(hours.iter().enumerate().all(|(i, h)| h.hour as usize == i));
    }

    #[test]
    fn test_row_counts_and_health() {
        let db = test_db();
        db.increment(date("2025-01-01"), 1, &Counters::keys(1)).unwrap();
        db.increment_key(date("2025-01-01"), 1, "KeyA", 1).unwrap();

        assert_eq!(db.row_counts().unwrap(), (1, 1, 1, 0));
        assert_eq!(db.sqlite_integrity_check().unwrap(), "ok");
        assert_eq!(db.get_database_size().unwrap(), 0);
    }
}
