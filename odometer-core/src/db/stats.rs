//! Atomic increments of the aggregate tables
//!
//! Every write is an additive upsert: a missing row is created at zero and
//! the delta added in the same statement. All rows touched by one call
//! commit together in a single `BEGIN IMMEDIATE` transaction, so concurrent
//! writers serialize on the write lock instead of losing updates. Counters
//! only grow: negative deltas and non-finite distances are rejected before
//! anything is written.

use super::repo::Database;
use crate::error::{Error, Result};
use crate::keys::canonical_key;
use crate::types::{date_key, Counters};
use chrono::NaiveDate;
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::BTreeMap;

const UPSERT_DAILY: &str = r#"
    INSERT INTO daily_aggregate (date, key_count, mouse_distance, left_clicks,
                                 right_clicks, middle_clicks, scroll_distance)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(date) DO UPDATE SET
        key_count = key_count + excluded.key_count,
        mouse_distance = mouse_distance + excluded.mouse_distance,
        left_clicks = left_clicks + excluded.left_clicks,
        right_clicks = right_clicks + excluded.right_clicks,
        middle_clicks = middle_clicks + excluded.middle_clicks,
        scroll_distance = scroll_distance + excluded.scroll_distance
"#;

const UPSERT_HOURLY: &str = r#"
    INSERT INTO hourly_aggregate (date, hour, key_count, mouse_distance, left_clicks,
                                  right_clicks, middle_clicks, scroll_distance)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(date, hour) DO UPDATE SET
        key_count = key_count + excluded.key_count,
        mouse_distance = mouse_distance + excluded.mouse_distance,
        left_clicks = left_clicks + excluded.left_clicks,
        right_clicks = right_clicks + excluded.right_clicks,
        middle_clicks = middle_clicks + excluded.middle_clicks,
        scroll_distance = scroll_distance + excluded.scroll_distance
"#;

const UPSERT_KEY: &str = r#"
    INSERT INTO key_count (date, hour, key_identifier, count)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(date, hour, key_identifier) DO UPDATE SET
        count = count + excluded.count
"#;

const UPSERT_APP: &str = r#"
    INSERT INTO app_usage (date, hour, app_name, seconds_used)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(date, hour, app_name) DO UPDATE SET
        seconds_used = seconds_used + excluded.seconds_used
"#;

/// Everything one `(date, hour)` bucket adds to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketDelta {
    pub totals: Counters,
    /// Presses per raw key identifier; canonicalized on write
    pub keys: BTreeMap<String, i64>,
    /// Foreground seconds per application
    pub apps: BTreeMap<String, i64>,
}

impl BucketDelta {
    /// True when writing this delta would change nothing.
    pub fn is_empty(&self) -> bool {
        self.totals.is_zero()
            && self.keys.values().all(|c| *c == 0)
            && self.apps.values().all(|s| *s == 0)
    }
}

fn check_hour(hour: u32) -> Result<()> {
    if hour > 23 {
        return Err(Error::InvalidHour(hour));
    }
    Ok(())
}

fn check_count(field: &'static str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(Error::InvalidDelta {
            field,
            value: value as f64,
        });
    }
    Ok(())
}

fn check_distance(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidDelta { field, value });
    }
    Ok(())
}

fn check_counters(delta: &Counters) -> Result<()> {
    check_count("key_count", delta.key_count)?;
    check_count("left_clicks", delta.left_clicks)?;
    check_count("right_clicks", delta.right_clicks)?;
    check_count("middle_clicks", delta.middle_clicks)?;
    check_distance("mouse_distance", delta.mouse_distance)?;
    check_distance("scroll_distance", delta.scroll_distance)
}

fn write_counters(
    conn: &Connection,
    date: &str,
    hour: u32,
    delta: &Counters,
) -> rusqlite::Result<()> {
    if delta.is_zero() {
        return Ok(());
    }
    conn.prepare_cached(UPSERT_DAILY)?.execute(params![
        date,
        delta.key_count,
        delta.mouse_distance,
        delta.left_clicks,
        delta.right_clicks,
        delta.middle_clicks,
        delta.scroll_distance,
    ])?;
    conn.prepare_cached(UPSERT_HOURLY)?.execute(params![
        date,
        hour,
        delta.key_count,
        delta.mouse_distance,
        delta.left_clicks,
        delta.right_clicks,
        delta.middle_clicks,
        delta.scroll_distance,
    ])?;
    Ok(())
}

fn write_keys<'k>(
    conn: &Connection,
    date: &str,
    hour: u32,
    keys: impl IntoIterator<Item = (&'k String, &'k i64)>,
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(UPSERT_KEY)?;
    for (raw, delta) in keys {
        let key = canonical_key(raw);
        if key.is_empty() || *delta == 0 {
            continue;
        }
        stmt.execute(params![date, hour, key.as_ref(), delta])?;
    }
    Ok(())
}

fn write_apps<'a>(
    conn: &Connection,
    date: &str,
    hour: u32,
    apps: impl IntoIterator<Item = (&'a String, &'a i64)>,
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(UPSERT_APP)?;
    for (app, seconds) in apps {
        let app = app.trim();
        if app.is_empty() || *seconds == 0 {
            continue;
        }
        stmt.execute(params![date, hour, app, seconds])?;
    }
    Ok(())
}

impl Database {
    /// Add `delta` to the daily row for `date` and the hourly row for
    /// `(date, hour)` in one transaction.
    ///
    /// Rows are created on first write. A zero delta is a no-op.
    pub fn increment(&self, date: NaiveDate, hour: u32, delta: &Counters) -> Result<()> {
        check_hour(hour)?;
        check_counters(delta)?;
        let mut conn = self.ready()?;
        if delta.is_zero() {
            return Ok(());
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_counters(&tx, &date_key(date), hour, delta)?;
        tx.commit()?;
        Ok(())
    }

    /// Write a whole bucket (aggregates, keys and applications) in one
    /// transaction. Either every row lands or none does.
    pub fn apply_bucket(&self, date: NaiveDate, hour: u32, delta: &BucketDelta) -> Result<()> {
        check_hour(hour)?;
        check_counters(&delta.totals)?;
        for count in delta.keys.values() {
            check_count("count", *count)?;
        }
        for seconds in delta.apps.values() {
            check_count("seconds_used", *seconds)?;
        }
        let mut conn = self.ready()?;
        if delta.is_empty() {
            return Ok(());
        }

        let date = date_key(date);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_counters(&tx, &date, hour, &delta.totals)?;
        write_keys(&tx, &date, hour, &delta.keys)?;
        write_apps(&tx, &date, hour, &delta.apps)?;
        tx.commit()?;
        Ok(())
    }

    /// Add `delta` presses of `key` for `(date, hour)`.
    ///
    /// The identifier is canonicalized first, so `Kp1` and `NumPad1` land on
    /// the same row.
    pub fn increment_key(&self, date: NaiveDate, hour: u32, key: &str, delta: i64) -> Result<()> {
        self.increment_keys(date, hour, &[(key.to_string(), delta)])
    }

    /// Add several key deltas for `(date, hour)` in one transaction
    pub fn increment_keys(&self, date: NaiveDate, hour: u32, keys: &[(String, i64)]) -> Result<()> {
        check_hour(hour)?;
        for (_, delta) in keys {
            check_count("count", *delta)?;
        }
        let mut conn = self.ready()?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_keys(&tx, &date_key(date), hour, keys.iter().map(|(k, d)| (k, d)))?;
        tx.commit()?;
        Ok(())
    }

    /// Add `seconds` of foreground time for `app` at `(date, hour)`
    pub fn increment_app_usage(
        &self,
        date: NaiveDate,
        hour: u32,
        app: &str,
        seconds: i64,
    ) -> Result<()> {
        check_hour(hour)?;
        check_count("seconds_used", seconds)?;
        let conn = self.ready()?;

        let app = app.to_string();
        write_apps(&conn, &date_key(date), hour, [(&app, &seconds)])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_date_key;

    fn date(s: &str) -> NaiveDate {
        parse_date_key(s).unwrap()
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_increment_accumulates_daily_and_hourly() {
        let db = test_db();
        let day = date("2025-01-01");

        db.increment(day, 10, &Counters::keys(5)).unwrap();
        db.increment(day, 10, &Counters::keys(3)).unwrap();

        assert_eq!(db.get_daily(day).unwrap().unwrap().totals.key_count, 8);
        let hourly = db.hourly_rows(day).unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].hour, 10);
        assert_eq!(hourly[0].totals.key_count, 8);
    }

    #[test]
    fn test_increment_key_accumulates() {
        let db = test_db();
        let day = date("2025-01-01");

        db.increment_key(day, 10, "A", 3).unwrap();
        db.increment_key(day, 10, "A", 2).unwrap();

        assert_eq!(db.key_total(day, day, "A").unwrap(), 5);
        assert_eq!(db.key_counts(day, day).unwrap().get("KeyA"), Some(&5));
    }

    #[test]
    fn test_key_aliases_share_a_row() {
        let db = test_db();
        let day = date("2025-03-04");

        db.increment_keys(
            day,
            9,
            &[
                ("NumPad1".to_string(), 4),
                ("Kp1".to_string(), 6),
                ("".to_string(), 100),
            ],
        )
        .unwrap();

        let counts = db.key_counts(day, day).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("Numpad1"), Some(&10));
    }

    #[test]
    fn test_increment_order_does_not_matter() {
        let deltas = [
            Counters {
                key_count: 3,
                mouse_distance: 10.5,
                left_clicks: 1,
                ..Counters::default()
            },
            Counters {
                right_clicks: 2,
                middle_clicks: 1,
                scroll_distance: 4.0,
                ..Counters::default()
            },
            Counters::keys(7),
        ];
        let day = date("2025-01-02");

        let forward = test_db();
        for d in &deltas {
            forward.increment(day, 8, d).unwrap();
        }
        let backward = test_db();
        for d in deltas.iter().rev() {
            backward.increment(day, 8, d).unwrap();
        }

        let a = forward.get_daily(day).unwrap().unwrap().totals;
        let b = backward.get_daily(day).unwrap().unwrap().totals;
        assert!(a.approx_eq(&b, 1e-9));
        assert_eq!(a.key_count, 10);
        assert_eq!(a.total_clicks(), 4);
    }

    #[test]
    fn test_hourly_rows_sum_to_daily() {
        let db = test_db();
        let day = date("2025-01-05");

        for hour in [0, 7, 7, 13, 23] {
            db.increment(
                day,
                hour,
                &Counters {
                    key_count: 2,
                    mouse_distance: 1.25,
                    scroll_distance: 0.5,
                    ..Counters::default()
                },
            )
            .unwrap();
        }

        let daily = db.get_daily(day).unwrap().unwrap().totals;
        let hourly: Counters = db.hourly_rows(day).unwrap().iter().map(|h| h.totals).sum();
        assert!(daily.approx_eq(&hourly, 1e-9));
        assert_eq!(daily.key_count, 10);
    }

    #[test]
    fn test_bucket_is_all_or_nothing() {
        let db = test_db();
        let day = date("2025-01-06");

        let mut bucket = BucketDelta {
            totals: Counters::keys(3),
            ..BucketDelta::default()
        };
        bucket.keys.insert("a".to_string(), 2);
        bucket.keys.insert("b".to_string(), -1);
        assert!(matches!(
            db.apply_bucket(day, 1, &bucket),
            Err(Error::InvalidDelta { field: "count", .. })
        ));
        assert!(db.get_daily(day).unwrap().is_none());
        assert!(db.key_counts(day, day).unwrap().is_empty());

        bucket.keys.insert("b".to_string(), 1);
        bucket.apps.insert("editor".to_string(), 60);
        db.apply_bucket(day, 1, &bucket).unwrap();
        assert_eq!(db.get_daily(day).unwrap().unwrap().totals.key_count, 3);
        assert_eq!(db.key_total(day, day, "KeyA").unwrap(), 2);
        assert_eq!(db.top_apps(day, day, 5).unwrap()[0].seconds, 60);
    }

    #[test]
    fn test_bucket_rolls_back_when_a_table_write_fails() {
        let db = test_db();
        let day = date("2025-01-06");
        db.connection()
            .unwrap()
            .execute("DROP TABLE key_count", [])
            .unwrap();

        let mut bucket = BucketDelta {
            totals: Counters::keys(1),
            ..BucketDelta::default()
        };
        bucket.keys.insert("a".to_string(), 1);

        assert!(db.apply_bucket(day, 4, &bucket).is_err());
        assert!(db.get_daily(day).unwrap().is_none());
        assert!(db.hourly_rows(day).unwrap().is_empty());
    }

    #[test]
    fn test_counters_never_decrease() {
        let db = test_db();
        let day = date("2025-01-08");

        db.increment(day, 10, &Counters::keys(5)).unwrap();
        assert!(matches!(
            db.increment(day, 10, &Counters::keys(-9)),
            Err(Error::InvalidDelta {
                field: "key_count",
                ..
            })
        ));
        assert_eq!(db.get_daily(day).unwrap().unwrap().totals.key_count, 5);

        db.increment_key(day, 10, "A", 3).unwrap();
        assert!(db.increment_key(day, 10, "A", -5).is_err());
        assert_eq!(db.key_total(day, day, "KeyA").unwrap(), 3);

        db.increment_app_usage(day, 10, "editor", 30).unwrap();
        assert!(db.increment_app_usage(day, 10, "editor", -10).is_err());
        assert_eq!(db.top_apps(day, day, 1).unwrap()[0].seconds, 30);
    }

    #[test]
    fn test_non_finite_distances_are_rejected() {
        let db = test_db();
        let day = date("2025-01-09");

        for bad in [f64::NAN, f64::INFINITY, -0.5] {
            let delta = Counters {
                mouse_distance: bad,
                ..Counters::default()
            };
            assert!(matches!(
                db.increment(day, 0, &delta),
                Err(Error::InvalidDelta {
                    field: "mouse_distance",
                    ..
                })
            ));
        }
        let delta = Counters {
            scroll_distance: f64::NEG_INFINITY,
            ..Counters::default()
        };
        assert!(db.increment(day, 0, &delta).is_err());
        assert!(db.get_daily(day).unwrap().is_none());
    }

    #[test]
    fn test_writes_before_migrate_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let day = date("2025-01-01");

        assert!(matches!(
            db.increment(day, 0, &Counters::keys(1)),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            db.increment_key(day, 0, "KeyA", 1),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            db.increment_app_usage(day, 0, "editor", 5),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn test_invalid_hour_is_rejected() {
        let db = test_db();
        let day = date("2025-01-01");

        assert!(matches!(
            db.increment(day, 24, &Counters::keys(1)),
            Err(Error::InvalidHour(24))
        ));
        assert!(matches!(
            db.increment_key(day, 99, "KeyA", 1),
            Err(Error::InvalidHour(99))
        ));
        assert!(db.get_daily(day).unwrap().is_none());
    }

    #[test]
    fn test_app_usage_accumulates() {
        let db = test_db();
        let day = date("2025-01-07");

        db.increment_app_usage(day, 9, "editor", 30).unwrap();
        db.increment_app_usage(day, 10, "editor", 30).unwrap();
        db.increment_app_usage(day, 10, "browser", 45).unwrap();
        db.increment_app_usage(day, 10, "  ", 1000).unwrap();

        let top = db.top_apps(day, day, 10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].app, "editor");
        assert_eq!(top[0].seconds, 60);
        assert_eq!(top[1].app, "browser");
    }
}
