//! Integration tests for the on-disk store
//!
//! These tests open real database files in temporary directories to verify
//! WAL persistence, concurrent writers, legacy imports and the failure
//! classification consumers rely on at startup.

use chrono::{Local, NaiveDate, TimeZone};
use odometer_core::analytics::{heatmap, AggregationViews, StatsPeriod};
use odometer_core::config::RecorderConfig;
use odometer_core::db::schema::{get_schema_version, SCHEMA_VERSION};
use odometer_core::{Counters, Database, Error, EventKind, InputEvent, Recorder};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn date(s: &str) -> NaiveDate {
    odometer_core::parse_date_key(s).expect("valid date")
}

fn open_migrated(dir: &TempDir) -> Database {
    let db = Database::open(&dir.path().join("odometer.db")).expect("database should open");
    db.migrate().expect("migrations should run");
    db
}

// ============================================
// Persistence
// ============================================

#[test]
fn test_on_disk_store_uses_wal() {
    let temp_dir = TempDir::new().unwrap();
    let db = open_migrated(&temp_dir);

    assert_eq!(db.journal_mode().unwrap().to_lowercase(), "wal");
    assert!(db.get_database_size().unwrap() > 0);
}

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let day = date("2025-01-01");

    {
        let db = open_migrated(&temp_dir);
        db.increment(day, 10, &Counters::keys(5)).unwrap();
        db.increment(day, 10, &Counters::keys(3)).unwrap();
        db.increment_key(day, 10, "A", 3).unwrap();
        db.increment_key(day, 10, "a", 2).unwrap();
    }

    let db = open_migrated(&temp_dir);
    assert_eq!(db.get_daily(day).unwrap().unwrap().totals.key_count, 8);
    assert_eq!(db.hourly_breakdown(day).unwrap()[10].totals.key_count, 8);
    assert_eq!(db.key_total(day, day, "KeyA").unwrap(), 5);

    let conn = db.connection().unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
}

// ============================================
// Concurrency
// ============================================

#[test]
fn test_concurrent_writers_do_not_lose_updates() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("odometer.db");
    open_migrated(&temp_dir);

    let day = date("2025-02-01");
    let writers = 4;
    let per_writer = 50;

    // Each thread gets its own connection so the engine lock is contended
    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let path = path.clone();
            thread::spawn(move || {
                let db = Database::open_with_timeout(&path, Duration::from_secs(10))
                    .expect("database should open");
                db.migrate().expect("migrations should run");
                for n in 0..per_writer {
                    db.increment(day, (i * 5 + n % 3) as u32, &Counters::keys(1))
                        .expect("increment should succeed");
                    db.increment_key(day, 0, "Space", 1)
                        .expect("key increment should succeed");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let db = open_migrated(&temp_dir);
    let expected = (writers * per_writer) as i64;
    let daily = db.get_daily(day).unwrap().unwrap().totals;
    assert_eq!(daily.key_count, expected);

    let hourly: i64 = db
        .hourly_breakdown(day)
        .unwrap()
        .iter()
        .map(|h| h.totals.key_count)
        .sum();
    assert_eq!(hourly, expected);
    assert_eq!(db.key_total(day, day, "Space").unwrap(), expected);
    assert!(db.check_integrity(day).unwrap().is_clean());
}

#[test]
fn test_shared_handle_across_threads() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(open_migrated(&temp_dir));
    let day = date("2025-02-02");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..25 {
                    db.increment(
                        day,
                        12,
                        &Counters {
                            mouse_distance: 0.5,
                            left_clicks: 1,
                            ..Counters::default()
                        },
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let totals = db.get_daily(day).unwrap().unwrap().totals;
    assert_eq!(totals.left_clicks, 200);
    assert!((totals.mouse_distance - 100.0).abs() < 1e-9);
}

// ============================================
// Migration from older layouts
// ============================================

#[test]
fn test_legacy_store_is_imported() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("odometer.db");

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE daily_stats (date TEXT PRIMARY KEY, key_count INTEGER,
                                      mouse_distance REAL, left_clicks INTEGER,
                                      right_clicks INTEGER);
            CREATE TABLE hourly_stats (date TEXT, hour INTEGER, key_count INTEGER,
                                       mouse_distance REAL, left_clicks INTEGER,
                                       right_clicks INTEGER, PRIMARY KEY (date, hour));
            CREATE TABLE key_stats (date TEXT, hour INTEGER, key_code TEXT, count INTEGER,
                                    PRIMARY KEY (date, hour, key_code));
            INSERT INTO daily_stats VALUES ('2024-05-01', 12, 3.5, 2, 1);
            INSERT INTO hourly_stats VALUES ('2024-05-01', 9, 12, 3.5, 2, 1);
            INSERT INTO key_stats VALUES ('2024-05-01', 9, 'Return', 7);
            INSERT INTO key_stats VALUES ('2024-05-01', 9, 'Enter', 5);
            "#,
        )
        .unwrap();
    }

    let db = Database::open(&path).unwrap();
    db.migrate().unwrap();

    let day = date("2024-05-01");
    let daily = db.get_daily(day).unwrap().unwrap().totals;
    assert_eq!(daily.key_count, 12);
    assert_eq!(daily.right_clicks, 1);
    assert_eq!(daily.middle_clicks, 0);
    assert_eq!(db.key_total(day, day, "Enter").unwrap(), 12);
    assert!(db.check_integrity(day).unwrap().is_clean());
}

// ============================================
// Startup failures
// ============================================

#[test]
fn test_open_failure_is_classified() {
    let temp_dir = TempDir::new().unwrap();
    // A directory cannot be opened as a database file
    let err = match Database::open(temp_dir.path()) {
        Ok(db) => db.migrate().unwrap_err(),
        Err(e) => e,
    };

    assert!(err.is_initialization_failure());
    assert!(!err.is_schema_failure());
}

#[test]
fn test_unwritable_parent_is_classified() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let err = Database::open(&blocker.join("odometer.db")).err().expect("open should fail");
    assert!(matches!(err, Error::CreateDir { .. }));
    assert!(err.is_initialization_failure());
}

#[test]
fn test_corrupt_file_is_not_a_schema_failure() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("odometer.db");
    std::fs::write(&path, vec![0x42u8; 4096]).unwrap();

    let err = match Database::open(&path) {
        Ok(db) => db.migrate().unwrap_err(),
        Err(e) => e,
    };
    assert!(err.is_initialization_failure());
}

// ============================================
// End to end
// ============================================

#[test]
fn test_recorder_to_heatmap() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(open_migrated(&temp_dir));
    let today = date("2025-03-10");

    let mut recorder = Recorder::new(Arc::clone(&db), &RecorderConfig { flush_every: 10 });
    let ts = Local.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap();
    for (key, times) in [("Spacebar", 30), ("e", 10), ("NumPad1", 2), ("Kp1", 2)] {
        for _ in 0..times {
            recorder.record(&InputEvent::new(
                ts,
                EventKind::Key {
                    key: key.to_string(),
                },
            ));
        }
    }
    let stats = recorder.finish();
    assert_eq!(stats.recorded, 44);
    assert_eq!(stats.flushed, 44);

    let views = AggregationViews::new(&db);
    let summary = views.summarize(StatsPeriod::Today, today).unwrap();
    assert_eq!(summary.totals.key_count, 44);
    assert_eq!(views.peak_hour(today).unwrap(), Some(14));

    let counts = db.key_counts(today, today).unwrap();
    let cells = heatmap(&counts);
    let keys: Vec<_> = cells.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["Space", "KeyE", "Numpad1"]);
    assert_eq!(cells[0].intensity, 1.0);
    assert!(cells.iter().all(|c| (0.0..=1.0).contains(&c.intensity)));
}
