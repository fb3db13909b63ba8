//! Read-only consistency report over the aggregate tables
//!
//! Nothing here modifies the store. Every issue found is logged at `warn`
//! and returned to the caller.

use super::repo::Database;
use crate::error::Result;
use crate::types::{date_key, Counters};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Tolerance for comparing summed floating point distances
pub const FLOAT_EPSILON: f64 = 1e-6;

/// One violated invariant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// The 24 hourly rows of a date do not add up to its daily row
    HourlyMismatch {
        date: NaiveDate,
        daily: Counters,
        hourly_sum: Counters,
    },
    /// Hourly rows exist for a date that has no daily row
    MissingDaily {
        date: NaiveDate,
        hourly_sum: Counters,
    },
    /// A daily row is dated after today
    FutureDate { date: NaiveDate },
    /// Key rows exist for a date that has no daily row
    OrphanKeyRows { date: NaiveDate, rows: i64 },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::HourlyMismatch {
                date,
                daily,
                hourly_sum,
            } => write!(
                f,
                "{date}: hourly rows sum to {} keys / {} clicks, daily row has {} keys / {} clicks",
                hourly_sum.key_count,
                hourly_sum.total_clicks(),
                daily.key_count,
                daily.total_clicks()
            ),
            IntegrityIssue::MissingDaily { date, hourly_sum } => write!(
                f,
                "{date}: hourly rows sum to {} keys / {} clicks but there is no daily row",
                hourly_sum.key_count,
                hourly_sum.total_clicks()
            ),
            IntegrityIssue::FutureDate { date } => write!(f, "{date}: daily row is in the future"),
            IntegrityIssue::OrphanKeyRows { date, rows } => {
                write!(f, "{date}: {rows} key rows without a daily row")
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub days_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Database {
    /// Check the stored aggregates against their invariants.
    pub fn check_integrity(&self, today: NaiveDate) -> Result<IntegrityReport> {
        let conn = self.ready()?;
        let mut report = IntegrityReport::default();

        // Daily rows joined against their hourly sums; dates with no hourly
        // rows at all sum to zero.
        let mut stmt = conn.prepare(
            r#"
            SELECT d.date,
                   d.key_count, d.mouse_distance, d.left_clicks, d.right_clicks,
                   d.middle_clicks, d.scroll_distance,
                   COALESCE(SUM(h.key_count), 0), COALESCE(SUM(h.mouse_distance), 0.0),
                   COALESCE(SUM(h.left_clicks), 0), COALESCE(SUM(h.right_clicks), 0),
                   COALESCE(SUM(h.middle_clicks), 0), COALESCE(SUM(h.scroll_distance), 0.0)
            FROM daily_aggregate d
            LEFT JOIN hourly_aggregate h ON h.date = d.date
            GROUP BY d.date
            ORDER BY d.date ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                Database::row_to_date(row, 0)?,
                Database::row_to_counters(row, 1)?,
                Database::row_to_counters(row, 7)?,
            ))
        })?;

        for row in rows {
            let (date, daily, hourly_sum) = row?;
            report.days_checked += 1;

            if date > today {
                report.issues.push(IntegrityIssue::FutureDate { date });
            }
            if !daily.approx_eq(&hourly_sum, FLOAT_EPSILON) {
                report.issues.push(IntegrityIssue::HourlyMismatch {
                    date,
                    daily,
                    hourly_sum,
                });
            }
        }
        drop(stmt);

        let mut stmt = conn.prepare(
            r#"
            SELECT h.date,
                   SUM(h.key_count), SUM(h.mouse_distance), SUM(h.left_clicks),
                   SUM(h.right_clicks), SUM(h.middle_clicks), SUM(h.scroll_distance)
            FROM hourly_aggregate h
            WHERE NOT EXISTS (SELECT 1 FROM daily_aggregate d WHERE d.date = h.date)
            GROUP BY h.date
            ORDER BY h.date ASC
            "#,
        )?;
        let missing = stmt.query_map([], |row| {
            Ok(IntegrityIssue::MissingDaily {
                date: Database::row_to_date(row, 0)?,
                hourly_sum: Database::row_to_counters(row, 1)?,
            })
        })?;
        for issue in missing {
            report.issues.push(issue?);
        }
        drop(stmt);

        let mut stmt = conn.prepare(
            r#"
            SELECT k.date, COUNT(*)
            FROM key_count k
            WHERE NOT EXISTS (SELECT 1 FROM daily_aggregate d WHERE d.date = k.date)
            GROUP BY k.date
            ORDER BY k.date ASC
            "#,
        )?;
        let orphans = stmt.query_map([], |row| {
            Ok(IntegrityIssue::OrphanKeyRows {
                date: Database::row_to_date(row, 0)?,
                rows: row.get(1)?,
            })
        })?;
        for issue in orphans {
            report.issues.push(issue?);
        }

        for issue in &report.issues {
            tracing::warn!(%issue, "Integrity check");
        }
        tracing::debug!(
            days = report.days_checked,
            issues = report.issues.len(),
            today = %date_key(today),
            "Integrity check finished"
        );

        Ok(report)
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
    fn test_clean_store() {
        let db = test_db();
        let day = date("2025-01-01");
        db.increment(day, 3, &Counters::keys(2)).unwrap();
        db.increment(
            day,
            4,
            &Counters {
                mouse_distance: 0.1,
                ..Counters::default()
            },
        )
        .unwrap();
        db.increment_key(day, 3, "KeyA", 2).unwrap();

        let report = db.check_integrity(day).unwrap();
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.days_checked, 1);
    }

    #[test]
    fn test_detects_drift_future_dates_and_orphans() {
        let db = test_db();
        let today = date("2025-01-01");
        db.increment(today, 1, &Counters::keys(5)).unwrap();
        db.increment(date("2025-02-01"), 1, &Counters::keys(1)).unwrap();
        db.increment_key(date("2024-12-01"), 1, "KeyB", 1).unwrap();

        // Simulate drift by editing the hourly row directly
        db.connection()
            .unwrap()
            .execute(
                "UPDATE hourly_aggregate SET key_count = 4 WHERE date = '2025-01-01'",
                [],
            )
            .unwrap();

        let report = db.check_integrity(today).unwrap();
        assert_eq!(report.issues.len(), 3);
        assert!(report.issues.iter().any(|i| matches!(
            i,
            IntegrityIssue::HourlyMismatch { date: d, .. } if *d == today
        )));
        assert!(report
            .issues
            .contains(&IntegrityIssue::FutureDate { date: date("2025-02-01") }));
        assert!(report.issues.contains(&IntegrityIssue::OrphanKeyRows {
            date: date("2024-12-01"),
            rows: 1
        }));

        // Nothing was corrected
        assert_eq!(db.hourly_rows(today).unwrap()[0].totals.key_count, 4);
    }

    #[test]
    fn test_detects_hourly_rows_without_daily_row() {
        let db = test_db();
        let day = date("2025-01-01");
        db.increment(day, 7, &Counters::keys(3)).unwrap();
        db.increment(day, 8, &Counters::keys(2)).unwrap();

        db.connection()
            .unwrap()
            .execute("DELETE FROM daily_aggregate WHERE date = '2025-01-01'", [])
            .unwrap();

        let report = db.check_integrity(day).unwrap();
        assert_eq!(report.days_checked, 0);
        assert_eq!(report.issues.len(), 1);
        match &report.issues[0] {
            IntegrityIssue::MissingDaily { date: d, hourly_sum } => {
                assert_eq!(*d, day);
                assert_eq!(hourly_sum.key_count, 5);
            }
            other => panic!("expected MissingDaily, got {other:?}"),
        }
        assert!(report.issues[0].to_string().contains("no daily row"));
        assert_eq!(db.hourly_rows(day).unwrap().len(), 2);
    }
}
