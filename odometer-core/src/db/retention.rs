//! History retention
//!
//! `days <= 0` means keep everything. Both [`Database::cleanup`] and
//! [`RetentionTrigger`] check this independently.

use super::repo::Database;
use crate::config::RetentionConfig;
use crate::error::Result;
use crate::types::date_key;
use chrono::{DateTime, Days, Duration, Local, NaiveDate};
use rusqlite::TransactionBehavior;
use serde::Serialize;

/// Tables pruned by a cleanup, in deletion order.
const PRUNED_TABLES: &[&str] = &["daily_aggregate", "hourly_aggregate", "key_count", "app_usage"];

/// Rows removed by one cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Rows dated strictly before this were deleted; `None` if nothing ran
    pub cutoff: Option<NaiveDate>,
    pub daily: usize,
    pub hourly: usize,
    pub keys: usize,
    pub apps: usize,
}

impl CleanupReport {
    /// Report for a cleanup that did not run
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn was_skipped(&self) -> bool {
        self.cutoff.is_none()
    }

    pub fn total(&self) -> usize {
        self.daily + self.hourly + self.keys + self.apps
    }
}

impl Database {
    /// Delete rows older than `retention_days` before `today`.
    ///
    /// Rows with `date < today - retention_days` are removed from every
    /// aggregate table. Each table is pruned in its own transaction. With
    /// `retention_days <= 0` nothing is touched.
    pub fn cleanup(&self, retention_days: i64, today: NaiveDate) -> Result<CleanupReport> {
        if retention_days <= 0 {
            tracing::debug!(retention_days, "Retention disabled, keeping all history");
            return Ok(CleanupReport::skipped());
        }

        let cutoff = today
            .checked_sub_days(Days::new(retention_days as u64))
            .unwrap_or(NaiveDate::MIN);
        let cutoff_key = date_key(cutoff);

        let mut report = CleanupReport {
            cutoff: Some(cutoff),
            ..CleanupReport::default()
        };

        let mut conn = self.ready()?;
        for &table in PRUNED_TABLES {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = tx.execute(&format!("DELETE FROM {table} WHERE date < ?1"), [&cutoff_key])?;
            tx.commit()?;

            match table {
                "daily_aggregate" => report.daily = deleted,
                "hourly_aggregate" => report.hourly = deleted,
                "key_count" => report.keys = deleted,
                _ => report.apps = deleted,
            }
        }

        tracing::info!(
            retention_days,
            cutoff = %cutoff,
            daily = report.daily,
            hourly = report.hourly,
            keys = report.keys,
            apps = report.apps,
            "Retention cleanup finished"
        );

        Ok(report)
    }
}

/// Runs [`Database::cleanup`] at most once per configured interval
#[derive(Debug)]
pub struct RetentionTrigger {
    config: RetentionConfig,
    last_run: Option<DateTime<Local>>,
}

impl RetentionTrigger {
    pub fn new(config: RetentionConfig) -> Self {
        Self {
            config,
            last_run: None,
        }
    }

    pub fn last_run(&self) -> Option<DateTime<Local>> {
        self.last_run
    }

    /// True if a cleanup should run at `now`
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        if self.config.keeps_forever() {
            return false;
        }
        let interval = Duration::hours(self.config.check_interval_hours as i64);
        match self.last_run {
            None => true,
            Some(last) => now - last >= interval,
        }
    }

    /// Run cleanup if it is due. Failures are logged and retried next time.
    pub fn run_if_due(&mut self, db: &Database, now: DateTime<Local>) -> Option<CleanupReport> {
        if !self.is_due(now) {
            return None;
        }

        match db.cleanup(self.config.days, now.date_naive()) {
            Ok(report) => {
                self.last_run = Some(now);
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retention cleanup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_date_key, Counters};
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        parse_date_key(s).unwrap()
    }

    fn seeded_db(days: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        for d in days {
            db.increment(date(d), 12, &Counters::keys(1)).unwrap();
            db.increment_key(date(d), 12, "KeyA", 1).unwrap();
            db.increment_app_usage(date(d), 12, "editor", 10).unwrap();
        }
        db
    }

    #[test]
    fn test_non_positive_retention_keeps_everything() {
        let db = seeded_db(&["2020-01-01", "2024-06-01", "2025-01-01"]);
        let today = date("2025-01-01");

        for days in [0, -1, -100] {
            let report = db.cleanup(days, today).unwrap();
            assert!(report.was_skipped());
            assert_eq!(report.total(), 0);
        }

        assert_eq!(db.row_counts().unwrap(), (3, 3, 3, 3));
    }

    #[test]
    fn test_cleanup_boundary() {
        let db = seeded_db(&["2024-10-02", "2024-10-03", "2024-10-04"]);
        let today = date("2025-01-01");

        // today - 90 days = 2024-10-03, which is kept
        let report = db.cleanup(90, today).unwrap();
        assert_eq!(report.cutoff, Some(date("2024-10-03")));
        assert_eq!(report.daily, 1);
        assert_eq!(report.hourly, 1);
        assert_eq!(report.keys, 1);
        assert_eq!(report.apps, 1);

        assert!(db.get_daily(date("2024-10-02")).unwrap().is_none());
        assert!(db.get_daily(date("2024-10-03")).unwrap().is_some());
        assert!(db.get_daily(date("2024-10-04")).unwrap().is_some());
    }

    #[test]
    fn test_zero_retention_after_three_days() {
        let db = seeded_db(&["2025-01-01", "2025-01-02", "2025-01-03"]);
        db.cleanup(0, date("2025-01-03")).unwrap();

        let rows = db
            .daily_range(date("2025-01-01"), date("2025-01-03"))
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_trigger_respects_interval_and_disabled_retention() {
        let db = seeded_db(&["2024-01-01", "2025-01-01"]);
        let t0 = Local.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();

        let mut disabled = RetentionTrigger::new(RetentionConfig {
            days: 0,
            check_interval_hours: 1,
        });
        assert!(disabled.run_if_due(&db, t0).is_none());
        assert_eq!(db.row_counts().unwrap().0, 2);

        let mut trigger = RetentionTrigger::new(RetentionConfig {
            days: 30,
            check_interval_hours: 24,
        });
        let report = trigger.run_if_due(&db, t0).unwrap();
        assert_eq!(report.daily, 1);
        assert_eq!(trigger.last_run(), Some(t0));

        assert!(trigger.run_if_due(&db, t0 + Duration::hours(23)).is_none());
        assert!(trigger.run_if_due(&db, t0 + Duration::hours(24)).is_some());
    }

    #[test]
    fn test_trigger_retries_after_failure() {
        let db = Database::open_in_memory().unwrap();
        let now = Local.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut trigger = RetentionTrigger::new(RetentionConfig {
            days: 30,
            check_interval_hours: 24,
        });

        // Not migrated, so the cleanup fails and stays due
        assert!(trigger.run_if_due(&db, now).is_none());
        assert!(trigger.last_run().is_none());

        db.migrate().unwrap();
        assert!(trigger.run_if_due(&db, now).is_some());
    }
}
