//! Read-side aggregation views
//!
//! Weekly, monthly and lifetime totals are always summed from the daily
//! table at query time. There is no separate rollup to keep in sync.

use crate::db::Database;
use crate::error::Result;
use crate::types::{Counters, DailyAggregate, KeyTotal, LifetimeTotals};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Days in the `week` period, today included
pub const WEEK_DAYS: u64 = 7;
/// Days in the `month` period, today included
pub const MONTH_DAYS: u64 = 30;
/// Days looked back over when computing activity streaks
pub const STREAK_WINDOW_DAYS: u64 = 365;
/// Widest range [`AggregationViews::daily_series`] zero-fills
pub const MAX_FILLED_DAYS: i64 = 3660;

fn lifetime_bounds() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN),
        NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX),
    )
}

/// A named time range relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Today,
    /// Last 7 days including today
    Week,
    /// Last 30 days including today
    Month,
    /// Every day with data
    Lifetime,
    /// Explicit inclusive range
    Range(NaiveDate, NaiveDate),
}

impl StatsPeriod {
    /// Inclusive `[start, end]` for this period, `None` for lifetime.
    pub fn range(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let back = |days: u64| today.checked_sub_days(Days::new(days - 1)).unwrap_or(NaiveDate::MIN);
        match self {
            StatsPeriod::Today => Some((today, today)),
            StatsPeriod::Week => Some((back(WEEK_DAYS), today)),
            StatsPeriod::Month => Some((back(MONTH_DAYS), today)),
            StatsPeriod::Lifetime => None,
            StatsPeriod::Range(start, end) => Some((*start, *end)),
        }
    }

    /// Like [`StatsPeriod::range`], but lifetime spans years 1 through 9999.
    ///
    /// Date keys compare as text, so the bounds must stay four-digit years.
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        self.range(today).unwrap_or_else(lifetime_bounds)
    }

    pub fn display_name(&self) -> String {
        match self {
            StatsPeriod::Today => "Today".to_string(),
            StatsPeriod::Week => "Last 7 days".to_string(),
            StatsPeriod::Month => "Last 30 days".to_string(),
            StatsPeriod::Lifetime => "Lifetime".to_string(),
            StatsPeriod::Range(start, end) => format!("{start} to {end}"),
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" | "day" => Ok(StatsPeriod::Today),
            "week" | "weekly" => Ok(StatsPeriod::Week),
            "month" | "monthly" => Ok(StatsPeriod::Month),
            "lifetime" | "all" => Ok(StatsPeriod::Lifetime),
            other => Err(format!(
                "unknown period '{other}' (expected today, week, month or lifetime)"
            )),
        }
    }
}

/// Summed counters for one period.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub period: String,
    /// `None` for lifetime on an empty store
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    #[serde(flatten)]
    pub totals: Counters,
    /// Dates in range with a daily row
    pub active_days: i64,
}

/// Consecutive-day activity streaks over a daily series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Streaks {
    /// Run of active days ending on the last day of the series
    pub current: i64,
    pub longest: i64,
}

impl Streaks {
    /// A day counts as active when anything at all was recorded.
    pub fn from_series(series: &[DailyAggregate]) -> Self {
        let mut longest = 0;
        let mut run = 0;
        for day in series {
            if day.totals.is_zero() {
                run = 0;
            } else {
                run += 1;
                longest = longest.max(run);
            }
        }

        let current = series
            .iter()
            .rev()
            .take_while(|d| !d.totals.is_zero())
            .count() as i64;

        Self { current, longest }
    }
}

/// Query facade over a [`Database`] for named periods.
pub struct AggregationViews<'a> {
    db: &'a Database,
}

impl<'a> AggregationViews<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Summed totals for a period.
    pub fn summarize(&self, period: StatsPeriod, today: NaiveDate) -> Result<PeriodSummary> {
        match period.range(today) {
            Some((start, end)) => {
                let totals = self.db.sum_range(start, end)?;
                let active_days = self.db.daily_range(start, end)?.len() as i64;
                Ok(PeriodSummary {
                    period: period.display_name(),
                    start: Some(start),
                    end: Some(end),
                    totals,
                    active_days,
                })
            }
            None => {
                let lifetime = self.lifetime()?;
                Ok(PeriodSummary {
                    period: period.display_name(),
                    start: lifetime.first_date,
                    end: lifetime.last_date,
                    totals: lifetime.totals,
                    active_days: lifetime.days_tracked,
                })
            }
        }
    }

    /// Totals for the 7 days ending today
    pub fn weekly(&self, today: NaiveDate) -> Result<Counters> {
        let (start, end) = StatsPeriod::Week.bounds(today);
        self.db.sum_range(start, end)
    }

    /// Totals for the 30 days ending today
    pub fn monthly(&self, today: NaiveDate) -> Result<Counters> {
        let (start, end) = StatsPeriod::Month.bounds(today);
        self.db.sum_range(start, end)
    }

    pub fn lifetime(&self) -> Result<LifetimeTotals> {
        self.db.lifetime_totals()
    }

    /// One entry per date in `[start, end]`, zero-filled where no row exists.
    ///
    /// Ranges wider than [`MAX_FILLED_DAYS`] return only the stored rows.
    pub fn daily_series(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyAggregate>> {
        if end.signed_duration_since(start).num_days() >= MAX_FILLED_DAYS {
            tracing::debug!(%start, %end, "Range too wide to zero-fill, returning stored rows");
            return self.db.daily_range(start, end);
        }

        let mut stored = self.db.daily_range(start, end)?.into_iter().peekable();
        let mut series = Vec::new();

        for date in start.iter_days().take_while(|d| *d <= end) {
            let totals = match stored.peek() {
                Some(row) if row.date == date => stored.next().map(|r| r.totals).unwrap_or_default(),
                _ => Counters::default(),
            };
            series.push(DailyAggregate { date, totals });
        }

        Ok(series)
    }

    /// Streaks over the `days` ending today.
    pub fn streaks(&self, today: NaiveDate, days: u64) -> Result<Streaks> {
        let start = today
            .checked_sub_days(Days::new(days.saturating_sub(1)))
            .unwrap_or(NaiveDate::MIN);
        Ok(Streaks::from_series(&self.daily_series(start, today)?))
    }

    /// Hour of `date` with the most keystrokes, `None` if nothing was typed.
    pub fn peak_hour(&self, date: NaiveDate) -> Result<Option<u32>> {
        Ok(self
            .db
            .hourly_breakdown(date)?
            .into_iter()
            .filter(|h| h.totals.key_count > 0)
            .max_by(|a, b| {
                a.totals
                    .key_count
                    .cmp(&b.totals.key_count)
                    .then(b.hour.cmp(&a.hour))
            })
            .map(|h| h.hour))
    }

    /// Top `n` keys for a period.
    pub fn top_keys(&self, period: StatsPeriod, today: NaiveDate, n: usize) -> Result<Vec<KeyTotal>> {
        let (start, end) = period.bounds(today);
        self.db.top_keys(start, end, n)
    }
}
