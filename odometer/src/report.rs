//! Text and JSON rendering for the query subcommands.

use anyhow::Result;
use odometer_core::analytics::{HeatmapCell, PeriodSummary, Streaks, STREAK_WINDOW_DAYS};
use odometer_core::db::{CleanupReport, IntegrityReport};
use odometer_core::format::{format_count, format_distance, format_duration, format_hour_slot};
use odometer_core::{AppTotal, Counters, DailyAggregate, HourlyAggregate, KeyTotal};
use serde::Serialize;

/// Print `value` as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_counters(totals: &Counters) {
    println!("  Keystrokes:     {}", format_count(totals.key_count));
    println!("  Mouse distance: {}", format_distance(totals.mouse_distance));
    println!(
        "  Clicks:         {} (left {}, right {}, middle {})",
        format_count(totals.total_clicks()),
        totals.left_clicks,
        totals.right_clicks,
        totals.middle_clicks
    );
    println!("  Scroll:         {}", format_distance(totals.scroll_distance));
}

pub fn print_summary(
    summary: &PeriodSummary,
    peak_hour: Option<u32>,
    streaks: &Streaks,
    apps: &[AppTotal],
) {
    match (summary.start, summary.end) {
        (Some(start), Some(end)) if start == end => println!("{} ({})", summary.period, start),
        (Some(start), Some(end)) => println!("{} ({} to {})", summary.period, start, end),
        _ => println!("{} (no data yet)", summary.period),
    }
    print_counters(&summary.totals);
    println!("  Active days:    {}", summary.active_days);
    if let Some(hour) = peak_hour {
        println!("  Peak hour:      {}", format_hour_slot(hour));
    }
    println!(
        "  Streak:         {} day(s), longest {} in the last {} days",
        streaks.current, streaks.longest, STREAK_WINDOW_DAYS
    );

    if !apps.is_empty() {
        println!("\nTop applications:");
        for app in apps {
            println!("  {:<24} {}", app.app, format_duration(app.seconds));
        }
    }
}

pub fn print_daily_series(series: &[DailyAggregate]) {
    println!(
        "{:<12} {:>10} {:>12} {:>8} {:>10}",
        "Date", "Keys", "Mouse", "Clicks", "Scroll"
    );
    for day in series {
        println!(
            "{:<12} {:>10} {:>12} {:>8} {:>10}",
            day.date.to_string(),
            day.totals.key_count,
            format_distance(day.totals.mouse_distance),
            day.totals.total_clicks(),
            format_distance(day.totals.scroll_distance)
        );
    }
}

pub fn print_hourly(hours: &[HourlyAggregate]) {
    let max = hours
        .iter()
        .map(|h| h.totals.key_count)
        .max()
        .unwrap_or(0)
        .max(1);

    for h in hours {
        let width = (h.totals.key_count * 40 / max) as usize;
        println!(
            "{:02}:00 {:>8} {}",
            h.hour,
            h.totals.key_count,
            "#".repeat(width)
        );
    }
}

pub fn print_top_keys(keys: &[KeyTotal]) {
    if keys.is_empty() {
        println!("No keystrokes recorded in this period.");
        return;
    }
    for (rank, key) in keys.iter().enumerate() {
        println!("{:>3}. {:<16} {}", rank + 1, key.key, key.count);
    }
}

pub fn print_heatmap(cells: &[HeatmapCell]) {
    if cells.is_empty() {
        println!("No keystrokes recorded in this period.");
        return;
    }
    println!("{:<16} {:>8} {:>9}  {}", "Key", "Count", "Intensity", "Color");
    for cell in cells {
        println!(
            "{:<16} {:>8} {:>9.3}  {}",
            cell.key,
            cell.count,
            cell.intensity,
            cell.color.to_hex()
        );
    }
}

pub fn print_cleanup(report: &CleanupReport) {
    match report.cutoff {
        None => println!("Retention disabled; nothing deleted."),
        Some(cutoff) => {
            println!("Deleted rows dated before {cutoff}:");
            println!("  daily:  {}", report.daily);
            println!("  hourly: {}", report.hourly);
            println!("  keys:   {}", report.keys);
            println!("  apps:   {}", report.apps);
        }
    }
}

/// Store health as shown by `odometer check`
#[derive(Debug, Serialize)]
pub struct CheckOutput<'a> {
    pub database: String,
    pub schema_version: i64,
    pub journal_mode: String,
    pub sqlite_integrity: String,
    pub daily_rows: i64,
    pub hourly_rows: i64,
    pub key_rows: i64,
    pub app_rows: i64,
    pub report: &'a IntegrityReport,
}

pub fn print_check(check: &CheckOutput<'_>) {
    println!("Database:       {}", check.database);
    println!("Schema version: {}", check.schema_version);
    println!("Journal mode:   {}", check.journal_mode);
    println!("SQLite check:   {}", check.sqlite_integrity);
    println!(
        "Rows:           {} daily, {} hourly, {} keys, {} apps",
        check.daily_rows, check.hourly_rows, check.key_rows, check.app_rows
    );
    println!("Days checked:   {}", check.report.days_checked);

    if check.report.is_clean() {
        println!("No integrity issues found.");
    } else {
        println!("\n{} issue(s):", check.report.issues.len());
        for issue in &check.report.issues {
            println!("  - {issue}");
        }
    }
}
