//! odometer - keyboard and mouse usage statistics
//!
//! Command-line front end for the odometer store: feed it an event stream,
//! query daily/hourly/key totals, render the keyboard heatmap, and run
//! retention and integrity maintenance.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/odometer/odometer.db (~/.local/share/odometer/odometer.db)
//! - Logs: $XDG_STATE_HOME/odometer/odometer.log.* (~/.local/state/odometer/), rotated daily
//! - Config: $XDG_CONFIG_HOME/odometer/config.toml (~/.config/odometer/config.toml)

mod ingest;
mod process_lock;
mod report;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use odometer_core::analytics::{heatmap, AggregationViews, StatsPeriod, STREAK_WINDOW_DAYS};
use odometer_core::{Config, Database};
use process_lock::acquire_writer_guard;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "odometer")]
#[command(about = "Keyboard and mouse usage statistics")]
#[command(version)]
struct Cli {
    /// Database file (overrides config and the XDG default)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/odometer/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the database schema
    Migrate,

    /// Read JSON-lines events and record them
    Ingest {
        /// Read events from a file instead of stdin
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Totals for today, week, month or lifetime
    Stats {
        #[arg(default_value = "today")]
        period: StatsPeriod,

        /// Number of top applications to show
        #[arg(long, default_value = "5")]
        apps: usize,

        #[arg(long)]
        json: bool,
    },

    /// One row per day over an explicit range
    Range {
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: NaiveDate,

        #[arg(long, value_name = "YYYY-MM-DD")]
        to: NaiveDate,

        #[arg(long)]
        json: bool,
    },

    /// 24-hour breakdown of a single day
    Hourly {
        /// Day to show (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Most pressed keys
    TopKeys {
        #[arg(long, default_value = "week")]
        period: StatsPeriod,

        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Normalized key intensities and colors
    Heatmap {
        #[arg(long, default_value = "week")]
        period: StatsPeriod,

        #[arg(long)]
        json: bool,
    },

    /// Delete history older than the retention horizon
    Cleanup {
        /// Days to keep (defaults to retention.days; <= 0 keeps everything)
        #[arg(long, allow_negative_numbers = true)]
        days: Option<i64>,

        #[arg(long)]
        json: bool,
    },

    /// Report integrity issues without changing anything
    Check {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        odometer_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.resolved_database_path());

    tracing::info!(path = %db_path.display(), "odometer starting");

    let today = Local::now().date_naive();

    match cli.command {
        Command::Migrate => {
            let db = open_store(&db_path, &config)?;
            println!("Database: {}", db_path.display());
            println!("Schema version: {}", db.schema_version()?);
        }

        Command::Ingest { input } => {
            let _writer = acquire_writer_guard(&db_path).context("failed to acquire writer lock")?;
            let db = Arc::new(open_store(&db_path, &config)?);

            let summary = ingest::run(
                db,
                input.as_deref(),
                &config.recorder,
                config.retention.clone(),
            )?;

            println!(
                "Recorded {} event(s): {} written, {} dropped, {} malformed line(s) skipped",
                summary.recorder.recorded,
                summary.recorder.flushed,
                summary.recorder.dropped,
                summary.skipped_lines
            );
            if summary.interrupted {
                println!("Interrupted; buffered events were flushed.");
            }
        }

        Command::Stats { period, apps, json } => {
            let db = open_store(&db_path, &config)?;
            let views = AggregationViews::new(&db);
            let summary = views.summarize(period, today)?;
            let (start, end) = period.bounds(today);
            let top_apps = db.top_apps(start, end, apps)?;
            let streaks = views.streaks(today, STREAK_WINDOW_DAYS)?;

            if json {
                report::print_json(&serde_json::json!({
                    "summary": summary,
                    "streaks": streaks,
                    "top_apps": top_apps,
                }))?;
            } else {
                let peak = match period {
                    StatsPeriod::Today => views.peak_hour(today)?,
                    _ => None,
                };
                report::print_summary(&summary, peak, &streaks, &top_apps);
            }
        }

        Command::Range { from, to, json } => {
            if from > to {
                anyhow::bail!("--from {from} is after --to {to}");
            }
            let db = open_store(&db_path, &config)?;
            let series = AggregationViews::new(&db).daily_series(from, to)?;

            if json {
                report::print_json(&series)?;
            } else {
                report::print_daily_series(&series);
            }
        }

        Command::Hourly { date, json } => {
            let db = open_store(&db_path, &config)?;
            let hours = db.hourly_breakdown(date.unwrap_or(today))?;

            if json {
                report::print_json(&hours)?;
            } else {
                report::print_hourly(&hours);
            }
        }

        Command::TopKeys {
            period,
            limit,
            json,
        } => {
            let db = open_store(&db_path, &config)?;
            let keys = AggregationViews::new(&db).top_keys(period, today, limit)?;

            if json {
                report::print_json(&keys)?;
            } else {
                report::print_top_keys(&keys);
            }
        }

        Command::Heatmap { period, json } => {
            let db = open_store(&db_path, &config)?;
            let (start, end) = period.bounds(today);
            let cells = heatmap(&db.key_counts(start, end)?);

            if json {
                report::print_json(&cells)?;
            } else {
                report::print_heatmap(&cells);
            }
        }

        Command::Cleanup { days, json } => {
            let db = open_store(&db_path, &config)?;
            let days = days.unwrap_or(config.retention.days);
            let cleanup = db.cleanup(days, today)?;

            if json {
                report::print_json(&cleanup)?;
            } else {
                report::print_cleanup(&cleanup);
            }
        }

        Command::Check { json } => {
            let db = open_store(&db_path, &config)?;
            let integrity = db.check_integrity(today)?;
            let (daily_rows, hourly_rows, key_rows, app_rows) = db.row_counts()?;

            let check = report::CheckOutput {
                database: db_path.display().to_string(),
                schema_version: db.schema_version()?,
                journal_mode: db.journal_mode()?,
                sqlite_integrity: db.sqlite_integrity_check()?,
                daily_rows,
                hourly_rows,
                key_rows,
                app_rows,
                report: &integrity,
            };

            if json {
                report::print_json(&check)?;
            } else {
                report::print_check(&check);
            }

            if !integrity.is_clean() {
                anyhow::bail!("integrity check found {} issue(s)", integrity.issues.len());
            }
        }
    }

    Ok(())
}

/// Open and migrate the store, turning startup failures into messages an
/// operator can act on.
fn open_store(path: &Path, config: &Config) -> Result<Database> {
    let timeout = Duration::from_millis(config.storage.busy_timeout_ms);

    tracing::info!(path = %path.display(), "Opening database");
    let db = Database::open_with_timeout(path, timeout).map_err(|e| init_failure(path, e))?;
    db.migrate().map_err(|e| init_failure(path, e))?;
    Ok(db)
}

fn init_failure(path: &Path, error: odometer_core::Error) -> anyhow::Error {
    let message = if error.is_schema_failure() {
        format!(
            "schema migration incomplete for {}; the file may be corrupt or written by a newer version",
            path.display()
        )
    } else {
        format!(
            "cannot open store at {}; check permissions and free disk space",
            path.display()
        )
    };
    tracing::error!(error = %error, "{}", message);
    anyhow::Error::new(error).context(message)
}
