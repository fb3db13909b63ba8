//! # odometer-core
//!
//! Core library for odometer - an embedded statistics engine for keyboard
//! and mouse usage.
//!
//! This library provides:
//! - Domain types for input events and aggregate counters
//! - Database storage layer with SQLite (versioned migrations, atomic
//!   additive increments, retention cleanup, integrity checks)
//! - Read-side aggregation views and keyboard heatmap normalization
//! - A buffering recorder for event producers
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Data model
//!
//! Every event lands in three places at once: a daily row, an hourly row
//! and (for keystrokes) a per-key row. Weekly, monthly and lifetime numbers
//! are summed from the daily rows when queried.
//!
//! ## Example
//!
//! ```rust,no_run
//! use odometer_core::{Config, Counters, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&config.resolved_database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let today = chrono::Local::now().date_naive();
//! db.increment(today, 9, &Counters::keys(1)).expect("failed to record");
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{AggregationViews, StatsPeriod};
pub use config::Config;
pub use db::{BucketDelta, CleanupReport, Database, IntegrityReport, RetentionTrigger};
pub use error::{Error, Result};
pub use recorder::{Recorder, RecorderStats};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod keys;
pub mod logging;
pub mod recorder;
pub mod types;
