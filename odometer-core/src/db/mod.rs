//! Database layer for odometer
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Atomic additive increments
//! - Read-side range queries
//! - Retention cleanup and integrity checks

pub mod integrity;
pub mod repo;
pub mod retention;
pub mod schema;
mod stats;

pub use integrity::{IntegrityIssue, IntegrityReport};
pub use repo::{Database, DEFAULT_BUSY_TIMEOUT};
pub use retention::{CleanupReport, RetentionTrigger};
pub use stats::BucketDelta;
