//! Error types for odometer-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the odometer-core library
#[derive(Error, Debug)]
pub enum Error {
    /// The directory holding the store could not be created
    #[error("cannot create store directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file could not be created or opened
    #[error("cannot open store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A migration step failed while being applied
    #[error("schema migration to version {version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: rusqlite::Error,
    },

    /// A required table or column is still missing after all migrations ran
    #[error("schema migration incomplete: {table}.{column} is missing")]
    SchemaIncomplete { table: String, column: String },

    /// The store was used before `Database::migrate` completed
    #[error("store is not initialized; run migrations before reading or writing")]
    NotInitialized,

    /// Hour of day outside 0-23
    #[error("invalid hour of day: {0}")]
    InvalidHour(u32),

    /// A delta that would shrink a counter, or a distance that is not finite
    #[error("invalid {field} delta: {value}")]
    InvalidDelta { field: &'static str, value: f64 },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors that must abort startup of whatever owns the store.
    pub fn is_initialization_failure(&self) -> bool {
        matches!(
            self,
            Error::CreateDir { .. }
                | Error::Open { .. }
                | Error::Migration { .. }
                | Error::SchemaIncomplete { .. }
        )
    }

    /// True when the store opened but its schema could not be brought up to date.
    pub fn is_schema_failure(&self) -> bool {
        matches!(self, Error::Migration { .. } | Error::SchemaIncomplete { .. })
    }
}

/// Result type alias for odometer-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_failure_classification() {
        let open = Error::Open {
            path: PathBuf::from("/nope/odometer.db"),
            source: rusqlite::Error::InvalidQuery,
        };
        assert!(open.is_initialization_failure());
        assert!(!open.is_schema_failure());

        let incomplete = Error::SchemaIncomplete {
            table: "daily_aggregate".to_string(),
            column: "scroll_distance".to_string(),
        };
        assert!(incomplete.is_initialization_failure());
        assert!(incomplete.is_schema_failure());
        assert!(incomplete.to_string().contains("daily_aggregate.scroll_distance"));

        assert!(!Error::NotInitialized.is_initialization_failure());
        assert!(!Error::InvalidHour(24).is_initialization_failure());

        let negative = Error::InvalidDelta {
            field: "key_count",
            value: -4.0,
        };
        assert!(!negative.is_initialization_failure());
        assert_eq!(negative.to_string(), "invalid key_count delta: -4");
    }
}
