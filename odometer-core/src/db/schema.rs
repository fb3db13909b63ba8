//! Database schema and migrations
//!
//! Applied versions are recorded one row per step in `schema_version`. A
//! store without that table is at version 0. Every step checks what already
//! exists (`sqlite_master`, `pragma_table_info`) before touching it, and every
//! step runs on every startup: the recorded version only decides what gets
//! logged. A store that was partially migrated, edited by hand, or written by
//! the older `*_stats` layout (which keeps its own `schema_version` rows)
//! converges on the same final layout.

use crate::error::{Error, Result};
use crate::keys::canonical_key;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// Current schema version
pub const SCHEMA_VERSION: i64 = 6;

struct Migration {
    version: i64,
    description: &'static str,
    apply: fn(&Connection) -> rusqlite::Result<()>,
}

/// Migrations in strictly increasing version order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "daily aggregates",
        apply: create_daily_aggregate,
    },
    Migration {
        version: 2,
        description: "hourly aggregates",
        apply: create_hourly_aggregate,
    },
    Migration {
        version: 3,
        description: "per-key counts",
        apply: create_key_count,
    },
    Migration {
        version: 4,
        description: "middle clicks and scroll distance",
        apply: add_middle_clicks_and_scroll,
    },
    Migration {
        version: 5,
        description: "application usage",
        apply: create_app_usage,
    },
    Migration {
        version: 6,
        description: "import legacy *_stats tables",
        apply: import_legacy_tables,
    },
];

/// Columns that must exist once every migration has run.
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("schema_version", &["version", "applied_at"]),
    (
        "daily_aggregate",
        &[
            "date",
            "key_count",
            "mouse_distance",
            "left_clicks",
            "right_clicks",
            "middle_clicks",
            "scroll_distance",
        ],
    ),
    (
        "hourly_aggregate",
        &[
            "date",
            "hour",
            "key_count",
            "mouse_distance",
            "left_clicks",
            "right_clicks",
            "middle_clicks",
            "scroll_distance",
        ],
    ),
    ("key_count", &["date", "hour", "key_identifier", "count"]),
    ("app_usage", &["date", "hour", "app_name", "seconds_used"]),
];

// ============================================
// Introspection helpers
// ============================================

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |r| r.get(0),
    )
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |r| r.get(0),
    )
}

fn add_column_if_absent(
    conn: &Connection,
    table: &str,
    column: &str,
    declaration: &str,
) -> rusqlite::Result<()> {
    if !column_exists(conn, table, column)? {
        tracing::debug!(table, column, "Adding column");
        conn.execute(
            &format!("ALTER TABLE {table} ADD COLUMN {column} {declaration}"),
            [],
        )?;
    }
    Ok(())
}

/// `column` if the legacy table has it, otherwise a literal default.
fn legacy_column(
    conn: &Connection,
    table: &str,
    column: &str,
    fallback: &'static str,
) -> rusqlite::Result<String> {
    Ok(if column_exists(conn, table, column)? {
        column.to_string()
    } else {
        fallback.to_string()
    })
}

// ============================================
// Migration steps
// ============================================

fn create_daily_aggregate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS daily_aggregate (
            date             TEXT PRIMARY KEY,    -- YYYY-MM-DD, local time
            key_count        INTEGER NOT NULL DEFAULT 0,
            mouse_distance   REAL NOT NULL DEFAULT 0,
            left_clicks      INTEGER NOT NULL DEFAULT 0,
            right_clicks     INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
}

fn create_hourly_aggregate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS hourly_aggregate (
            date             TEXT NOT NULL,
            hour             INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
            key_count        INTEGER NOT NULL DEFAULT 0,
            mouse_distance   REAL NOT NULL DEFAULT 0,
            left_clicks      INTEGER NOT NULL DEFAULT 0,
            right_clicks     INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (date, hour)
        );
        "#,
    )
}

fn create_key_count(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS key_count (
            date             TEXT NOT NULL,
            hour             INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
            key_identifier   TEXT NOT NULL,
            count            INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (date, hour, key_identifier)
        );

        CREATE INDEX IF NOT EXISTS idx_key_count_key ON key_count(key_identifier);
        "#,
    )
}

fn add_middle_clicks_and_scroll(conn: &Connection) -> rusqlite::Result<()> {
    for table in ["daily_aggregate", "hourly_aggregate"] {
        add_column_if_absent(conn, table, "middle_clicks", "INTEGER NOT NULL DEFAULT 0")?;
        add_column_if_absent(conn, table, "scroll_distance", "REAL NOT NULL DEFAULT 0")?;
    }
    Ok(())
}

fn create_app_usage(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS app_usage (
            date             TEXT NOT NULL,
            hour             INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
            app_name         TEXT NOT NULL,
            seconds_used     INTEGER NOT NULL DEFAULT 0,

            PRIMARY KEY (date, hour, app_name)
        );

        CREATE INDEX IF NOT EXISTS idx_app_usage_date ON app_usage(date);
        CREATE INDEX IF NOT EXISTS idx_app_usage_app ON app_usage(app_name);
        "#,
    )
}

/// Fold tables from the older layout (`daily_stats`, `hourly_stats`,
/// `key_stats`, `app_usage_stats` and their views) into the current tables.
///
/// Rows are added, not replaced, and key codes are canonicalized on the way
/// in. Legacy tables are dropped once copied.
fn import_legacy_tables(conn: &Connection) -> rusqlite::Result<()> {
    for view in [
        "app_usage_daily",
        "app_usage_weekly",
        "app_usage_monthly",
        "app_usage_lifetime",
    ] {
        conn.execute(&format!("DROP VIEW IF EXISTS {view}"), [])?;
    }

    if table_exists(conn, "daily_stats")? {
        let middle = legacy_column(conn, "daily_stats", "middle_clicks", "0")?;
        let scroll = legacy_column(conn, "daily_stats", "scroll_distance", "0.0")?;
        let copied = conn.execute(
            &format!(
                r#"
                INSERT INTO daily_aggregate (date, key_count, mouse_distance, left_clicks,
                                             right_clicks, middle_clicks, scroll_distance)
                SELECT date, COALESCE(key_count, 0), COALESCE(mouse_distance, 0),
                       COALESCE(left_clicks, 0), COALESCE(right_clicks, 0),
                       COALESCE({middle}, 0), COALESCE({scroll}, 0)
                FROM daily_stats WHERE date IS NOT NULL
                ON CONFLICT(date) DO UPDATE SET
                    key_count = key_count + excluded.key_count,
                    mouse_distance = mouse_distance + excluded.mouse_distance,
                    left_clicks = left_clicks + excluded.left_clicks,
                    right_clicks = right_clicks + excluded.right_clicks,
                    middle_clicks = middle_clicks + excluded.middle_clicks,
                    scroll_distance = scroll_distance + excluded.scroll_distance
                "#
            ),
            [],
        )?;
        conn.execute("DROP TABLE daily_stats", [])?;
        tracing::info!(rows = copied, "Imported legacy daily_stats");
    }

    if table_exists(conn, "hourly_stats")? {
        let middle = legacy_column(conn, "hourly_stats", "middle_clicks", "0")?;
        let scroll = legacy_column(conn, "hourly_stats", "scroll_distance", "0.0")?;
        let copied = conn.execute(
            &format!(
                r#"
                INSERT INTO hourly_aggregate (date, hour, key_count, mouse_distance, left_clicks,
                                              right_clicks, middle_clicks, scroll_distance)
                SELECT date, hour, COALESCE(key_count, 0), COALESCE(mouse_distance, 0),
                       COALESCE(left_clicks, 0), COALESCE(right_clicks, 0),
                       COALESCE({middle}, 0), COALESCE({scroll}, 0)
                FROM hourly_stats WHERE date IS NOT NULL AND hour BETWEEN 0 AND 23
                ON CONFLICT(date, hour) DO UPDATE SET
                    key_count = key_count + excluded.key_count,
                    mouse_distance = mouse_distance + excluded.mouse_distance,
                    left_clicks = left_clicks + excluded.left_clicks,
                    right_clicks = right_clicks + excluded.right_clicks,
                    middle_clicks = middle_clicks + excluded.middle_clicks,
                    scroll_distance = scroll_distance + excluded.scroll_distance
                "#
            ),
            [],
        )?;
        conn.execute("DROP TABLE hourly_stats", [])?;
        tracing::info!(rows = copied, "Imported legacy hourly_stats");
    }

    if table_exists(conn, "key_stats")? {
        let rows: Vec<(String, i64, String, i64)> = {
            let mut stmt = conn.prepare(
                r#"
                SELECT date, hour, key_code, COALESCE(count, 0)
                FROM key_stats
                WHERE date IS NOT NULL AND key_code IS NOT NULL AND hour BETWEEN 0 AND 23
                "#,
            )?;
            let mapped = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            mapped.collect::<rusqlite::Result<_>>()?
        };

        let mut upsert = conn.prepare(
            r#"
            INSERT INTO key_count (date, hour, key_identifier, count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(date, hour, key_identifier) DO UPDATE SET
                count = count + excluded.count
            "#,
        )?;
        for (date, hour, code, count) in &rows {
            let key = canonical_key(code);
            if key.is_empty() {
                continue;
            }
            upsert.execute(params![date, hour, key.as_ref(), count])?;
        }
        drop(upsert);

        conn.execute("DROP TABLE key_stats", [])?;
        tracing::info!(rows = rows.len(), "Imported legacy key_stats");
    }

    if table_exists(conn, "app_usage_stats")? {
        let copied = conn.execute(
            r#"
            INSERT INTO app_usage (date, hour, app_name, seconds_used)
            SELECT date, hour, app_name, COALESCE(seconds_used, 0)
            FROM app_usage_stats
            WHERE date IS NOT NULL AND app_name IS NOT NULL AND hour BETWEEN 0 AND 23
            ON CONFLICT(date, hour, app_name) DO UPDATE SET
                seconds_used = seconds_used + excluded.seconds_used
            "#,
            [],
        )?;
        conn.execute("DROP TABLE app_usage_stats", [])?;
        tracing::info!(rows = copied, "Imported legacy app_usage_stats");
    }

    Ok(())
}

// ============================================
// Runner
// ============================================

/// Run all pending migrations, then verify the resulting layout.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version          INTEGER PRIMARY KEY,
            applied_at       TEXT NOT NULL
        );
        "#,
    )
    .map_err(|source| Error::Migration { version: 0, source })?;

    for migration in MIGRATIONS {
        let version = migration.version;
        if version > current_version {
            tracing::info!(version, description = migration.description, "Running migration");
        } else {
            tracing::debug!(version, description = migration.description, "Re-checking migration");
        }

        let to_migration_error = |source: rusqlite::Error| Error::Migration { version, source };
        let tx = conn.transaction().map_err(to_migration_error)?;
        (migration.apply)(&tx).map_err(to_migration_error)?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().to_rfc3339()],
        )
        .map_err(to_migration_error)?;
        tx.commit().map_err(to_migration_error)?;
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    verify_schema(conn)
}

/// Fail with [`Error::SchemaIncomplete`] if any required column is missing.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for (table, columns) in REQUIRED_COLUMNS {
        for column in columns.iter() {
            if !column_exists(conn, table, column)? {
                tracing::error!(table, column, "Required schema element missing");
                return Err(Error::SchemaIncomplete {
                    table: (*table).to_string(),
                    column: (*column).to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Get the highest applied schema version; 0 when nothing was ever recorded.
pub fn get_schema_version(conn: &Connection) -> Result<i64> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }
    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}
