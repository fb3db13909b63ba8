//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/odometer/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/odometer/` (~/.config/odometer/)
//! - Data: `$XDG_DATA_HOME/odometer/` (~/.local/share/odometer/)
//! - State/Logs: `$XDG_STATE_HOME/odometer/` (~/.local/state/odometer/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Store location and engine settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// History retention
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Producer-side buffering
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Override for the database file (defaults to the XDG data directory)
    pub database_path: Option<PathBuf>,

    /// How long a statement waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Retention configuration
///
/// `days <= 0` keeps history forever.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Days of history to keep
    #[serde(default)]
    pub days: i64,

    /// Minimum hours between two scheduled cleanups
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: 0,
            check_interval_hours: default_check_interval_hours(),
        }
    }
}

impl RetentionConfig {
    /// True when history is never deleted.
    pub fn keeps_forever(&self) -> bool {
        self.days <= 0
    }
}

fn default_check_interval_hours() -> u64 {
    24
}

/// Recorder configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Number of buffered events that forces a flush (1 = write-through)
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            flush_every: default_flush_every(),
        }
    }
}

fn default_flush_every() -> usize {
    1
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.storage.busy_timeout_ms == 0 {
            return Err(Error::Config(
                "storage.busy_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.recorder.flush_every == 0 {
            return Err(Error::Config(
                "recorder.flush_every must be at least 1".to_string(),
            ));
        }
        if self.retention.check_interval_hours == 0 {
            return Err(Error::Config(
                "retention.check_interval_hours must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Database file to open: the configured override or the XDG default.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/odometer/config.toml` (~/.config/odometer/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("odometer").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/odometer/` (~/.local/share/odometer/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("odometer")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/odometer/` (~/.local/state/odometer/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("odometer")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/odometer/odometer.db` (~/.local/share/odometer/odometer.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("odometer.db")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
