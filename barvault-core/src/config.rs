//! Resolved store configuration.
//!
//! The core takes exactly one of these; any environment or file fallback
//! logic happens before it is built.

use crate::store::InvalidDataBehavior;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Assets above which reads switch to the bulk (whole-column) strategy.
pub const DEFAULT_READ_ALL_THRESHOLD: usize = 3000;

/// Configuration for one dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// SQLite database file holding the `ohlcv_daily` table.
    pub database: PathBuf,

    #[serde(default = "default_read_all_threshold")]
    pub read_all_threshold: usize,

    /// Default disposition for invalid data when the caller does not pass one.
    #[serde(default)]
    pub invalid_data_behavior: InvalidDataBehavior,

    pub calendar: CalendarConfig,
}

/// Which calendar the dataset is aligned to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarConfig {
    pub name: String,

    /// Non-session weekdays for the weekday calendar.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,

    /// Explicit session list (CSV); overrides the weekday rule when set.
    #[serde(default)]
    pub sessions_file: Option<PathBuf>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            name: "XNYS".into(),
            holidays: Vec::new(),
            sessions_file: None,
        }
    }
}

fn default_read_all_threshold() -> usize {
    DEFAULT_READ_ALL_THRESHOLD
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl StoreConfig {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            read_all_threshold: DEFAULT_READ_ALL_THRESHOLD,
            invalid_data_behavior: InvalidDataBehavior::default(),
            calendar: CalendarConfig::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database path is empty".into()));
        }
        if self.calendar.name.trim().is_empty() {
            return Err(ConfigError::Invalid("calendar name is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = StoreConfig::from_toml(
            r#"
database = "bundles/daily.sqlite"

[calendar]
name = "XNYS"
"#,
        )
        .unwrap();
        assert_eq!(config.read_all_threshold, DEFAULT_READ_ALL_THRESHOLD);
        assert_eq!(config.invalid_data_behavior, InvalidDataBehavior::Warn);
        assert!(config.calendar.holidays.is_empty());
    }

    #[test]
    fn full_toml_parses() {
        let config = StoreConfig::from_toml(
            r#"
database = "daily.sqlite"
read_all_threshold = 10
invalid_data_behavior = "raise"

[calendar]
name = "XNYS"
holidays = ["2024-01-01", "2024-01-15"]
"#,
        )
        .unwrap();
        assert_eq!(config.read_all_threshold, 10);
        assert_eq!(config.invalid_data_behavior, InvalidDataBehavior::Raise);
        assert_eq!(config.calendar.holidays.len(), 2);
    }

    #[test]
    fn empty_calendar_name_is_invalid() {
        let result = StoreConfig::from_toml(
            r#"
database = "daily.sqlite"
[calendar]
name = ""
"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn toml_roundtrip() {
        let config = StoreConfig::new("daily.sqlite");
        let parsed = StoreConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config, parsed);
    }
}
