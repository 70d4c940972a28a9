//! Config resolution for the CLI.
//!
//! Priority: `--config` flag, then `BARVAULT_CONFIG`, then built-in defaults.
//! `BARVAULT_DATABASE` and `BARVAULT_CALENDAR` override single fields of
//! whichever config was picked.

use anyhow::{Context, Result};
use barvault_core::StoreConfig;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "BARVAULT_CONFIG";
pub const DATABASE_ENV: &str = "BARVAULT_DATABASE";
pub const CALENDAR_ENV: &str = "BARVAULT_CALENDAR";

pub const DEFAULT_DATABASE: &str = "data/daily.sqlite";

pub fn resolve(flag: Option<&Path>) -> Result<StoreConfig> {
    resolve_with(flag, |key| std::env::var(key).ok())
}

/// Same as [`resolve`] with an injectable environment lookup.
pub fn resolve_with<F>(flag: Option<&Path>, env: F) -> Result<StoreConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = env(CONFIG_ENV).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

    let mut config = match flag.map(Path::to_path_buf).or(from_env) {
        Some(path) => StoreConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::new(DEFAULT_DATABASE),
    };

    if let Some(database) = env(DATABASE_ENV).filter(|v| !v.trim().is_empty()) {
        config.database = PathBuf::from(database);
    }
    if let Some(calendar) = env(CALENDAR_ENV).filter(|v| !v.trim().is_empty()) {
        config.calendar.name = calendar;
    }

    config.validate()?;
    Ok(config)
}
