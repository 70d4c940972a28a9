//! Trading calendar seam.
//!
//! The store consumes a calendar as a black box: "is this day a session?" and
//! "which sessions lie in `[start, end]`?". Every gap and consistency check in
//! the writer, and every offset in the reader, is expressed in sessions of the
//! one calendar a dataset is bound to.

pub mod file;
pub mod sessions;

pub use file::SessionFileCalendar;
pub use sessions::SessionList;

use crate::config::CalendarConfig;
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Calendar service consumed by the writer and reader.
pub trait TradingCalendar: Send + Sync {
    /// Identifier of the calendar (e.g. "XNYS").
    fn name(&self) -> &str;

    fn is_session(&self, day: NaiveDate) -> bool;

    /// Ordered sessions in the closed interval `[start, end]`.
    fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;

    /// Number of sessions in `[start, end]`.
    fn session_count(&self, start: NaiveDate, end: NaiveDate) -> usize {
        self.sessions_in_range(start, end).len()
    }
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("unknown calendar '{0}'")]
    Unknown(String),

    #[error("failed to read sessions file {path}: {reason}")]
    SessionsFile { path: String, reason: String },
}

/// Monday–Friday sessions minus an explicit holiday set.
#[derive(Debug, Clone)]
pub struct WeekdayCalendar {
    name: String,
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holidays: BTreeSet::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_session(&self, day: NaiveDate) -> bool {
        !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&day)
    }

    fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if start > end {
            return Vec::new();
        }
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_session(*d))
            .collect()
    }
}

/// Resolve the calendar a dataset is bound to.
///
/// A configured sessions file wins; otherwise the weekday rule with the
/// configured holidays is used under the configured name.
pub fn from_config(config: &CalendarConfig) -> Result<Arc<dyn TradingCalendar>, CalendarError> {
    if config.name.trim().is_empty() {
        return Err(CalendarError::Unknown(config.name.clone()));
    }
    match &config.sessions_file {
        Some(path) => Ok(Arc::new(SessionFileCalendar::from_path(&config.name, path)?)),
        None => Ok(Arc::new(
            WeekdayCalendar::new(config.name.clone()).with_holidays(config.holidays.iter().copied()),
        )),
    }
}
