//! Calendar backed by an explicit session list on disk.
//!
//! File format: CSV with a header row; the first column holds one session
//! per line as `YYYY-MM-DD`. Extra columns are ignored.

use super::{CalendarError, SessionList, TradingCalendar};
use chrono::NaiveDate;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SessionFileCalendar {
    name: String,
    sessions: SessionList,
}

impl SessionFileCalendar {
    pub fn new(name: impl Into<String>, sessions: SessionList) -> Self {
        Self {
            name: name.into(),
            sessions,
        }
    }

    pub fn from_path(name: &str, path: &Path) -> Result<Self, CalendarError> {
        let file_err = |reason: String| CalendarError::SessionsFile {
            path: path.display().to_string(),
            reason,
        };

        let mut reader = csv::Reader::from_path(path).map_err(|e| file_err(e.to_string()))?;
        let mut days = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| file_err(e.to_string()))?;
            let raw = record
                .get(0)
                .ok_or_else(|| file_err(format!("empty record at row {}", line + 1)))?;
            let day = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|e| file_err(format!("row {}: '{raw}': {e}", line + 1)))?;
            days.push(day);
        }

        Ok(Self::new(name, SessionList::new(days)))
    }

    pub fn sessions(&self) -> &SessionList {
        &self.sessions
    }
}

impl TradingCalendar for SessionFileCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_session(&self, day: NaiveDate) -> bool {
        self.sessions.contains(day)
    }

    fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.sessions.between(start, end).to_vec()
    }
}
