//! Structured error types for the bar store.
//!
//! Write-time validation failures (`CorruptedData`, `InconsistentSessions`,
//! `OverlapOrGapViolation`, `DuplicateDays`, `MalformedBars`) are surfaced
//! only when the caller asks for `InvalidDataBehavior::Raise`; otherwise
//! they are logged and the offending segment is dropped. Query failures are always surfaced.

use crate::calendar::CalendarError;
use crate::domain::AssetId;
use crate::store::validate::SegmentEdge;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no bar store at {path}; run `init` or open a writer first")]
    StoreNotFound { path: String },

    #[error("failed to create bar store at {path}: {reason}")]
    Bootstrap { path: String, reason: String },

    #[error("corrupted data for asset {asset}: missing or unreadable columns {missing_columns:?}")]
    CorruptedData {
        asset: AssetId,
        missing_columns: Vec<String>,
    },

    #[error("asset {asset}: unusable day index: {reason}")]
    UnsupportedIndex { asset: AssetId, reason: String },

    #[error("asset {asset}: malformed bar sequence: {reason}")]
    MalformedBars { asset: AssetId, reason: String },

    #[error("asset {asset}: duplicate days {days:?}")]
    DuplicateDays { asset: AssetId, days: Vec<NaiveDate> },

    #[error(
        "asset {asset}: got {actual} rows for {first_day}..{last_day}, expected {expected}; \
         missing sessions {missing:?}, extra sessions {extra:?}"
    )]
    InconsistentSessions {
        asset: AssetId,
        first_day: NaiveDate,
        last_day: NaiveDate,
        expected: usize,
        actual: usize,
        missing: Vec<NaiveDate>,
        extra: Vec<NaiveDate>,
    },

    #[error("asset {asset}: {violation}")]
    OverlapOrGapViolation {
        asset: AssetId,
        violation: EdgeViolation,
    },

    #[error("no data on {day}: outside the dataset sessions")]
    NoDataOnDate { day: NaiveDate },

    #[error("no data on or before {day} for asset {asset}")]
    NoDataBeforeDate { asset: AssetId, day: NaiveDate },

    #[error("no data on or after {day} for asset {asset}")]
    NoDataAfterDate { asset: AssetId, day: NaiveDate },

    #[error("no data for asset {asset}")]
    NoDataForAsset { asset: AssetId },

    #[error("asset {asset}: first day {day} is not a session of calendar '{calendar}'")]
    CalendarLookupFailure {
        asset: AssetId,
        day: NaiveDate,
        calendar: String,
    },

    #[error("{day} is not a session of calendar '{calendar}'")]
    InvalidSession { day: NaiveDate, calendar: String },

    #[error("calendar: {0}")]
    Calendar(#[from] CalendarError),

    #[error("data frame: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("failed to ingest {path}: {reason}")]
    Ingest { path: String, reason: String },
}

/// Why an edge-extension segment could not be attached to existing rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeViolation {
    /// New rows fall inside the already-stored span.
    Overlap {
        rows: usize,
        stored_first: NaiveDate,
        stored_last: NaiveDate,
    },
    /// The segment does not sit exactly one session away from stored data.
    Gap {
        edge: SegmentEdge,
        distance: usize,
        required: usize,
    },
}

impl fmt::Display for EdgeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeViolation::Overlap {
                rows,
                stored_first,
                stored_last,
            } => write!(
                f,
                "{rows} rows overlap stored span {stored_first}..{stored_last}"
            ),
            EdgeViolation::Gap {
                edge,
                distance,
                required,
            } => write!(
                f,
                "{edge} segment has session distance {distance}, required {required}"
            ),
        }
    }
}

impl StoreError {
    /// True for failures produced by write-time validation, which the
    /// `InvalidDataBehavior` policy may downgrade to a dropped segment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::CorruptedData { .. }
                | StoreError::UnsupportedIndex { .. }
                | StoreError::MalformedBars { .. }
                | StoreError::DuplicateDays { .. }
                | StoreError::InconsistentSessions { .. }
                | StoreError::OverlapOrGapViolation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_write_checks_are_policy_governed() {
        let asset = AssetId(1);
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        assert!(StoreError::DuplicateDays { asset, days: vec![day] }.is_validation());
        assert!(StoreError::CorruptedData {
            asset,
            missing_columns: vec!["close".into()],
        }
        .is_validation());
        assert!(StoreError::MalformedBars {
            asset,
            reason: "unsorted".into(),
        }
        .is_validation());
        assert!(!StoreError::NoDataForAsset { asset }.is_validation());
        assert!(!StoreError::StoreNotFound { path: "x".into() }.is_validation());
    }
}
