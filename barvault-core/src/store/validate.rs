//! Session consistency and edge-adjacency checks.

use crate::calendar::TradingCalendar;
use crate::domain::{AssetId, DailyBar};
use crate::error::{EdgeViolation, StoreError};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Session count of the closed interval between a new segment's boundary
/// row and the stored boundary row when the two are adjacent sessions.
pub const REQUIRED_ADJACENT_SESSION_GAP: usize = 2;

/// Which side of the stored span a new segment attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentEdge {
    Before,
    After,
}

impl fmt::Display for SegmentEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentEdge::Before => f.write_str("before"),
            SegmentEdge::After => f.write_str("after"),
        }
    }
}

/// Outcome of comparing a block of rows with the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub consistent: bool,
    pub expected: usize,
    pub actual: usize,
    pub missing: Vec<NaiveDate>,
    pub extra: Vec<NaiveDate>,
}

impl SessionReport {
    fn trivially_consistent() -> Self {
        Self {
            consistent: true,
            expected: 0,
            actual: 0,
            missing: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Error form of an inconsistent report for `bars`.
    pub fn to_error(&self, asset: AssetId, bars: &[DailyBar]) -> Option<StoreError> {
        if self.consistent {
            return None;
        }
        let (first, last) = (bars.first()?, bars.last()?);
        Some(StoreError::InconsistentSessions {
            asset,
            first_day: first.day,
            last_day: last.day,
            expected: self.expected,
            actual: self.actual,
            missing: self.missing.clone(),
            extra: self.extra.clone(),
        })
    }
}

/// Check that `bars` (sorted by day, no repeats) cover exactly the sessions
/// between their first and last day.
///
/// The row count must match the session count, and the day sets must agree.
/// An empty slice is consistent.
pub fn check_sessions(bars: &[DailyBar], calendar: &dyn TradingCalendar) -> SessionReport {
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return SessionReport::trivially_consistent();
    };

    let expected = calendar.sessions_in_range(first.day, last.day);
    let expected_set: BTreeSet<NaiveDate> = expected.iter().copied().collect();
    let actual_set: BTreeSet<NaiveDate> = bars.iter().map(|b| b.day).collect();

    let missing: Vec<NaiveDate> = expected_set.difference(&actual_set).copied().collect();
    let extra: Vec<NaiveDate> = actual_set.difference(&expected_set).copied().collect();

    SessionReport {
        consistent: expected.len() == bars.len() && missing.is_empty() && extra.is_empty(),
        expected: expected.len(),
        actual: bars.len(),
        missing,
        extra,
    }
}

/// Sessions in the closed interval spanned by `a` and `b`, in either order.
pub fn session_distance(calendar: &dyn TradingCalendar, a: NaiveDate, b: NaiveDate) -> usize {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    calendar.session_count(lo, hi)
}

/// Check that a segment's boundary day sits exactly one session away from
/// the stored boundary day.
///
/// For `Before` the boundary is the segment's last day against the stored
/// first day; for `After` it is the segment's first day against the stored
/// last day.
pub fn check_adjacent(
    calendar: &dyn TradingCalendar,
    edge: SegmentEdge,
    segment_boundary: NaiveDate,
    stored_boundary: NaiveDate,
) -> Result<(), EdgeViolation> {
    let distance = session_distance(calendar, segment_boundary, stored_boundary);
    if distance == REQUIRED_ADJACENT_SESSION_GAP {
        Ok(())
    } else {
        Err(EdgeViolation::Gap {
            edge,
            distance,
            required: REQUIRED_ADJACENT_SESSION_GAP,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WeekdayCalendar;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(day: &str) -> DailyBar {
        DailyBar {
            asset: AssetId(1),
            day: d(day),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
        }
    }

    #[test]
    fn empty_slice_is_consistent() {
        let cal = WeekdayCalendar::new("XNYS");
        let report = check_sessions(&[], &cal);
        assert!(report.consistent);
        assert_eq!(report.actual, 0);
    }

    #[test]
    fn full_week_is_consistent() {
        let cal = WeekdayCalendar::new("XNYS");
        let bars: Vec<DailyBar> = ["2024-01-08", "2024-01-09", "2024-01-10", "2024-01-11", "2024-01-12"]
            .iter()
            .map(|s| bar(s))
            .collect();
        let report = check_sessions(&bars, &cal);
        assert!(report.consistent);
        assert_eq!(report.expected, 5);
    }

    #[test]
    fn missing_session_is_reported() {
        let cal = WeekdayCalendar::new("XNYS");
        let bars = vec![bar("2024-01-08"), bar("2024-01-10")];
        let report = check_sessions(&bars, &cal);
        assert!(!report.consistent);
        assert_eq!(report.missing, vec![d("2024-01-09")]);
        assert!(report.extra.is_empty());

        let err = report.to_error(AssetId(1), &bars).unwrap();
        assert!(matches!(err, StoreError::InconsistentSessions { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn weekend_row_is_extra() {
        let cal = WeekdayCalendar::new("XNYS");
        let bars = vec![bar("2024-01-12"), bar("2024-01-13"), bar("2024-01-15")];
        let report = check_sessions(&bars, &cal);
        assert!(!report.consistent);
        assert_eq!(report.extra, vec![d("2024-01-13")]);
    }

    #[test]
    fn adjacent_sessions_have_distance_two() {
        let cal = WeekdayCalendar::new("XNYS");
        // Friday -> Monday across a weekend.
        assert_eq!(session_distance(&cal, d("2024-01-12"), d("2024-01-15")), 2);
        assert!(check_adjacent(&cal, SegmentEdge::After, d("2024-01-16"), d("2024-01-15")).is_ok());
    }

    #[test]
    fn skipped_session_is_gap_violation() {
        let cal = WeekdayCalendar::new("XNYS");
        // Stored ends Monday, segment starts Wednesday.
        let result = check_adjacent(&cal, SegmentEdge::After, d("2024-01-17"), d("2024-01-15"));
        assert_eq!(
            result,
            Err(EdgeViolation::Gap {
                edge: SegmentEdge::After,
                distance: 3,
                required: REQUIRED_ADJACENT_SESSION_GAP,
            })
        );
    }

    #[test]
    fn same_day_is_not_adjacent() {
        let cal = WeekdayCalendar::new("XNYS");
        assert!(check_adjacent(&cal, SegmentEdge::Before, d("2024-01-15"), d("2024-01-15")).is_err());
    }
}
