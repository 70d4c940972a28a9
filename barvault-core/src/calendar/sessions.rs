//! Ordered session list with O(log n) position lookup.

use chrono::NaiveDate;

/// Sorted, de-duplicated sequence of sessions.
///
/// The dataset session list spans the global `(min_day, max_day)` of the row
/// store; offsets into it are the "calendar offsets" of the offset index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionList {
    days: Vec<NaiveDate>,
}

impl SessionList {
    /// Build from arbitrary input; sorts and removes duplicates.
    pub fn new(mut days: Vec<NaiveDate>) -> Self {
        days.sort_unstable();
        days.dedup();
        Self { days }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.days.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.days.last().copied()
    }

    pub fn get(&self, idx: usize) -> Option<NaiveDate> {
        self.days.get(idx).copied()
    }

    pub fn as_slice(&self) -> &[NaiveDate] {
        &self.days
    }

    /// Position of `day` in the list, if it is a session.
    pub fn index_of(&self, day: NaiveDate) -> Option<usize> {
        self.days.binary_search(&day).ok()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.index_of(day).is_some()
    }

    /// Sessions at positions `start_idx..=end_idx`. Empty when the range is
    /// inverted or out of bounds.
    pub fn slice(&self, start_idx: usize, end_idx: usize) -> &[NaiveDate] {
        if start_idx > end_idx || end_idx >= self.days.len() {
            return &[];
        }
        &self.days[start_idx..=end_idx]
    }

    /// Sessions in the closed interval `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        if start > end {
            return &[];
        }
        let lo = self.days.partition_point(|d| *d < start);
        let hi = self.days.partition_point(|d| *d <= end);
        &self.days[lo..hi]
    }
}

impl From<Vec<NaiveDate>> for SessionList {
    fn from(days: Vec<NaiveDate>) -> Self {
        Self::new(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn new_sorts_and_dedupes() {
        let list = SessionList::new(vec![d("2024-01-03"), d("2024-01-02"), d("2024-01-03")]);
        assert_eq!(list.as_slice(), &[d("2024-01-02"), d("2024-01-03")]);
    }

    #[test]
    fn index_of_finds_sessions_only() {
        let list = SessionList::new(vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-05")]);
        assert_eq!(list.index_of(d("2024-01-05")), Some(2));
        assert_eq!(list.index_of(d("2024-01-04")), None);
    }

    #[test]
    fn slice_is_inclusive_and_bounds_checked() {
        let list = SessionList::new(vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04")]);
        assert_eq!(list.slice(1, 2).len(), 2);
        assert!(list.slice(2, 1).is_empty());
        assert!(list.slice(0, 3).is_empty());
    }

    #[test]
    fn between_clips_to_range() {
        let list = SessionList::new(vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04")]);
        assert_eq!(list.between(d("2024-01-01"), d("2024-01-03")).len(), 2);
        assert!(list.between(d("2024-01-05"), d("2024-01-01")).is_empty());
    }
}
