//! Offset index: where each asset's rows live in the logical row order and
//! which dataset session its first row falls on.

use crate::calendar::SessionList;
use crate::domain::AssetId;
use crate::error::{StoreError, StoreResult};
use crate::store::row_store::AssetSpan;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Row positions and calendar offset of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetOffsets {
    pub first_row: usize,
    pub last_row: usize,
    /// Position of the asset's first day in the dataset session list.
    pub calendar_offset: usize,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl AssetOffsets {
    pub fn row_count(&self) -> usize {
        self.last_row - self.first_row + 1
    }

    /// Session position of the asset's last row.
    pub fn calendar_end(&self) -> usize {
        self.calendar_offset + (self.last_row - self.first_row)
    }
}

/// Rows `first_row..=last_row` land in the output tape starting at
/// `output_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSlice {
    pub first_row: usize,
    pub last_row: usize,
    pub output_offset: usize,
}

impl RowSlice {
    pub fn row_count(&self) -> usize {
        self.last_row - self.first_row + 1
    }
}

#[derive(Debug, Clone, Default)]
pub struct OffsetIndex {
    offsets: HashMap<AssetId, AssetOffsets>,
    total_rows: usize,
}

impl OffsetIndex {
    /// Build from the per-asset aggregate (ascending by asset) and the
    /// dataset session list.
    ///
    /// Fails with `CalendarLookupFailure` when an asset's first day is not a
    /// dataset session.
    pub fn build(
        spans: &[AssetSpan],
        sessions: &SessionList,
        calendar_name: &str,
    ) -> StoreResult<Self> {
        let mut offsets = HashMap::with_capacity(spans.len());
        let mut running = 0usize;
        for span in spans.iter().filter(|s| s.rows > 0) {
            let calendar_offset =
                sessions
                    .index_of(span.first_day)
                    .ok_or_else(|| StoreError::CalendarLookupFailure {
                        asset: span.asset,
                        day: span.first_day,
                        calendar: calendar_name.to_string(),
                    })?;
            offsets.insert(
                span.asset,
                AssetOffsets {
                    first_row: running,
                    last_row: running + span.rows - 1,
                    calendar_offset,
                    first_day: span.first_day,
                    last_day: span.last_day,
                },
            );
            running += span.rows;
        }
        Ok(Self {
            offsets,
            total_rows: running,
        })
    }

    /// Index over hand-built entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (AssetId, AssetOffsets)>) -> Self {
        let offsets: HashMap<_, _> = entries.into_iter().collect();
        let total_rows = offsets.values().map(|o| o.row_count()).sum();
        Self {
            offsets,
            total_rows,
        }
    }

    pub fn get(&self, asset: AssetId) -> Option<&AssetOffsets> {
        self.offsets.get(&asset)
    }

    pub fn contains(&self, asset: AssetId) -> bool {
        self.offsets.contains_key(&asset)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Plan the rows each asset contributes to sessions
    /// `start_idx..=end_idx`.
    ///
    /// `None` for assets that are unknown or have no rows in the range.
    /// Constant work per asset.
    pub fn compute_slices(
        &self,
        start_idx: usize,
        end_idx: usize,
        assets: &[AssetId],
    ) -> Vec<Option<RowSlice>> {
        assets
            .iter()
            .map(|asset| {
                let o = self.offsets.get(asset)?;
                if start_idx > end_idx || start_idx > o.calendar_end() || end_idx < o.calendar_offset
                {
                    return None;
                }
                let leading = start_idx.saturating_sub(o.calendar_offset);
                let trailing = (end_idx - o.calendar_offset).min(o.last_row - o.first_row);
                Some(RowSlice {
                    first_row: o.first_row + leading,
                    last_row: o.first_row + trailing,
                    output_offset: o.calendar_offset.saturating_sub(start_idx),
                })
            })
            .collect()
    }
}
