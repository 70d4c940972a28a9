//! Daily-bar reader: dense range reads and point lookups.
//!
//! Row positions come from the offset index; a range read turns the
//! requested days into dataset session positions, plans one row slice per
//! asset and copies those rows into a `(sessions, assets)` tape.

use crate::calendar::{SessionList, TradingCalendar};
use crate::domain::{AssetId, BarField, DatasetHash};
use crate::error::{StoreError, StoreResult};
use crate::store::cache::DatasetCache;
use crate::store::index::{OffsetIndex, RowSlice};
use crate::store::row_store::{AssetSpan, RowStore};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Dense row-major `(sessions, assets)` array for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Tape {
    field: BarField,
    days: Vec<NaiveDate>,
    cols: usize,
    values: Vec<f64>,
}

impl Tape {
    fn filled(field: BarField, days: Vec<NaiveDate>, cols: usize) -> Self {
        let values = vec![field.missing_value(); days.len() * cols];
        Self {
            field,
            days,
            cols,
            values,
        }
    }

    pub fn field(&self) -> BarField {
        self.field
    }

    /// Sessions labelling the rows.
    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.days.len(), self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if col >= self.cols {
            return None;
        }
        self.values.get(row * self.cols + col).copied()
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = (row * self.cols).min(self.values.len());
        let end = (start + self.cols).min(self.values.len());
        &self.values[start..end]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.days.len())
            .filter_map(|row| self.get(row, col))
            .collect()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn place(&mut self, row: usize, col: usize, stored: f64) {
        let cols = self.cols;
        if let Some(cell) = self.values.get_mut(row * cols + col) {
            *cell = self.field.present(stored);
        }
    }
}

/// Where a planned read lands in the output tapes.
struct ReadPlan {
    days: Vec<NaiveDate>,
    /// First tape row covered by the dataset sessions.
    row_offset: usize,
    slices: Vec<Option<RowSlice>>,
}

pub struct DailyBarReader {
    store: Mutex<RowStore>,
    calendar: Arc<dyn TradingCalendar>,
    cache: Arc<DatasetCache>,
    read_all_threshold: usize,
}

impl DailyBarReader {
    pub fn new(
        store: RowStore,
        calendar: Arc<dyn TradingCalendar>,
        cache: Arc<DatasetCache>,
        read_all_threshold: usize,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            calendar,
            cache,
            read_all_threshold,
        }
    }

    pub fn calendar(&self) -> &dyn TradingCalendar {
        self.calendar.as_ref()
    }

    pub fn read_all_threshold(&self) -> usize {
        self.read_all_threshold
    }

    fn store(&self) -> MutexGuard<'_, RowStore> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Calendar sessions between the first and last stored day.
    pub fn sessions(&self) -> StoreResult<Arc<SessionList>> {
        self.cache.sessions_or_load(|| {
            let bounds = self.store().day_bounds()?;
            Ok(match bounds {
                Some((lo, hi)) => SessionList::new(self.calendar.sessions_in_range(lo, hi)),
                None => SessionList::empty(),
            })
        })
    }

    pub fn offset_index(&self) -> StoreResult<Arc<OffsetIndex>> {
        let sessions = self.sessions()?;
        self.cache.index_or_load(|| {
            let spans = self.store().asset_spans()?;
            OffsetIndex::build(&spans, &sessions, self.calendar.name())
        })
    }

    pub fn first_trading_day(&self) -> StoreResult<Option<NaiveDate>> {
        Ok(self.sessions()?.first())
    }

    pub fn last_available_dt(&self) -> StoreResult<Option<NaiveDate>> {
        Ok(self.sessions()?.last())
    }

    pub fn asset_spans(&self) -> StoreResult<Vec<AssetSpan>> {
        self.store().asset_spans()
    }

    pub fn dataset_hash(&self) -> StoreResult<DatasetHash> {
        self.store().content_hash()
    }

    /// `"USD"` for every asset with stored rows, `None` otherwise.
    pub fn currency_codes(&self, assets: &[AssetId]) -> StoreResult<Vec<Option<String>>> {
        let index = self.offset_index()?;
        Ok(assets
            .iter()
            .map(|asset| index.contains(*asset).then(|| "USD".to_string()))
            .collect())
    }

    /// One tape per requested field, shaped `(calendar sessions in
    /// [start, end], assets.len())`.
    ///
    /// Cells with no stored row hold NaN for prices and 0 for volume; stored
    /// prices of exactly 0 are served as NaN.
    pub fn load_raw_arrays(
        &self,
        columns: &[BarField],
        start: NaiveDate,
        end: NaiveDate,
        assets: &[AssetId],
    ) -> StoreResult<Vec<Tape>> {
        let index = self.offset_index()?;
        let plan = self.plan(&index, start, end, assets)?;

        if assets.len() > self.read_all_threshold {
            self.read_bulk(columns, assets, &plan)
        } else {
            self.read_per_asset(columns, assets, &index, &plan)
        }
    }

    fn plan(
        &self,
        index: &OffsetIndex,
        start: NaiveDate,
        end: NaiveDate,
        assets: &[AssetId],
    ) -> StoreResult<ReadPlan> {
        let sessions = self.sessions()?;
        let days = self.calendar.sessions_in_range(start, end);
        let covered = sessions.between(start, end);

        let (Some(first), Some(last)) = (covered.first(), covered.last()) else {
            return Ok(ReadPlan {
                days,
                row_offset: 0,
                slices: vec![None; assets.len()],
            });
        };
        let not_found = |day: NaiveDate| StoreError::NoDataOnDate { day };
        let start_idx = sessions.index_of(*first).ok_or_else(|| not_found(*first))?;
        let end_idx = sessions.index_of(*last).ok_or_else(|| not_found(*last))?;
        let row_offset = days.partition_point(|d| d < first);

        Ok(ReadPlan {
            days,
            row_offset,
            slices: index.compute_slices(start_idx, end_idx, assets),
        })
    }

    /// Whole columns from the cache, sliced by the plan.
    fn read_bulk(
        &self,
        columns: &[BarField],
        assets: &[AssetId],
        plan: &ReadPlan,
    ) -> StoreResult<Vec<Tape>> {
        let loaded = columns
            .iter()
            .map(|&field| {
                let column = self
                    .cache
                    .column_or_load(field, || self.store().read_column(field))?;
                Ok((field, column))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        debug!(columns = loaded.len(), assets = assets.len(), "bulk read");

        Ok(loaded
            .par_iter()
            .map(|(field, column)| {
                let mut tape = Tape::filled(*field, plan.days.clone(), assets.len());
                for (col, slice) in plan.slices.iter().enumerate() {
                    let Some(slice) = slice else { continue };
                    let rows = column
                        .get(slice.first_row..=slice.last_row)
                        .unwrap_or_default();
                    let base = plan.row_offset + slice.output_offset;
                    for (k, value) in rows.iter().enumerate() {
                        tape.place(base + k, col, *value);
                    }
                }
                tape
            })
            .collect())
    }

    /// One bounded query per asset and field.
    fn read_per_asset(
        &self,
        columns: &[BarField],
        assets: &[AssetId],
        index: &OffsetIndex,
        plan: &ReadPlan,
    ) -> StoreResult<Vec<Tape>> {
        let store = self.store();
        columns
            .iter()
            .map(|&field| {
                let mut tape = Tape::filled(field, plan.days.clone(), assets.len());
                for (col, (asset, slice)) in assets.iter().zip(&plan.slices).enumerate() {
                    let (Some(slice), Some(offsets)) = (slice, index.get(*asset)) else {
                        continue;
                    };
                    let rows = store.read_asset_rows(
                        *asset,
                        field,
                        slice.first_row - offsets.first_row,
                        slice.row_count(),
                    )?;
                    let base = plan.row_offset + slice.output_offset;
                    for (k, value) in rows.into_iter().enumerate() {
                        tape.place(base + k, col, value);
                    }
                }
                Ok(tape)
            })
            .collect()
    }

    /// Logical row position of `asset` on `day`.
    pub fn sid_day_index(&self, asset: AssetId, day: NaiveDate) -> StoreResult<usize> {
        let sessions = self.sessions()?;
        let index = self.offset_index()?;
        let day_loc = sessions
            .index_of(day)
            .ok_or(StoreError::NoDataOnDate { day })?;
        let offsets = index
            .get(asset)
            .ok_or(StoreError::NoDataForAsset { asset })?;
        if day_loc < offsets.calendar_offset {
            return Err(StoreError::NoDataBeforeDate { asset, day });
        }
        let ix = offsets.first_row + (day_loc - offsets.calendar_offset);
        if ix > offsets.last_row {
            return Err(StoreError::NoDataAfterDate { asset, day });
        }
        Ok(ix)
    }

    fn stored_value(
        &self,
        asset: AssetId,
        day: NaiveDate,
        ix: usize,
        field: BarField,
    ) -> StoreResult<f64> {
        if let Some(value) = self
            .cache
            .cached_column(field)
            .and_then(|column| column.get(ix).copied())
        {
            return Ok(value);
        }
        self.store()
            .point_value(asset, day, field)?
            .ok_or(StoreError::NoDataOnDate { day })
    }

    /// Value of one field for one asset on one session.
    pub fn get_value(&self, asset: AssetId, day: NaiveDate, field: BarField) -> StoreResult<f64> {
        let ix = self.sid_day_index(asset, day)?;
        Ok(field.present(self.stored_value(asset, day, ix, field)?))
    }

    /// Latest session on or before `day` with nonzero volume.
    pub fn get_last_traded_dt(
        &self,
        asset: AssetId,
        day: NaiveDate,
    ) -> StoreResult<Option<NaiveDate>> {
        let sessions = self.sessions()?;
        let index = self.offset_index()?;
        let offsets = *index
            .get(asset)
            .ok_or(StoreError::NoDataForAsset { asset })?;

        let mut search = match sessions.index_of(day) {
            Some(loc) => loc,
            None => return Ok(None),
        };
        if search < offsets.calendar_offset {
            return Ok(None);
        }
        search = search.min(offsets.calendar_end());

        loop {
            let search_day = sessions
                .get(search)
                .ok_or(StoreError::NoDataOnDate { day })?;
            let ix = offsets.first_row + (search - offsets.calendar_offset);
            if self.stored_value(asset, search_day, ix, BarField::Volume)? != 0.0 {
                return Ok(Some(search_day));
            }
            if search == offsets.calendar_offset {
                return Ok(None);
            }
            search -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn tape_fills_by_field() {
        let days = vec![d("2024-01-02"), d("2024-01-03")];
        let mut price = Tape::filled(BarField::Close, days.clone(), 3);
        assert_eq!(price.shape(), (2, 3));
        assert!(price.get(1, 2).unwrap().is_nan());
        price.place(1, 2, 12.5);
        price.place(0, 0, 0.0);
        assert_eq!(price.get(1, 2), Some(12.5));
        assert!(price.get(0, 0).unwrap().is_nan());
        assert_eq!(price.get(0, 3), None);

        let mut volume = Tape::filled(BarField::Volume, days, 2);
        assert_eq!(volume.row(0), &[0.0, 0.0]);
        volume.place(0, 1, 0.0);
        volume.place(1, 1, 7.0);
        assert_eq!(volume.column(1), vec![0.0, 7.0]);
    }
}
