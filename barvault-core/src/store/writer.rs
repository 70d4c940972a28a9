//! Daily-bar writer.
//!
//! Per asset: normalize, look up the stored span, then either validate the
//! whole table as a first write or split it into `before`/`after` edge
//! segments around the stored span. Rows inside the stored span are never
//! merged. Surviving segments for one asset commit in one transaction.

use crate::calendar::TradingCalendar;
use crate::data::{BarNormalizer, TableIngestor};
use crate::domain::{AssetId, DailyBar};
use crate::error::{EdgeViolation, StoreError, StoreResult};
use crate::store::cache::DatasetCache;
use crate::store::row_store::RowStore;
use crate::store::validate::{check_adjacent, check_sessions, SegmentEdge};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do with a table or segment that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidDataBehavior {
    /// Return the error and abort the asset's write.
    Raise,
    /// Log and drop the failing segment; other segments are still written.
    #[default]
    Warn,
    /// Drop the failing segment without logging.
    Ignore,
}

impl fmt::Display for InvalidDataBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidDataBehavior::Raise => "raise",
            InvalidDataBehavior::Warn => "warn",
            InvalidDataBehavior::Ignore => "ignore",
        })
    }
}

impl FromStr for InvalidDataBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(InvalidDataBehavior::Raise),
            "warn" => Ok(InvalidDataBehavior::Warn),
            "ignore" => Ok(InvalidDataBehavior::Ignore),
            other => Err(format!(
                "unknown invalid-data behavior '{other}' (expected raise, warn or ignore)"
            )),
        }
    }
}

/// Which part of an asset's input a dropped block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// The whole input table, rejected before splitting.
    Table,
    /// The full span of an asset with no stored rows.
    Initial,
    Before,
    After,
    /// Rows inside the already-stored span.
    Overlap,
}

impl From<SegmentEdge> for SegmentKind {
    fn from(edge: SegmentEdge) -> Self {
        match edge {
            SegmentEdge::Before => SegmentKind::Before,
            SegmentEdge::After => SegmentKind::After,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedSegment {
    pub kind: SegmentKind,
    pub rows: usize,
    pub reason: String,
}

/// Result of writing one asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetOutcome {
    pub asset: AssetId,
    pub rows_written: usize,
    pub dropped: Vec<DroppedSegment>,
    /// Not in the known-asset set; nothing was looked at.
    pub skipped: bool,
}

impl AssetOutcome {
    fn new(asset: AssetId) -> Self {
        Self {
            asset,
            rows_written: 0,
            dropped: Vec::new(),
            skipped: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && !self.skipped
    }
}

/// Summary of one `write` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteSummary {
    pub assets: Vec<AssetOutcome>,
    pub rows_written: usize,
    pub dropped_segments: usize,
    pub skipped_assets: usize,
}

impl WriteSummary {
    fn record(&mut self, outcome: AssetOutcome) {
        self.rows_written += outcome.rows_written;
        self.dropped_segments += outcome.dropped.len();
        if outcome.skipped {
            self.skipped_assets += 1;
        }
        self.assets.push(outcome);
    }

    pub fn all_clean(&self) -> bool {
        self.assets.iter().all(AssetOutcome::is_clean)
    }
}

/// Progress callback for multi-asset writes.
pub trait WriteProgress: Send {
    fn on_start(&self, asset: AssetId, index: usize);

    fn on_complete(&self, asset: AssetId, index: usize, outcome: &AssetOutcome);

    fn on_batch_complete(&self, summary: &WriteSummary);
}

/// Reports progress through `tracing`.
pub struct LogProgress;

impl WriteProgress for LogProgress {
    fn on_start(&self, asset: AssetId, index: usize) {
        tracing::debug!(%asset, index, "writing asset");
    }

    fn on_complete(&self, asset: AssetId, _index: usize, outcome: &AssetOutcome) {
        if outcome.skipped {
            return;
        }
        info!(
            %asset,
            rows = outcome.rows_written,
            dropped = outcome.dropped.len(),
            "asset written"
        );
    }

    fn on_batch_complete(&self, summary: &WriteSummary) {
        info!(
            assets = summary.assets.len(),
            rows = summary.rows_written,
            dropped = summary.dropped_segments,
            skipped = summary.skipped_assets,
            "write complete"
        );
    }
}

/// Discards progress events.
pub struct NoProgress;

impl WriteProgress for NoProgress {
    fn on_start(&self, _asset: AssetId, _index: usize) {}

    fn on_complete(&self, _asset: AssetId, _index: usize, _outcome: &AssetOutcome) {}

    fn on_batch_complete(&self, _summary: &WriteSummary) {}
}

pub struct DailyBarWriter {
    store: RowStore,
    calendar: Arc<dyn TradingCalendar>,
    cache: Arc<DatasetCache>,
    start_session: NaiveDate,
    end_session: NaiveDate,
}

impl DailyBarWriter {
    /// Bind a writer to a store and calendar. When the session bounds differ
    /// both must be sessions of the calendar.
    pub fn new(
        store: RowStore,
        calendar: Arc<dyn TradingCalendar>,
        cache: Arc<DatasetCache>,
        start_session: NaiveDate,
        end_session: NaiveDate,
    ) -> StoreResult<Self> {
        if start_session != end_session {
            for day in [start_session, end_session] {
                if !calendar.is_session(day) {
                    return Err(StoreError::InvalidSession {
                        day,
                        calendar: calendar.name().to_string(),
                    });
                }
            }
        }
        Ok(Self {
            store,
            calendar,
            cache,
            start_session,
            end_session,
        })
    }

    pub fn session_bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.start_session, self.end_session)
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    /// Write per-asset tables.
    ///
    /// With `assets` set, tables for other ids are skipped with a warning.
    /// Under `Raise` the first validation failure is returned; assets written
    /// before it stay committed.
    pub fn write<I>(
        &mut self,
        data: I,
        assets: Option<&BTreeSet<AssetId>>,
        behavior: InvalidDataBehavior,
        progress: &dyn WriteProgress,
    ) -> StoreResult<WriteSummary>
    where
        I: IntoIterator<Item = (AssetId, DataFrame)>,
    {
        self.write_tables(
            data.into_iter().map(|(asset, df)| (asset, Ok(df))),
            assets,
            behavior,
            progress,
        )
    }

    /// Read each file (CSV or Parquet, by extension) and write it.
    ///
    /// Unreadable files are handled like invalid tables.
    pub fn write_csvs(
        &mut self,
        asset_map: &BTreeMap<AssetId, PathBuf>,
        assets: Option<&BTreeSet<AssetId>>,
        behavior: InvalidDataBehavior,
        progress: &dyn WriteProgress,
    ) -> StoreResult<WriteSummary> {
        self.write_tables(
            asset_map
                .iter()
                .map(|(asset, path)| (*asset, TableIngestor::read_table(path))),
            assets,
            behavior,
            progress,
        )
    }

    fn write_tables<I>(
        &mut self,
        tables: I,
        assets: Option<&BTreeSet<AssetId>>,
        behavior: InvalidDataBehavior,
        progress: &dyn WriteProgress,
    ) -> StoreResult<WriteSummary>
    where
        I: Iterator<Item = (AssetId, StoreResult<DataFrame>)>,
    {
        let mut summary = WriteSummary::default();

        for (index, (asset, table)) in tables.enumerate() {
            progress.on_start(asset, index);

            if assets.is_some_and(|known| !known.contains(&asset)) {
                warn!(%asset, "skipping data for unknown asset");
                let mut outcome = AssetOutcome::new(asset);
                outcome.skipped = true;
                progress.on_complete(asset, index, &outcome);
                summary.record(outcome);
                continue;
            }

            let outcome = match table {
                Ok(df) => {
                    let rows = df.height();
                    match BarNormalizer::normalize(asset, &df) {
                        Ok(bars) => self.write_bars(asset, bars, behavior)?,
                        Err(e) if e.is_validation() => {
                            self.reject_table(asset, rows, e, behavior)?
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => self.reject_table(asset, 0, e, behavior)?,
            };

            progress.on_complete(asset, index, &outcome);
            summary.record(outcome);
        }

        progress.on_batch_complete(&summary);
        Ok(summary)
    }

    fn reject_table(
        &self,
        asset: AssetId,
        rows: usize,
        err: StoreError,
        behavior: InvalidDataBehavior,
    ) -> StoreResult<AssetOutcome> {
        let mut outcome = AssetOutcome::new(asset);
        drop_or_raise(&mut outcome, SegmentKind::Table, rows, err, behavior)?;
        Ok(outcome)
    }

    /// Write one asset's bars.
    ///
    /// Bars must all carry `asset` and be strictly ascending by day; a
    /// sequence that is not is rejected as a whole under `behavior`.
    pub fn write_bars(
        &mut self,
        asset: AssetId,
        bars: Vec<DailyBar>,
        behavior: InvalidDataBehavior,
    ) -> StoreResult<AssetOutcome> {
        let mut outcome = AssetOutcome::new(asset);
        if bars.is_empty() {
            return Ok(outcome);
        }
        if let Err(err) = check_sequence(asset, &bars) {
            drop_or_raise(&mut outcome, SegmentKind::Table, bars.len(), err, behavior)?;
            return Ok(outcome);
        }

        let segments = match self.store.asset_bounds(asset)? {
            None => self.plan_initial(asset, &bars, behavior, &mut outcome)?,
            Some((stored_first, stored_last)) => self.plan_extension(
                asset,
                &bars,
                stored_first,
                stored_last,
                behavior,
                &mut outcome,
            )?,
        };

        if !segments.is_empty() {
            outcome.rows_written = self.store.append_segments(&segments)?;
            self.cache.invalidate();
        }
        Ok(outcome)
    }

    fn plan_initial<'a>(
        &self,
        asset: AssetId,
        bars: &'a [DailyBar],
        behavior: InvalidDataBehavior,
        outcome: &mut AssetOutcome,
    ) -> StoreResult<Vec<&'a [DailyBar]>> {
        let report = check_sessions(bars, self.calendar.as_ref());
        match report.to_error(asset, bars) {
            None => Ok(vec![bars]),
            Some(err) => {
                drop_or_raise(outcome, SegmentKind::Initial, bars.len(), err, behavior)?;
                Ok(Vec::new())
            }
        }
    }

    fn plan_extension<'a>(
        &self,
        asset: AssetId,
        bars: &'a [DailyBar],
        stored_first: NaiveDate,
        stored_last: NaiveDate,
        behavior: InvalidDataBehavior,
        outcome: &mut AssetOutcome,
    ) -> StoreResult<Vec<&'a [DailyBar]>> {
        let before_end = bars.partition_point(|b| b.day < stored_first);
        let after_start = bars.partition_point(|b| b.day <= stored_last);
        let before = &bars[..before_end];
        let overlap = &bars[before_end..after_start];
        let after = &bars[after_start..];

        if !overlap.is_empty() {
            let err = StoreError::OverlapOrGapViolation {
                asset,
                violation: EdgeViolation::Overlap {
                    rows: overlap.len(),
                    stored_first,
                    stored_last,
                },
            };
            drop_or_raise(outcome, SegmentKind::Overlap, overlap.len(), err, behavior)?;
        }

        let mut accepted = Vec::with_capacity(2);
        let candidates = [
            (SegmentEdge::Before, before, before.last().map(|b| b.day), stored_first),
            (SegmentEdge::After, after, after.first().map(|b| b.day), stored_last),
        ];
        for (edge, segment, boundary, stored_boundary) in candidates {
            let Some(boundary) = boundary else {
                continue;
            };
            match self.check_segment(asset, edge, segment, boundary, stored_boundary) {
                Ok(()) => accepted.push(segment),
                Err(err) => drop_or_raise(outcome, edge.into(), segment.len(), err, behavior)?,
            }
        }
        Ok(accepted)
    }

    fn check_segment(
        &self,
        asset: AssetId,
        edge: SegmentEdge,
        segment: &[DailyBar],
        boundary: NaiveDate,
        stored_boundary: NaiveDate,
    ) -> StoreResult<()> {
        check_adjacent(self.calendar.as_ref(), edge, boundary, stored_boundary)
            .map_err(|violation| StoreError::OverlapOrGapViolation { asset, violation })?;
        let report = check_sessions(segment, self.calendar.as_ref());
        match report.to_error(asset, segment) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Every bar belongs to `asset` and days strictly increase.
fn check_sequence(asset: AssetId, bars: &[DailyBar]) -> StoreResult<()> {
    if let Some(foreign) = bars.iter().find(|bar| bar.asset != asset) {
        return Err(StoreError::MalformedBars {
            asset,
            reason: format!("bar on {} belongs to asset {}", foreign.day, foreign.asset),
        });
    }

    let mut duplicates: Vec<NaiveDate> = Vec::new();
    for pair in bars.windows(2) {
        if pair[0].day > pair[1].day {
            return Err(StoreError::MalformedBars {
                asset,
                reason: format!("{} follows {}", pair[1].day, pair[0].day),
            });
        }
        if pair[0].day == pair[1].day && duplicates.last() != Some(&pair[0].day) {
            duplicates.push(pair[0].day);
        }
    }
    if !duplicates.is_empty() {
        return Err(StoreError::DuplicateDays {
            asset,
            days: duplicates,
        });
    }
    Ok(())
}

fn drop_or_raise(
    outcome: &mut AssetOutcome,
    kind: SegmentKind,
    rows: usize,
    err: StoreError,
    behavior: InvalidDataBehavior,
) -> StoreResult<()> {
    match behavior {
        InvalidDataBehavior::Raise => return Err(err),
        InvalidDataBehavior::Warn => {
            warn!(asset = %outcome.asset, ?kind, rows, error = %err, "dropping invalid data");
        }
        InvalidDataBehavior::Ignore => {}
    }
    outcome.dropped.push(DroppedSegment {
        kind,
        rows,
        reason: err.to_string(),
    });
    Ok(())
}
