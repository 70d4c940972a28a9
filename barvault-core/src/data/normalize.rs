//! Bar normalizer: raw per-asset table -> canonical daily bars.
//!
//! The index column may be a polars `Date`, a `Datetime` (any unit, naive or
//! zoned) or a string. Datetimes are taken in UTC and truncated to the date;
//! the time of day is dropped. Columns other than the index and OHLCV are
//! ignored.

use crate::data::schema::{BarSchema, REQUIRED_COLUMNS};
use crate::domain::{AssetId, DailyBar};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use polars::prelude::*;

/// Canonicalizer for per-asset bar tables
pub struct BarNormalizer;

impl BarNormalizer {
    /// Normalize one asset's table into bars sorted by day.
    ///
    /// Null or NaN prices become the `0.0` unknown-price sentinel and null
    /// volume becomes `0`. Repeated days and value columns that do not
    /// convert to numbers are rejected.
    pub fn normalize(asset: AssetId, df: &DataFrame) -> StoreResult<Vec<DailyBar>> {
        let missing_columns = BarSchema::missing_columns(df);
        if !missing_columns.is_empty() {
            return Err(StoreError::CorruptedData {
                asset,
                missing_columns,
            });
        }

        let index_name = BarSchema::find_index_column(df).ok_or_else(|| {
            StoreError::CorruptedData {
                asset,
                missing_columns: vec!["day".into()],
            }
        })?;
        let days = Self::index_days(asset, df.column(&index_name)?)?;

        let [open, high, low, close] = ["open", "high", "low", "close"].map(|name| {
            BarSchema::find_column(df, name)
                .ok_or_else(|| missing(asset, name))
                .and_then(|actual| Self::price_values(asset, df, &actual))
        });
        let (open, high, low, close) = (open?, high?, low?, close?);

        let volume_name = BarSchema::find_column(df, REQUIRED_COLUMNS[4])
            .ok_or_else(|| missing(asset, "volume"))?;
        let volume = Self::volume_values(asset, df, &volume_name)?;

        let mut bars: Vec<DailyBar> = days
            .into_iter()
            .enumerate()
            .map(|(i, day)| DailyBar {
                asset,
                day,
                open: open[i],
                high: high[i],
                low: low[i],
                close: close[i],
                volume: volume[i],
            })
            .collect();

        bars.sort_by_key(|bar| bar.day);

        let mut duplicates: Vec<NaiveDate> = bars
            .windows(2)
            .filter(|pair| pair[0].day == pair[1].day)
            .map(|pair| pair[0].day)
            .collect();
        if !duplicates.is_empty() {
            duplicates.dedup();
            return Err(StoreError::DuplicateDays {
                asset,
                days: duplicates,
            });
        }

        Ok(bars)
    }

    fn index_days(asset: AssetId, column: &Column) -> StoreResult<Vec<NaiveDate>> {
        let unsupported = |reason: String| StoreError::UnsupportedIndex { asset, reason };
        let null_at = |row: usize| unsupported(format!("null day at row {row}"));

        match column.dtype() {
            DataType::Date => {
                let physical = column.cast(&DataType::Int32)?;
                physical
                    .i32()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, v)| {
                        let v = v.ok_or_else(|| null_at(row))?;
                        epoch_day(i64::from(v))
                            .ok_or_else(|| unsupported(format!("day {v} out of range")))
                    })
                    .collect()
            }
            DataType::Datetime(unit, _) => {
                let unit = *unit;
                let physical = column.cast(&DataType::Int64)?;
                physical
                    .i64()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, v)| {
                        let v = v.ok_or_else(|| null_at(row))?;
                        utc_date(v, unit)
                            .ok_or_else(|| unsupported(format!("timestamp {v} out of range")))
                    })
                    .collect()
            }
            DataType::String => column
                .str()?
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    let raw = v.ok_or_else(|| null_at(row))?;
                    parse_day(raw).ok_or_else(|| unsupported(format!("cannot parse '{raw}'")))
                })
                .collect(),
            other => Err(unsupported(format!("index column has type {other}"))),
        }
    }

    fn price_values(asset: AssetId, df: &DataFrame, name: &str) -> StoreResult<Vec<f64>> {
        let values = strict_column(asset, df, name, &DataType::Float64)?;
        Ok(values
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(v) if v.is_finite() => v,
                _ => 0.0,
            })
            .collect())
    }

    fn volume_values(asset: AssetId, df: &DataFrame, name: &str) -> StoreResult<Vec<i64>> {
        let values = strict_column(asset, df, name, &DataType::Int64)?;
        Ok(values.i64()?.into_iter().map(|v| v.unwrap_or(0)).collect())
    }
}

/// Cast a value column; entries that do not convert make the column unusable.
fn strict_column(
    asset: AssetId,
    df: &DataFrame,
    name: &str,
    dtype: &DataType,
) -> StoreResult<Column> {
    df.column(name)?.strict_cast(dtype).map_err(|e| {
        tracing::debug!(%asset, column = name, error = %e, "column failed to convert");
        missing(asset, name)
    })
}

fn missing(asset: AssetId, name: &str) -> StoreError {
    StoreError::CorruptedData {
        asset,
        missing_columns: vec![name.to_string()],
    }
}

fn epoch_day(days: i64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    epoch.checked_add_signed(TimeDelta::try_days(days)?)
}

fn utc_date(value: i64, unit: TimeUnit) -> Option<NaiveDate> {
    let dt: DateTime<Utc> = match unit {
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(value),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value)?,
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value)?,
    };
    Some(dt.date_naive())
}

/// Plain dates, RFC 3339 timestamps (converted to UTC) and naive
/// `date time` strings are accepted.
fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(day);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_normalize_sorts_and_drops_foreign_columns() {
        let df = df!(
            "Date" => &["2024-01-04", "2024-01-02", "2024-01-03"],
            "Open" => &[3.0, 1.0, 2.0],
            "High" => &[3.5, 1.5, 2.5],
            "Low" => &[2.5, 0.5, 1.5],
            "Close" => &[3.2, 1.2, 2.2],
            "Volume" => &[300i64, 100, 200],
            "dividend" => &[0.0, 0.0, 0.0],
        )
        .unwrap();

        let bars = BarNormalizer::normalize(AssetId(1), &df).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].day, d("2024-01-02"));
        assert_eq!(bars[0].open, 1.0);
        assert_eq!(bars[2].volume, 300);
        assert!(bars.iter().all(|b| b.asset == AssetId(1)));
    }

    #[test]
    fn test_missing_columns_are_corrupted() {
        let df = df!(
            "day" => &["2024-01-02"],
            "open" => &[1.0],
            "close" => &[1.0],
        )
        .unwrap();

        match BarNormalizer::normalize(AssetId(7), &df) {
            Err(StoreError::CorruptedData {
                asset,
                missing_columns,
            }) => {
                assert_eq!(asset, AssetId(7));
                assert_eq!(missing_columns, vec!["high", "low", "volume"]);
            }
            other => panic!("expected CorruptedData, got {other:?}"),
        }
    }

    #[test]
    fn test_timestamps_are_truncated_to_utc_day() {
        let df = df!(
            "timestamp" => &["2024-01-02T23:30:00-05:00", "2024-01-04 09:30:00"],
            "open" => &[1.0, 2.0],
            "high" => &[1.0, 2.0],
            "low" => &[1.0, 2.0],
            "close" => &[1.0, 2.0],
            "volume" => &[1i64, 2],
        )
        .unwrap();

        let bars = BarNormalizer::normalize(AssetId(1), &df).unwrap();
        // 23:30 in New York on Jan 2 is already Jan 3 in UTC.
        assert_eq!(bars[0].day, d("2024-01-03"));
        assert_eq!(bars[1].day, d("2024-01-04"));
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn test_duplicate_days_rejected() {
        let df = df!(
            "day" => &["2024-01-02", "2024-01-02T12:00:00Z"],
            "open" => &[1.0, 2.0],
            "high" => &[1.0, 2.0],
            "low" => &[1.0, 2.0],
            "close" => &[1.0, 2.0],
            "volume" => &[1i64, 2],
        )
        .unwrap();

        match BarNormalizer::normalize(AssetId(3), &df) {
            Err(StoreError::DuplicateDays { days, .. }) => assert_eq!(days, vec![d("2024-01-02")]),
            other => panic!("expected DuplicateDays, got {other:?}"),
        }
    }

    #[test]
    fn test_null_prices_become_zero_sentinel() {
        let df = df!(
            "day" => &["2024-01-02", "2024-01-03"],
            "open" => &[Some(1.0), None],
            "high" => &[Some(1.0), Some(f64::NAN)],
            "low" => &[1.0, 1.0],
            "close" => &[1.0, 1.0],
            "volume" => &[Some(10i64), None],
        )
        .unwrap();

        let bars = BarNormalizer::normalize(AssetId(1), &df).unwrap();
        assert_eq!(bars[1].open, 0.0);
        assert_eq!(bars[1].high, 0.0);
        assert_eq!(bars[1].volume, 0);
        assert_eq!(bars[0].open, 1.0);
    }

    #[test]
    fn test_unparseable_index_is_unsupported() {
        let df = df!(
            "day" => &["yesterday"],
            "open" => &[1.0],
            "high" => &[1.0],
            "low" => &[1.0],
            "close" => &[1.0],
            "volume" => &[1i64],
        )
        .unwrap();

        assert!(matches!(
            BarNormalizer::normalize(AssetId(1), &df),
            Err(StoreError::UnsupportedIndex { .. })
        ));
    }

    #[test]
    fn test_date_typed_index() {
        // 19724 days after the epoch is 2024-01-02.
        let mut df = df!(
            "day" => &[19725i32, 19724],
            "open" => &[1.0, 2.0],
            "high" => &[1.0, 2.0],
            "low" => &[1.0, 2.0],
            "close" => &[1.0, 2.0],
            "volume" => &[1.0, 2.0],
        )
        .unwrap();
        let day = df.column("day").unwrap().cast(&DataType::Date).unwrap();
        df.with_column(day).unwrap();

        let bars = BarNormalizer::normalize(AssetId(1), &df).unwrap();
        assert_eq!(bars[0].day, d("2024-01-02"));
        assert_eq!(bars[0].volume, 2);
    }

    #[test]
    fn test_epoch_helpers() {
        assert_eq!(epoch_day(0), Some(d("1970-01-01")));
        assert_eq!(
            utc_date(86_400_000 + 1, TimeUnit::Milliseconds),
            Some(d("1970-01-02"))
        );
    }

    #[test]
    fn test_unconvertible_price_is_corrupted() {
        let df = df!(
            "day" => &["2024-01-02", "2024-01-03"],
            "open" => &["1.0", "abc"],
            "high" => &[1.0, 1.0],
            "low" => &[1.0, 1.0],
            "close" => &[1.0, 1.0],
            "volume" => &[1i64, 2],
        )
        .unwrap();

        match BarNormalizer::normalize(AssetId(5), &df) {
            Err(StoreError::CorruptedData {
                asset,
                missing_columns,
            }) => {
                assert_eq!(asset, AssetId(5));
                assert_eq!(missing_columns, vec!["open"]);
            }
            other => panic!("expected CorruptedData, got {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_volume_is_corrupted() {
        let df = df!(
            "day" => &["2024-01-02"],
            "open" => &[1.0],
            "high" => &[1.0],
            "low" => &[1.0],
            "close" => &[1.0],
            "volume" => &[1.0e30],
        )
        .unwrap();

        assert!(matches!(
            BarNormalizer::normalize(AssetId(5), &df),
            Err(StoreError::CorruptedData { missing_columns, .. }) if missing_columns == vec!["volume"]
        ));
    }
}
