//! DailyBar: one row of the row store.

use super::ids::AssetId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV bar for a single asset on a single session.
///
/// `day` carries no time-of-day component; it is the UTC calendar date of the
/// session. A price of exactly `0.0` is the stored sentinel for "unknown price".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub asset: AssetId,
    pub day: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// A readable column of the row store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl BarField {
    pub const ALL: [BarField; 5] = [
        BarField::Open,
        BarField::High,
        BarField::Low,
        BarField::Close,
        BarField::Volume,
    ];

    /// Column name in the physical table.
    pub fn column_name(self) -> &'static str {
        match self {
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Volume => "volume",
        }
    }

    pub fn is_price(self) -> bool {
        !matches!(self, BarField::Volume)
    }

    /// Value written into a tape cell where the asset has no row.
    pub fn missing_value(self) -> f64 {
        if self.is_price() {
            f64::NAN
        } else {
            0.0
        }
    }

    /// Maps a stored value to the value served to callers: prices stored as
    /// `0.0` come back as NaN, volume is served raw.
    pub fn present(self, stored: f64) -> f64 {
        if self.is_price() && stored == 0.0 {
            f64::NAN
        } else {
            stored
        }
    }
}

impl fmt::Display for BarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for BarField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(BarField::Open),
            "high" => Ok(BarField::High),
            "low" => Ok(BarField::Low),
            "close" => Ok(BarField::Close),
            "volume" => Ok(BarField::Volume),
            other => Err(format!("unknown bar field '{other}'")),
        }
    }
}
