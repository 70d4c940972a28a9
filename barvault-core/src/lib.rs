//! Barvault Core: daily OHLCV bar store.
//!
//! This crate contains the storage engine:
//! - Domain types (bars, fields, asset ids)
//! - Trading calendar seam and session lists
//! - Bar normalizer for per-asset input tables
//! - Session-aligned writer with edge-extension checks
//! - Offset index and row-slice planning
//! - Range reader producing dense (sessions x assets) tapes

pub mod calendar;
pub mod config;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod store;

pub use config::{CalendarConfig, StoreConfig};
pub use dataset::Dataset;
pub use error::{StoreError, StoreResult};
