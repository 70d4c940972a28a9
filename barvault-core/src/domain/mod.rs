//! Domain types for barvault

pub mod bar;
pub mod ids;

pub use bar::{BarField, DailyBar};
pub use ids::{AssetId, DatasetHash};
