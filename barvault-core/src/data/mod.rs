pub mod assets;
pub mod ingest;
pub mod normalize;
pub mod schema;

pub use assets::AssetMap;
pub use ingest::{TableFormat, TableIngestor};
pub use normalize::BarNormalizer;
pub use schema::BarSchema;
