pub mod cache;
pub mod index;
pub mod reader;
pub mod row_store;
pub mod validate;
pub mod writer;

pub use cache::DatasetCache;
pub use index::{AssetOffsets, OffsetIndex, RowSlice};
pub use reader::{DailyBarReader, Tape};
pub use row_store::{AssetSpan, RowStore};
pub use validate::{
    check_adjacent, check_sessions, session_distance, SegmentEdge, SessionReport,
    REQUIRED_ADJACENT_SESSION_GAP,
};
pub use writer::{
    AssetOutcome, DailyBarWriter, DroppedSegment, InvalidDataBehavior, LogProgress, NoProgress,
    SegmentKind, WriteProgress, WriteSummary,
};
