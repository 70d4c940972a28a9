//! SQLite row store.
//!
//! One flat table of daily bars. Logical row order is `(id, day)`: every
//! read orders by it, so an asset's rows are contiguous and ascending by day
//! regardless of physical insert order, and "prepending" a segment is just
//! inserting rows with earlier days.

use crate::data::schema::{BarSchema, TABLE};
use crate::domain::{AssetId, BarField, DailyBar, DatasetHash};
use crate::error::{StoreError, StoreResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-asset aggregate over the row store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetSpan {
    pub asset: AssetId,
    pub rows: usize,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

pub struct RowStore {
    conn: Connection,
    path: PathBuf,
}

impl RowStore {
    /// Open the store for writing, creating the file and schema if the store
    /// does not exist yet.
    pub fn open_or_create(path: &Path) -> StoreResult<Self> {
        let conn = match Connection::open_with_flags(path, read_write_flags()) {
            Ok(conn) => conn,
            Err(e) if is_missing_store(&e) => {
                info!(path = %path.display(), "creating bar store");
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| StoreError::Bootstrap {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                }
                Connection::open_with_flags(path, read_write_flags() | OpenFlags::SQLITE_OPEN_CREATE)?
            }
            Err(e) => return Err(e.into()),
        };
        conn.execute_batch(&BarSchema::ddl())?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store without write access.
    pub fn open_read_only(path: &Path) -> StoreResult<Self> {
        let not_found = || StoreError::StoreNotFound {
            path: path.display().to_string(),
        };
        let conn = match Connection::open_with_flags(path, read_only_flags()) {
            Ok(conn) => conn,
            Err(e) if is_missing_store(&e) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let has_table: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![TABLE],
                |row| row.get(0),
            )
            .optional()?;
        if has_table.is_none() {
            return Err(not_found());
        }
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> StoreResult<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// First and last stored day of one asset.
    pub fn asset_bounds(&self, asset: AssetId) -> StoreResult<Option<(NaiveDate, NaiveDate)>> {
        let (lo, hi): (Option<NaiveDate>, Option<NaiveDate>) = self.conn.query_row(
            &format!("SELECT MIN(day), MAX(day) FROM {TABLE} WHERE id = ?1"),
            params![asset.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(lo.zip(hi))
    }

    /// First and last stored day across all assets.
    pub fn day_bounds(&self) -> StoreResult<Option<(NaiveDate, NaiveDate)>> {
        let (lo, hi): (Option<NaiveDate>, Option<NaiveDate>) = self.conn.query_row(
            &format!("SELECT MIN(day), MAX(day) FROM {TABLE}"),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(lo.zip(hi))
    }

    /// One aggregate pass grouped by asset, ascending by asset.
    pub fn asset_spans(&self) -> StoreResult<Vec<AssetSpan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, COUNT(*), MIN(day), MAX(day) FROM {TABLE} GROUP BY id ORDER BY id"
        ))?;
        let spans = stmt
            .query_map([], |row| {
                Ok(AssetSpan {
                    asset: AssetId(row.get(0)?),
                    rows: row.get::<_, i64>(1)? as usize,
                    first_day: row.get(2)?,
                    last_day: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(spans)
    }

    /// The whole column in logical row order.
    pub fn read_column(&self, field: BarField) -> StoreResult<Vec<f64>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {TABLE} ORDER BY id, day",
            field.column_name()
        ))?;
        let values = stmt
            .query_map([], |row| row.get::<_, f64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(%field, rows = values.len(), "loaded full column");
        Ok(values)
    }

    /// `take` consecutive rows of one asset starting `skip` rows after its
    /// first row.
    pub fn read_asset_rows(
        &self,
        asset: AssetId,
        field: BarField,
        skip: usize,
        take: usize,
    ) -> StoreResult<Vec<f64>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM {TABLE} WHERE id = ?1 ORDER BY day LIMIT ?2 OFFSET ?3",
            field.column_name()
        ))?;
        let values = stmt
            .query_map(params![asset.0, take as i64, skip as i64], |row| {
                row.get::<_, f64>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    /// Stored value of one cell, if the row exists.
    pub fn point_value(
        &self,
        asset: AssetId,
        day: NaiveDate,
        field: BarField,
    ) -> StoreResult<Option<f64>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM {TABLE} WHERE id = ?1 AND day = ?2",
            field.column_name()
        ))?;
        Ok(stmt
            .query_row(params![asset.0, day], |row| row.get::<_, f64>(0))
            .optional()?)
    }

    /// Insert segments in a single transaction. Either every row lands or
    /// none does.
    pub fn append_segments(&mut self, segments: &[&[DailyBar]]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {TABLE} (id, day, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ))?;
            for bar in segments.iter().flat_map(|s| s.iter()) {
                written += stmt.execute(params![
                    bar.asset.0,
                    bar.day,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Deterministic content hash over every row in logical order.
    pub fn content_hash(&self) -> StoreResult<DatasetHash> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, day, open, high, low, close, volume FROM {TABLE} ORDER BY id, day"
        ))?;
        let mut rows = stmt.query([])?;
        let mut hasher = blake3::Hasher::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let day: NaiveDate = row.get(1)?;
            hasher.update(&id.to_le_bytes());
            hasher.update(day.to_string().as_bytes());
            for i in 2..6 {
                hasher.update(&row.get::<_, f64>(i)?.to_bits().to_le_bytes());
            }
            hasher.update(&row.get::<_, i64>(6)?.to_le_bytes());
        }
        Ok(DatasetHash::from_hash(&hasher.finalize().to_hex()))
    }
}

fn read_write_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI
}

fn read_only_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI
}

/// SQLite reports a store file that does not exist (or whose directory does
/// not exist) as `CannotOpen` when opened without the create flag.
fn is_missing_store(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::CannotOpen
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(asset: i64, day: &str, close: f64, volume: i64) -> DailyBar {
        DailyBar {
            asset: AssetId(asset),
            day: d(day),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn bootstrap_creates_missing_store_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("daily.sqlite");
        let store = RowStore::open_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.row_count().unwrap(), 0);

        // Second open takes the existing-store branch.
        drop(store);
        let store = RowStore::open_or_create(&path).unwrap();
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn read_only_open_of_missing_store_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = RowStore::open_read_only(&dir.path().join("none.sqlite"));
        assert!(matches!(result, Err(StoreError::StoreNotFound { .. })));
    }

    #[test]
    fn logical_order_ignores_insert_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RowStore::open_or_create(&dir.path().join("s.sqlite")).unwrap();
        let late = [bar(2, "2024-01-03", 20.0, 1)];
        let early = [bar(1, "2024-01-03", 11.0, 1), bar(1, "2024-01-02", 10.0, 1)];
        store.append_segments(&[&late[..]]).unwrap();
        store.append_segments(&[&early[..]]).unwrap();

        assert_eq!(
            store.read_column(BarField::Close).unwrap(),
            vec![10.0, 11.0, 20.0]
        );
        let spans = store.asset_spans().unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].asset, AssetId(1));
        assert_eq!(spans[0].rows, 2);
        assert_eq!(spans[0].first_day, d("2024-01-02"));
        assert_eq!(store.day_bounds().unwrap(), Some((d("2024-01-02"), d("2024-01-03"))));
    }

    #[test]
    fn point_and_range_reads() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RowStore::open_or_create(&dir.path().join("s.sqlite")).unwrap();
        let rows = [
            bar(1, "2024-01-02", 10.0, 100),
            bar(1, "2024-01-03", 11.0, 0),
            bar(1, "2024-01-04", 12.0, 300),
        ];
        store.append_segments(&[&rows[..]]).unwrap();

        assert_eq!(
            store.point_value(AssetId(1), d("2024-01-03"), BarField::Volume).unwrap(),
            Some(0.0)
        );
        assert_eq!(
            store.point_value(AssetId(1), d("2024-01-05"), BarField::Close).unwrap(),
            None
        );
        assert_eq!(
            store.read_asset_rows(AssetId(1), BarField::Close, 1, 2).unwrap(),
            vec![11.0, 12.0]
        );
        assert_eq!(store.asset_bounds(AssetId(9)).unwrap(), None);
        assert_eq!(store.read_asset_rows(AssetId(1), BarField::Close, 0, 10).unwrap().len(), 3);
    }

    #[test]
    fn content_hash_is_order_independent_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = RowStore::open_or_create(&dir.path().join("a.sqlite")).unwrap();
        let mut b = RowStore::open_or_create(&dir.path().join("b.sqlite")).unwrap();
        let x = [bar(1, "2024-01-02", 10.0, 1)];
        let y = [bar(2, "2024-01-02", 20.0, 1)];
        a.append_segments(&[&x[..], &y[..]]).unwrap();
        b.append_segments(&[&y[..], &x[..]]).unwrap();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());

        let z = [bar(3, "2024-01-02", 1.0, 1)];
        b.append_segments(&[&z[..]]).unwrap();
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }
}
