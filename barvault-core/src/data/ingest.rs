use crate::error::{StoreError, StoreResult};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// File formats accepted as per-asset input tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    /// Format by file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(TableFormat::Csv),
            "parquet" | "pq" => Some(TableFormat::Parquet),
            _ => None,
        }
    }
}

/// Table ingestor for CSV and Parquet files
pub struct TableIngestor;

impl TableIngestor {
    /// Read a table, choosing the reader by extension.
    pub fn read_table(path: &Path) -> StoreResult<DataFrame> {
        match TableFormat::from_path(path) {
            Some(TableFormat::Csv) => Self::read_csv(path),
            Some(TableFormat::Parquet) => Self::read_parquet(path),
            None => Err(ingest_error(path, "unsupported file extension")),
        }
    }

    /// Read a CSV file with a header row. Day columns stay strings and are
    /// parsed by the normalizer.
    pub fn read_csv(path: &Path) -> StoreResult<DataFrame> {
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(|e| ingest_error(path, e))
    }

    pub fn read_parquet(path: &Path) -> StoreResult<DataFrame> {
        let file = File::open(path).map_err(|e| ingest_error(path, e))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| ingest_error(path, e))
    }

    /// Input tables in `dir`, keyed by upper-cased file stem, sorted by
    /// symbol. Files with other extensions are skipped.
    pub fn discover(dir: &Path) -> StoreResult<Vec<(String, PathBuf)>> {
        let entries = std::fs::read_dir(dir).map_err(|e| ingest_error(dir, e))?;
        let mut found = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ingest_error(dir, e))?.path();
            if !path.is_file() || TableFormat::from_path(&path).is_none() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                found.push((stem.to_ascii_uppercase(), path));
            }
        }
        found.sort();
        Ok(found)
    }
}

fn ingest_error(path: &Path, reason: impl ToString) -> StoreError {
    StoreError::Ingest {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
