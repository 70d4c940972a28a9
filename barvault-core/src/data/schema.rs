use polars::prelude::*;

/// Physical table name of the row store.
pub const TABLE: &str = "ohlcv_daily";

/// Columns every per-asset input table must provide (case-insensitive).
pub const REQUIRED_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Names accepted for the date-like index column, in preference order.
pub const INDEX_COLUMNS: [&str; 4] = ["day", "date", "timestamp", "time"];

/// Column conventions of per-asset input tables and the row store
pub struct BarSchema;

impl BarSchema {
    /// DDL for the row store. Idempotent.
    pub fn ddl() -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                 id     INTEGER NOT NULL,
                 day    DATE    NOT NULL,
                 open   REAL    NOT NULL,
                 high   REAL    NOT NULL,
                 low    REAL    NOT NULL,
                 close  REAL    NOT NULL,
                 volume INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS id_day ON {TABLE} (id, day);"
        )
    }

    /// Find the actual column name matching `wanted`, ignoring ASCII case.
    pub fn find_column(df: &DataFrame, wanted: &str) -> Option<String> {
        df.get_column_names()
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(wanted))
            .map(|name| name.to_string())
    }

    /// The index column of a per-asset frame, if any accepted name is present.
    pub fn find_index_column(df: &DataFrame) -> Option<String> {
        INDEX_COLUMNS
            .iter()
            .find_map(|wanted| Self::find_column(df, wanted))
    }

    /// Required columns that are absent from `df`, in canonical order.
    /// The index column is reported as `day` when none of its aliases exist.
    pub fn missing_columns(df: &DataFrame) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        if Self::find_index_column(df).is_none() {
            missing.push("day".to_string());
        }
        missing.extend(
            REQUIRED_COLUMNS
                .iter()
                .filter(|c| Self::find_column(df, c).is_none())
                .map(|c| c.to_string()),
        );
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_column_ignores_case() {
        let df = df!(
            "Date" => &["2024-01-02"],
            "OPEN" => &[1.0],
        )
        .unwrap();
        assert_eq!(BarSchema::find_column(&df, "open").as_deref(), Some("OPEN"));
        assert_eq!(BarSchema::find_index_column(&df).as_deref(), Some("Date"));
    }

    #[test]
    fn test_missing_columns_reported_in_order() {
        let df = df!(
            "day" => &["2024-01-02"],
            "open" => &[400.0],
            "close" => &[403.0],
        )
        .unwrap();
        assert_eq!(BarSchema::missing_columns(&df), vec!["high", "low", "volume"]);
    }

    #[test]
    fn test_missing_index_reported_as_day() {
        let df = df!(
            "open" => &[1.0],
            "high" => &[1.0],
            "low" => &[1.0],
            "close" => &[1.0],
            "volume" => &[1i64],
        )
        .unwrap();
        assert_eq!(BarSchema::missing_columns(&df), vec!["day"]);
    }

    #[test]
    fn test_ddl_creates_composite_index() {
        let ddl = BarSchema::ddl();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS ohlcv_daily"));
        assert!(ddl.contains("ON ohlcv_daily (id, day)"));
    }
}
