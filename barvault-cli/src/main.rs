//! Barvault CLI: build and inspect a daily bar store.
//!
//! Commands:
//! - `init`: create the store and schema
//! - `ingest`: write a directory of `<SYMBOL>.csv` / `.parquet` tables
//! - `status`: per-asset row spans and the dataset hash
//! - `read`: dense (sessions x assets) range read
//! - `value`: one field for one asset on one session
//! - `last-traded`: latest session with volume on or before a day

mod settings;

use anyhow::{bail, Result};
use barvault_core::data::{AssetMap, TableIngestor};
use barvault_core::domain::{AssetId, BarField};
use barvault_core::store::{InvalidDataBehavior, LogProgress};
use barvault_core::Dataset;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barvault", about = "Barvault CLI: daily OHLCV bar store")]
struct Cli {
    /// Path to a TOML store config. Falls back to $BARVAULT_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store file and table if missing.
    Init,
    /// Write every table in a directory, one asset per file.
    Ingest {
        /// Directory holding `<SYMBOL>.csv` or `<SYMBOL>.parquet` files.
        dir: PathBuf,

        /// First session the writer covers (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// Last session the writer covers (YYYY-MM-DD).
        #[arg(long)]
        end: NaiveDate,

        /// raise, warn or ignore. Defaults to the config value.
        #[arg(long)]
        behavior: Option<InvalidDataBehavior>,

        /// Symbol to asset id map, updated with new symbols.
        #[arg(long, default_value = "data/assets.toml")]
        assets: PathBuf,
    },
    /// Report per-asset spans and the dataset hash.
    Status {
        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Symbol map used to label asset ids.
        #[arg(long, default_value = "data/assets.toml")]
        assets: PathBuf,
    },
    /// Read a dense range of one or more fields.
    Read {
        /// Fields to read (open, high, low, close, volume).
        #[arg(long, value_delimiter = ',', default_value = "close")]
        fields: Vec<BarField>,

        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,

        /// Asset ids or symbols.
        #[arg(required = true)]
        assets: Vec<String>,

        #[arg(long, default_value = "data/assets.toml")]
        asset_map: PathBuf,
    },
    /// Look up one value.
    Value {
        asset: String,
        day: NaiveDate,
        #[arg(long, default_value = "close")]
        field: BarField,
        #[arg(long, default_value = "data/assets.toml")]
        asset_map: PathBuf,
    },
    /// Latest session on or before a day with nonzero volume.
    LastTraded {
        asset: String,
        day: NaiveDate,
        #[arg(long, default_value = "data/assets.toml")]
        asset_map: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = settings::resolve(cli.config.as_deref())?;
    let dataset = Dataset::open(config)?;

    match cli.command {
        Commands::Init => run_init(&dataset),
        Commands::Ingest {
            dir,
            start,
            end,
            behavior,
            assets,
        } => run_ingest(&dataset, &dir, start, end, behavior, &assets),
        Commands::Status { json, assets } => run_status(&dataset, json, &assets),
        Commands::Read {
            fields,
            start,
            end,
            assets,
            asset_map,
        } => run_read(&dataset, &fields, start, end, &assets, &asset_map),
        Commands::Value {
            asset,
            day,
            field,
            asset_map,
        } => run_value(&dataset, &asset, day, field, &asset_map),
        Commands::LastTraded {
            asset,
            day,
            asset_map,
        } => run_last_traded(&dataset, &asset, day, &asset_map),
    }
}

fn run_init(dataset: &Dataset) -> Result<()> {
    dataset.init()?;
    println!("Store ready: {}", dataset.database().display());
    Ok(())
}

fn run_ingest(
    dataset: &Dataset,
    dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
    behavior: Option<InvalidDataBehavior>,
    assets_path: &Path,
) -> Result<()> {
    let files = TableIngestor::discover(dir)?;
    if files.is_empty() {
        bail!("no .csv or .parquet tables in {}", dir.display());
    }

    let mut asset_map = AssetMap::load_or_default(assets_path)?;
    let symbols: Vec<&str> = files.iter().map(|(symbol, _)| symbol.as_str()).collect();
    let assigned = asset_map.assign(&symbols);
    asset_map.save(assets_path)?;
    info!(
        tables = files.len(),
        known = asset_map.len(),
        "asset map updated"
    );

    let by_symbol: BTreeMap<&str, AssetId> = assigned
        .iter()
        .map(|(symbol, id)| (symbol.as_str(), *id))
        .collect();
    let mut tables: BTreeMap<AssetId, PathBuf> = BTreeMap::new();
    for (symbol, path) in &files {
        match by_symbol.get(symbol.as_str()) {
            Some(id) => {
                tables.insert(*id, path.clone());
            }
            None => bail!("symbol {symbol} was not assigned an asset id"),
        }
    }

    let behavior = behavior.unwrap_or_else(|| dataset.default_behavior());
    let mut writer = dataset.writer(start, end)?;
    let summary = writer.write_csvs(&tables, None, behavior, &LogProgress)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.all_clean() {
        eprintln!(
            "{} segment(s) dropped, {} asset(s) skipped",
            summary.dropped_segments, summary.skipped_assets
        );
    }
    Ok(())
}

fn run_status(dataset: &Dataset, as_json: bool, assets_path: &Path) -> Result<()> {
    let reader = dataset.reader()?;
    let spans = reader.asset_spans()?;
    let hash = reader.dataset_hash()?;
    let asset_map = AssetMap::load_or_default(assets_path)?;

    if as_json {
        let assets: Vec<_> = spans
            .iter()
            .map(|span| {
                json!({
                    "asset": span.asset,
                    "symbol": asset_map.symbol_of(span.asset),
                    "rows": span.rows,
                    "first_day": span.first_day,
                    "last_day": span.last_day,
                })
            })
            .collect();
        let report = json!({
            "database": dataset.database(),
            "calendar": dataset.calendar().name(),
            "first_trading_day": reader.first_trading_day()?,
            "last_available_dt": reader.last_available_dt()?,
            "dataset_hash": hash,
            "assets": assets,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Store: {}", dataset.database().display());
    println!("Assets: {}", spans.len());
    println!("Rows: {}", spans.iter().map(|s| s.rows).sum::<usize>());
    println!("Hash: {}", hash.short());
    if spans.is_empty() {
        return Ok(());
    }
    println!();
    println!(
        "{:<8} {:<10} {:>8} {:<12} {:<12}",
        "Id", "Symbol", "Rows", "First", "Last"
    );
    println!("{}", "-".repeat(54));
    for span in &spans {
        println!(
            "{:<8} {:<10} {:>8} {:<12} {:<12}",
            span.asset,
            asset_map.symbol_of(span.asset).unwrap_or("-"),
            span.rows,
            span.first_day,
            span.last_day
        );
    }
    Ok(())
}

fn run_read(
    dataset: &Dataset,
    fields: &[BarField],
    start: NaiveDate,
    end: NaiveDate,
    assets: &[String],
    asset_map_path: &Path,
) -> Result<()> {
    if start > end {
        bail!("--start {start} is after --end {end}");
    }
    let asset_map = AssetMap::load_or_default(asset_map_path)?;
    let ids = assets
        .iter()
        .map(|a| resolve_asset(&asset_map, a))
        .collect::<Result<Vec<_>>>()?;

    let reader = dataset.reader()?;
    let tapes = reader.load_raw_arrays(fields, start, end, &ids)?;

    let out: Vec<_> = tapes
        .iter()
        .map(|tape| {
            let rows: Vec<_> = (0..tape.days().len())
                .map(|r| {
                    // NaN has no JSON form; missing prices print as null.
                    let cells: Vec<Option<f64>> = tape
                        .row(r)
                        .iter()
                        .map(|v| if v.is_nan() { None } else { Some(*v) })
                        .collect();
                    json!({ "day": tape.days()[r], "values": cells })
                })
                .collect();
            json!({ "field": tape.field(), "assets": ids, "rows": rows })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_value(
    dataset: &Dataset,
    asset: &str,
    day: NaiveDate,
    field: BarField,
    asset_map_path: &Path,
) -> Result<()> {
    let asset_map = AssetMap::load_or_default(asset_map_path)?;
    let id = resolve_asset(&asset_map, asset)?;
    let value = dataset.reader()?.get_value(id, day, field)?;
    if value.is_nan() {
        println!("{id} {day} {field}: missing");
    } else {
        println!("{id} {day} {field}: {value}");
    }
    Ok(())
}

fn run_last_traded(
    dataset: &Dataset,
    asset: &str,
    day: NaiveDate,
    asset_map_path: &Path,
) -> Result<()> {
    let asset_map = AssetMap::load_or_default(asset_map_path)?;
    let id = resolve_asset(&asset_map, asset)?;
    match dataset.reader()?.get_last_traded_dt(id, day)? {
        Some(traded) => println!("{id} last traded on {traded}"),
        None => println!("{id} has no trade on or before {day}"),
    }
    Ok(())
}

/// Numeric ids pass through; anything else is looked up as a symbol.
fn resolve_asset(asset_map: &AssetMap, asset: &str) -> Result<AssetId> {
    if let Ok(id) = asset.parse::<i64>() {
        return Ok(AssetId(id));
    }
    match asset_map.get(&asset.to_ascii_uppercase()) {
        Some(id) => Ok(id),
        None => bail!("unknown symbol '{asset}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_resolve_by_id_or_symbol() {
        let mut map = AssetMap::new();
        map.assign(&["SPY", "QQQ"]);

        assert_eq!(resolve_asset(&map, "42").unwrap(), AssetId(42));
        assert_eq!(resolve_asset(&map, "qqq").unwrap(), map.get("QQQ").unwrap());
        assert!(resolve_asset(&map, "IWM").is_err());
    }

    #[test]
    fn cli_parses_read_fields() {
        let cli = Cli::try_parse_from([
            "barvault",
            "read",
            "--fields",
            "open,close",
            "--start",
            "2024-01-02",
            "--end",
            "2024-01-05",
            "SPY",
        ])
        .unwrap();
        match cli.command {
            Commands::Read { fields, assets, .. } => {
                assert_eq!(fields, vec![BarField::Open, BarField::Close]);
                assert_eq!(assets, vec!["SPY".to_string()]);
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn ingest_then_status_on_temp_store() {
        let dir = tempfile::tempdir().unwrap();
        let tables = dir.path().join("tables");
        std::fs::create_dir_all(&tables).unwrap();
        std::fs::write(
            tables.join("spy.csv"),
            "day,open,high,low,close,volume\n\
             2024-01-02,10.0,11.0,9.0,10.5,100\n\
             2024-01-03,10.5,11.5,10.0,11.0,200\n",
        )
        .unwrap();

        let dataset = Dataset::open(barvault_core::StoreConfig::new(
            dir.path().join("daily.sqlite"),
        ))
        .unwrap();
        let assets = dir.path().join("assets.toml");
        run_ingest(
            &dataset,
            &tables,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            Some(InvalidDataBehavior::Raise),
            &assets,
        )
        .unwrap();

        let map = AssetMap::load_or_default(&assets).unwrap();
        let id = map.get("SPY").unwrap();
        let spans = dataset.reader().unwrap().asset_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].asset, id);
        assert_eq!(spans[0].rows, 2);
        run_status(&dataset, true, &assets).unwrap();
    }
}
