//! CSV market data loading.
//!
//! Directory layout:
//!
//! ```text
//! <dir>/bars/<SYMBOL>.csv          date,open,high,low,close,volume
//! <dir>/calendar.csv               date                      (optional)
//! <dir>/daily_basic/<SYMBOL>.csv   date,close,turnover_rate,... (optional)
//! ```
//!
//! Dates may be written `YYYY-MM-DD` or `YYYYMMDD`. A universe symbol without
//! a bar file is not an error: it simply never trades (every order on it is
//! rejected as suspended), and the loader logs a warning. Without a calendar
//! file the calendar is the union of all bar dates.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tplus_core::data::InMemoryMarketData;
use tplus_core::domain::{Bar, DailyBasic};
use tracing::{debug, warn};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("data directory not found: {0}")]
    MissingDir(PathBuf),

    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

/// Loaded market data plus provenance.
#[derive(Debug)]
pub struct LoadedData {
    pub data: InMemoryMarketData,
    /// Universe symbols with no bar file.
    pub missing_symbols: Vec<String>,
    /// BLAKE3 over the raw bar files, in sorted symbol order.
    pub dataset_hash: String,
}

#[derive(Debug, Deserialize)]
struct BarRow {
    date: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    date: String,
}

#[derive(Debug, Deserialize)]
struct DailyBasicRow {
    date: String,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    turnover_rate: Option<f64>,
    #[serde(default)]
    volume_ratio: Option<f64>,
    #[serde(default)]
    pe: Option<f64>,
    #[serde(default)]
    pe_ttm: Option<f64>,
    #[serde(default)]
    pb: Option<f64>,
    #[serde(default)]
    ps: Option<f64>,
    #[serde(default)]
    ps_ttm: Option<f64>,
    #[serde(default)]
    dv_ratio: Option<f64>,
    #[serde(default)]
    total_mv: Option<f64>,
    #[serde(default)]
    circ_mv: Option<f64>,
}

/// Load bars (and optionally daily-basic records) for `symbols` from `dir`.
pub fn load_market_data(
    dir: &Path,
    symbols: &[String],
    with_daily_basic: bool,
) -> Result<LoadedData, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::MissingDir(dir.to_path_buf()));
    }

    let mut data = InMemoryMarketData::new();
    let mut missing_symbols = Vec::new();

    let calendar_path = dir.join("calendar.csv");
    if calendar_path.is_file() {
        let sessions = read_calendar(&calendar_path)?;
        debug!(sessions = sessions.len(), "trading calendar loaded");
        data = data.with_calendar(sessions);
    }

    for symbol in symbols {
        let path = dir.join("bars").join(format!("{symbol}.csv"));
        if !path.is_file() {
            warn!(symbol = %symbol, path = %path.display(), "no bar file, symbol will never trade");
            missing_symbols.push(symbol.clone());
            continue;
        }
        let bars = read_bars(&path, symbol)?;
        debug!(symbol = %symbol, bars = bars.len(), "bars loaded");
        for bar in bars {
            data.insert_bar(bar);
        }

        if with_daily_basic {
            let path = dir.join("daily_basic").join(format!("{symbol}.csv"));
            if path.is_file() {
                for record in read_daily_basic(&path, symbol)? {
                    data.insert_daily_basic(record);
                }
            } else {
                warn!(symbol = %symbol, "no daily-basic file");
            }
        }
    }

    let dataset_hash = dataset_hash(dir, symbols);
    Ok(LoadedData {
        data,
        missing_symbols,
        dataset_hash,
    })
}

/// Accepts `2024-01-02` and `20240102`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y%m%d"))
        .ok()
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<(u64, T)>, LoadError> {
    let mut rdr = reader(path)?;
    let mut rows = Vec::new();
    for record in rdr.deserialize::<T>() {
        let row = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        // header is line 1
        rows.push((rows.len() as u64 + 2, row));
    }
    Ok(rows)
}

fn read_calendar(path: &Path) -> Result<Vec<NaiveDate>, LoadError> {
    read_rows::<CalendarRow>(path)?
        .into_iter()
        .map(|(line, row)| date_field(path, line, &row.date))
        .collect()
}

fn read_bars(path: &Path, symbol: &str) -> Result<Vec<Bar>, LoadError> {
    let mut bars = Vec::new();
    for (line, row) in read_rows::<BarRow>(path)? {
        let bar = Bar {
            symbol: symbol.to_string(),
            date: date_field(path, line, &row.date)?,
            open: price_field(path, line, "open", &row.open)?,
            high: price_field(path, line, "high", &row.high)?,
            low: price_field(path, line, "low", &row.low)?,
            close: price_field(path, line, "close", &row.close)?,
            volume: row.volume.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(0.0) as u64,
        };
        if !bar.is_sane() {
            return Err(LoadError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("inconsistent OHLC on {}", bar.date),
            });
        }
        bars.push(bar);
    }
    Ok(bars)
}

fn read_daily_basic(path: &Path, symbol: &str) -> Result<Vec<DailyBasic>, LoadError> {
    read_rows::<DailyBasicRow>(path)?
        .into_iter()
        .map(|(line, row)| {
            let mut record = DailyBasic::new(symbol, date_field(path, line, &row.date)?);
            record.close = row.close;
            record.turnover_rate = row.turnover_rate;
            record.volume_ratio = row.volume_ratio;
            record.pe = row.pe;
            record.pe_ttm = row.pe_ttm;
            record.pb = row.pb;
            record.ps = row.ps;
            record.ps_ttm = row.ps_ttm;
            record.dv_ratio = row.dv_ratio;
            record.total_mv = row.total_mv;
            record.circ_mv = row.circ_mv;
            Ok(record)
        })
        .collect()
}

fn date_field(path: &Path, line: u64, text: &str) -> Result<NaiveDate, LoadError> {
    parse_date(text).ok_or_else(|| LoadError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("invalid date '{text}'"),
    })
}

fn price_field(path: &Path, line: u64, column: &str, text: &str) -> Result<Decimal, LoadError> {
    Decimal::from_str(text)
        .ok()
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| LoadError::Parse {
            path: path.to_path_buf(),
            line,
            message: format!("invalid {column} '{text}'"),
        })
}

/// Hash the raw bar files so two runs on byte-identical data share a hash.
fn dataset_hash(dir: &Path, symbols: &[String]) -> String {
    let mut sorted: Vec<&String> = symbols.iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut hasher = blake3::Hasher::new();
    for symbol in sorted {
        let path = dir.join("bars").join(format!("{symbol}.csv"));
        hasher.update(symbol.as_bytes());
        if let Ok(bytes) = std::fs::read(&path) {
            hasher.update(&bytes);
        }
    }
    hasher.finalize().to_hex().to_string()
}
