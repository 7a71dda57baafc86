//! OHLCV data loader.
//!
//! Reads a cached price file for one ticker from the data directory:
//! `{data_dir}/{ticker}_{interval}.parquet` or `{data_dir}/{ticker}_{interval}.csv`.
//! Column names are matched case-insensitively against
//! Date, Open, High, Low, Close, Volume (the layout written by most
//! market-data exporters).
//!
//! Rows with unparseable dates or missing/non-finite values are dropped,
//! the series is sorted by date and repeated dates are collapsed.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DataConfig;

use super::types::{Bar, PriceSeries};

/// Required columns in a price file.
pub const EXPECTED_COLUMNS: &[&str] = &["date", "open", "high", "low", "close", "volume"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of price data for the walk-forward loop.
pub trait DataSource {
    /// The complete dataset.
    fn get_full_data(&self) -> Result<PriceSeries, LoaderError>;

    /// Bars with `start <= date < end`; empty when nothing matches.
    fn get_data_slice(&self, start: NaiveDate, end: NaiveDate)
        -> Result<PriceSeries, LoaderError>;
}

impl DataSource for PriceSeries {
    fn get_full_data(&self) -> Result<PriceSeries, LoaderError> {
        Ok(self.clone())
    }

    fn get_data_slice(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, LoaderError> {
        Ok(self.slice(start, end))
    }
}

/// File-backed data manager with an in-memory cache of the full series.
pub struct DataManager {
    config: DataConfig,
    cache: OnceLock<PriceSeries>,
}

impl DataManager {
    /// Create a manager for the configured ticker and data directory.
    pub fn new(config: DataConfig) -> Self {
        Self {
            config,
            cache: OnceLock::new(),
        }
    }

    /// Create a manager over an already loaded series.
    pub fn from_series(config: DataConfig, series: PriceSeries) -> Self {
        let cache = OnceLock::new();
        let _ = cache.set(series);
        Self { config, cache }
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Candidate cache files, parquet first.
    fn candidate_paths(&self) -> Vec<PathBuf> {
        let stem = format!("{}_{}", self.config.ticker, self.config.interval);
        vec![
            self.config.data_dir.join(format!("{}.parquet", stem)),
            self.config.data_dir.join(format!("{}.csv", stem)),
        ]
    }

    /// Resolve the file to load, honoring an explicit `file` override.
    pub fn resolve_path(&self) -> Result<PathBuf, LoaderError> {
        if let Some(file) = &self.config.file {
            if file.exists() {
                return Ok(file.clone());
            }
            return Err(LoaderError::FileNotFound(file.display().to_string()));
        }

        let candidates = self.candidate_paths();
        candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .ok_or_else(|| {
                LoaderError::FileNotFound(
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(" or "),
                )
            })
    }

    /// Load and sanitize the series from disk, bypassing the cache.
    pub fn load(&self) -> Result<PriceSeries, LoaderError> {
        let path = self.resolve_path()?;
        info!("Loading {} data from {}", self.config.ticker, path.display());

        let df = load_dataframe(&path)?;
        let raw_rows = df.height();
        let mut series = dataframe_to_series(&df)?;

        if self.config.start_date.is_some() || self.config.end_date.is_some() {
            let start = self.config.start_date.unwrap_or(NaiveDate::MIN);
            // end_date is inclusive
            let end = self
                .config
                .end_date
                .and_then(|d| d.succ_opt())
                .unwrap_or(NaiveDate::MAX);
            series = series.slice(start, end);
        }

        debug!(
            "Sanitized {} raw rows into {} bars",
            raw_rows,
            series.len()
        );
        Ok(series)
    }
}

impl DataSource for DataManager {
    fn get_full_data(&self) -> Result<PriceSeries, LoaderError> {
        if let Some(series) = self.cache.get() {
            return Ok(series.clone());
        }
        let series = self.load()?;
        Ok(self.cache.get_or_init(|| series).clone())
    }

    fn get_data_slice(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, LoaderError> {
        if let Some(series) = self.cache.get() {
            return Ok(series.slice(start, end));
        }
        let series = self.load()?;
        Ok(self.cache.get_or_init(|| series).slice(start, end))
    }
}

/// Read a CSV or parquet file into a DataFrame.
pub fn load_dataframe(path: &Path) -> Result<DataFrame, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }

    let is_parquet = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("parquet"))
        .unwrap_or(false);

    let lf = if is_parquet {
        LazyFrame::scan_parquet(path, ScanArgsParquet::default())?
    } else {
        LazyCsvReader::new(path).with_has_header(true).finish()?
    };

    Ok(lf.collect()?)
}

/// Find a column by case-insensitive name.
fn find_column(df: &DataFrame, name: &str) -> Result<String, LoaderError> {
    df.get_column_names()
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(name))
        .map(|c| c.to_string())
        .ok_or_else(|| LoaderError::MissingColumn(name.to_string()))
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, LoaderError> {
    let column = df.column(&find_column(df, name)?)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn date_column(df: &DataFrame) -> Result<Vec<Option<NaiveDate>>, LoaderError> {
    let column = df.column(&find_column(df, "date")?)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|s| s.and_then(parse_date))
        .collect())
}

/// Parse the leading `YYYY-MM-DD` of a date or timestamp string.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Convert an OHLCV DataFrame to a sanitized `PriceSeries`.
pub fn dataframe_to_series(df: &DataFrame) -> Result<PriceSeries, LoaderError> {
    let dates = date_column(df)?;
    let opens = float_column(df, "open")?;
    let highs = float_column(df, "high")?;
    let lows = float_column(df, "low")?;
    let closes = float_column(df, "close")?;
    let volumes = float_column(df, "volume")?;

    let mut bars = Vec::with_capacity(dates.len());
    for i in 0..dates.len() {
        let (Some(date), Some(open), Some(high), Some(low), Some(close), Some(volume)) =
            (dates[i], opens[i], highs[i], lows[i], closes[i], volumes[i])
        else {
            continue;
        };
        let bar = Bar {
            date,
            open,
            high,
            low,
            close,
            volume,
        };
        if bar.is_finite() {
            bars.push(bar);
        }
    }

    if bars.is_empty() && df.height() > 0 {
        return Err(LoaderError::InvalidData(
            "no parseable OHLCV rows".to_string(),
        ));
    }

    Ok(PriceSeries::new(bars))
}
