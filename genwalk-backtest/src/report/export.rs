//! CSV and JSON export of backtest and walk-forward results.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::backtest::{EquityPoint, Trade};
use crate::walkforward::{WalkForwardReport, WindowStatus};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Files written by [`export_walk_forward`].
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub windows_csv: PathBuf,
    pub report_json: PathBuf,
}

/// One row per processed window, in window order.
pub fn windows_dataframe(report: &WalkForwardReport) -> Result<DataFrame, ExportError> {
    let rows = &report.windows;
    let df = df!(
        "window" => rows.iter().map(|r| r.window.index as i64 + 1).collect::<Vec<_>>(),
        "train_start" => rows.iter().map(|r| r.window.train_start.to_string()).collect::<Vec<_>>(),
        "train_end" => rows.iter().map(|r| r.window.train_end.to_string()).collect::<Vec<_>>(),
        "test_start" => rows.iter().map(|r| r.window.test_start.to_string()).collect::<Vec<_>>(),
        "test_end" => rows.iter().map(|r| r.window.test_end.to_string()).collect::<Vec<_>>(),
        "sma_f" => rows.iter().map(|r| r.best_params.sma_fast as i64).collect::<Vec<_>>(),
        "sma_s" => rows.iter().map(|r| r.best_params.sma_slow as i64).collect::<Vec<_>>(),
        "rsi_p" => rows.iter().map(|r| r.best_params.rsi_period as i64).collect::<Vec<_>>(),
        "rsi_up" => rows.iter().map(|r| r.best_params.rsi_upper as i64).collect::<Vec<_>>(),
        "rsi_lo" => rows.iter().map(|r| r.best_params.rsi_lower as i64).collect::<Vec<_>>(),
        "sl" => rows.iter().map(|r| r.best_params.stop_loss).collect::<Vec<_>>(),
        "tp" => rows.iter().map(|r| r.best_params.take_profit).collect::<Vec<_>>(),
        "in_sample_fitness" => rows.iter().map(|r| r.in_sample_fitness).collect::<Vec<_>>(),
        "profit_pct" => rows.iter().map(|r| r.profit_pct).collect::<Vec<_>>(),
        "max_drawdown_pct" => rows.iter().map(|r| r.max_drawdown_pct).collect::<Vec<_>>(),
        "trades" => rows.iter().map(|r| r.trade_count as i64).collect::<Vec<_>>(),
        "win_rate" => rows.iter().map(|r| r.win_rate).collect::<Vec<_>>(),
        "sharpe" => rows.iter().map(|r| r.sharpe_ratio).collect::<Vec<_>>(),
        "status" => rows.iter().map(|r| status_label(&r.status).to_string()).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

/// One row per closed trade.
pub fn trades_dataframe(trades: &[Trade]) -> Result<DataFrame, ExportError> {
    let df = df!(
        "entry_date" => trades.iter().map(|t| t.entry_date.to_string()).collect::<Vec<_>>(),
        "exit_date" => trades.iter().map(|t| t.exit_date.to_string()).collect::<Vec<_>>(),
        "entry_price" => trades.iter().map(|t| t.entry_price).collect::<Vec<_>>(),
        "exit_price" => trades.iter().map(|t| t.exit_price).collect::<Vec<_>>(),
        "quantity" => trades.iter().map(|t| t.quantity.to_f64().unwrap_or(0.0)).collect::<Vec<_>>(),
        "pnl" => trades.iter().map(|t| t.pnl.to_f64().unwrap_or(0.0)).collect::<Vec<_>>(),
        "commission" => trades.iter().map(|t| t.commission.to_f64().unwrap_or(0.0)).collect::<Vec<_>>(),
        "return_pct" => trades.iter().map(|t| t.return_pct()).collect::<Vec<_>>(),
        "exit_reason" => trades.iter().map(|t| t.exit_reason.to_string()).collect::<Vec<_>>(),
        "bars_held" => trades.iter().map(|t| t.bars_held as i64).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

/// Daily equity curve.
pub fn equity_dataframe(curve: &[EquityPoint]) -> Result<DataFrame, ExportError> {
    let df = df!(
        "date" => curve.iter().map(|p| p.date.to_string()).collect::<Vec<_>>(),
        "equity" => curve.iter().map(|p| p.equity.to_f64().unwrap_or(0.0)).collect::<Vec<_>>(),
        "cash" => curve.iter().map(|p| p.cash.to_f64().unwrap_or(0.0)).collect::<Vec<_>>(),
        "in_position" => curve.iter().map(|p| p.in_position).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

fn status_label(status: &WindowStatus) -> &'static str {
    match status {
        WindowStatus::Completed => "completed",
        WindowStatus::BacktestFailed => "backtest_failed",
    }
}

/// Write a DataFrame as CSV with a header row.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), ExportError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ExportError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Write `{ticker}_windows.csv` and `{ticker}_walk_forward.json` into `dir`.
pub fn export_walk_forward(
    report: &WalkForwardReport,
    dir: &Path,
) -> Result<ExportPaths, ExportError> {
    fs::create_dir_all(dir)?;
    let stem = file_stem(&report.ticker);

    let windows_csv = dir.join(format!("{}_windows.csv", stem));
    let mut df = windows_dataframe(report)?;
    write_csv(&mut df, &windows_csv)?;

    let report_json = dir.join(format!("{}_walk_forward.json", stem));
    write_json(report, &report_json)?;

    info!(
        "Exported {} windows to {} and {}",
        report.windows.len(),
        windows_csv.display(),
        report_json.display()
    );

    Ok(ExportPaths {
        windows_csv,
        report_json,
    })
}

fn file_stem(ticker: &str) -> String {
    if ticker.is_empty() {
        return "report".to_string();
    }
    ticker
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
