//! Backtesting engine for the SMA/RSI long-only strategy.
//!
//! This module provides:
//! - Indicator computation (SMA, Wilder RSI)
//! - Trade lifecycle management (bracketed entry, exits)
//! - Commission tracking
//! - Equity curve and drawdown
//! - The `Backtester` seam used by the optimizer

pub mod commission;
pub mod engine;
pub mod indicators;
pub mod trade;

pub use commission::{Commission, CommissionModel};
pub use engine::{
    BacktestConfig, BacktestEngine, BacktestError, BacktestResult, BacktestSummary, Backtester,
    EquityPoint,
};
pub use trade::{ExitReason, Position, Trade};
