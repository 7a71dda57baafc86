//! Performance metrics module.
//!
//! Provides:
//! - Win rate, profit factor
//! - Sharpe ratio, Sortino ratio
//! - Drawdown analysis
//! - Descriptive statistics over window results

pub mod calculator;

pub use calculator::{
    DrawdownAnalysis, MetricsCalculator, PerformanceMetrics, SummaryStats,
    TRADING_DAYS_PER_YEAR,
};
