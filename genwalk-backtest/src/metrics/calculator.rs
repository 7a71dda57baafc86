//! Performance metrics calculator.
//!
//! Calculates trading performance statistics for a single backtest and
//! descriptive statistics for collections of window results.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

use crate::backtest::{BacktestResult, EquityPoint, Trade};

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Descriptive statistics over the finite values of a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl SummaryStats {
    /// Non-finite values are ignored. An empty sample yields all zeros.
    pub fn from_values(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self::default();
        }

        Self {
            count: finite.len(),
            mean: Statistics::mean(finite.iter()),
            median: Data::new(finite.clone()).median(),
            std_dev: Statistics::population_std_dev(finite.iter()),
            min: Statistics::min(finite.iter()),
            max: Statistics::max(finite.iter()),
        }
    }
}

/// Comprehensive performance metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Basic statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // P&L metrics
    pub total_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: f64,
    pub avg_trade_pnl: Decimal,
    pub avg_winner: Decimal,
    pub avg_loser: Decimal,
    pub largest_winner: Decimal,
    pub largest_loser: Decimal,

    // Return metrics
    pub total_return_pct: f64,
    pub cagr: f64,

    // Risk metrics
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub avg_drawdown: f64,
    pub drawdown_duration_days: i64,

    // Risk-adjusted returns
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    // Time metrics
    pub trading_days: usize,
    pub avg_bars_in_trade: f64,
    pub exits_by_reason: BTreeMap<String, usize>,

    // Commission
    pub total_commission: Decimal,
    pub commission_pct_of_pnl: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: Decimal::ZERO,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            profit_factor: 0.0,
            avg_trade_pnl: Decimal::ZERO,
            avg_winner: Decimal::ZERO,
            avg_loser: Decimal::ZERO,
            largest_winner: Decimal::ZERO,
            largest_loser: Decimal::ZERO,
            total_return_pct: 0.0,
            cagr: 0.0,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            avg_drawdown: 0.0,
            drawdown_duration_days: 0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            trading_days: 0,
            avg_bars_in_trade: 0.0,
            exits_by_reason: BTreeMap::new(),
            total_commission: Decimal::ZERO,
            commission_pct_of_pnl: 0.0,
        }
    }
}

impl PerformanceMetrics {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let exits = self
            .exits_by_reason
            .iter()
            .map(|(reason, count)| format!("{}={}", reason, count))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Performance Summary\n\
             ====================\n\
             \n\
             Trades: {} (W: {}, L: {})\n\
             Win Rate: {:.1}%\n\
             Profit Factor: {:.2}\n\
             Exits: {}\n\
             \n\
             Total P&L: ${:.2}\n\
             Avg Trade: ${:.2}\n\
             Avg Winner: ${:.2}\n\
             Avg Loser: ${:.2}\n\
             Largest Win: ${:.2}\n\
             Largest Loss: ${:.2}\n\
             \n\
             Total Return: {:.2}%\n\
             CAGR: {:.2}%\n\
             \n\
             Max Drawdown: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             Sortino Ratio: {:.2}\n\
             Calmar Ratio: {:.2}\n\
             \n\
             Avg Bars in Trade: {:.1}\n\
             Commission: ${:.2} ({:.2}% of P&L)",
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate * 100.0,
            self.profit_factor,
            if exits.is_empty() { "none" } else { exits.as_str() },
            self.total_pnl,
            self.avg_trade_pnl,
            self.avg_winner,
            self.avg_loser,
            self.largest_winner,
            self.largest_loser,
            self.total_return_pct,
            self.cagr,
            self.max_drawdown_pct,
            self.sharpe_ratio,
            self.sortino_ratio,
            self.calmar_ratio,
            self.avg_bars_in_trade,
            self.total_commission,
            self.commission_pct_of_pnl
        )
    }
}

/// Drawdown analysis details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub max_drawdown_date: Option<NaiveDate>,
    pub peak_date: Option<NaiveDate>,
    pub recovery_date: Option<NaiveDate>,
    pub duration_days: i64,
    pub avg_drawdown_pct: f64,
    pub drawdown_periods: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from a backtest result.
    pub fn calculate(result: &BacktestResult) -> PerformanceMetrics {
        let trades = &result.trades;

        let total_trades = trades.len();
        let winning_trades = result.winning_trades;
        let losing_trades = result.losing_trades;

        let largest_winner = trades
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.pnl())
            .max()
            .unwrap_or(Decimal::ZERO);

        let largest_loser = trades
            .iter()
            .filter(|t| !t.is_winner())
            .map(|t| t.pnl())
            .min()
            .unwrap_or(Decimal::ZERO);

        let cagr = Self::calculate_cagr(result.initial_cash, result.final_equity, result.trading_days);

        let drawdown = Self::analyze_drawdown(&result.equity_curve);

        let returns = result.daily_returns();
        let sharpe_ratio = Self::sharpe_ratio(&returns);
        let sortino_ratio = Self::sortino_ratio(&returns);
        let calmar_ratio = if drawdown.max_drawdown_pct > 0.0 {
            cagr / drawdown.max_drawdown_pct
        } else {
            0.0
        };

        let avg_bars_in_trade = if total_trades > 0 {
            trades.iter().map(|t| t.bars_held as f64).sum::<f64>() / total_trades as f64
        } else {
            0.0
        };

        let total_pnl = result.total_pnl;
        let total_commission = result.total_commission;
        let commission_pct_of_pnl = if !total_pnl.is_zero() {
            let comm: f64 = total_commission.abs().try_into().unwrap_or(0.0);
            let pnl: f64 = total_pnl.abs().try_into().unwrap_or(1.0);
            comm / pnl * 100.0
        } else {
            0.0
        };

        PerformanceMetrics {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: result.win_rate(),
            total_pnl,
            gross_profit: result.gross_profit,
            gross_loss: result.gross_loss,
            profit_factor: result.profit_factor(),
            avg_trade_pnl: result.avg_trade_pnl(),
            avg_winner: result.avg_winner(),
            avg_loser: result.avg_loser(),
            largest_winner,
            largest_loser,
            total_return_pct: result.total_return_pct,
            cagr,
            max_drawdown: drawdown.max_drawdown,
            max_drawdown_pct: drawdown.max_drawdown_pct,
            avg_drawdown: drawdown.avg_drawdown_pct,
            drawdown_duration_days: drawdown.duration_days,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            trading_days: result.trading_days,
            avg_bars_in_trade,
            exits_by_reason: Self::exits_by_reason(trades),
            total_commission,
            commission_pct_of_pnl,
        }
    }

    /// Simple daily returns of an equity curve.
    pub fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
        equity_curve
            .windows(2)
            .filter_map(|w| {
                let prev: f64 = w[0].equity.try_into().ok()?;
                let curr: f64 = w[1].equity.try_into().ok()?;
                (prev != 0.0).then(|| (curr - prev) / prev)
            })
            .collect()
    }

    /// Annualized Sharpe ratio with a zero risk-free rate.
    pub fn sharpe_ratio(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let mean = Statistics::mean(returns.iter());
        let std_dev = Statistics::population_std_dev(returns.iter());
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }
        mean * TRADING_DAYS_PER_YEAR.sqrt() / std_dev
    }

    /// Annualized Sortino ratio using downside deviation.
    pub fn sortino_ratio(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }

        let mean = Statistics::mean(returns.iter());
        let downside_variance = returns
            .iter()
            .filter(|&&r| r < 0.0)
            .map(|r| r.powi(2))
            .sum::<f64>()
            / returns.len() as f64;
        let downside_dev = downside_variance.sqrt();

        if downside_dev == 0.0 {
            return 0.0;
        }

        mean * TRADING_DAYS_PER_YEAR.sqrt() / downside_dev
    }

    /// Calculate CAGR (Compound Annual Growth Rate).
    pub fn calculate_cagr(initial: Decimal, final_val: Decimal, trading_days: usize) -> f64 {
        let init: f64 = initial.try_into().unwrap_or(1.0);
        let fin: f64 = final_val.try_into().unwrap_or(1.0);

        if init <= 0.0 || fin <= 0.0 || trading_days == 0 {
            return 0.0;
        }

        let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
        ((fin / init).powf(1.0 / years) - 1.0) * 100.0
    }

    /// Analyze drawdown from an equity curve.
    pub fn analyze_drawdown(equity_curve: &[EquityPoint]) -> DrawdownAnalysis {
        let Some(first) = equity_curve.first() else {
            return DrawdownAnalysis::default();
        };

        let mut peak = first.equity;
        let mut peak_date = first.date;
        let mut max_drawdown = Decimal::ZERO;
        let mut max_drawdown_pct = 0.0;
        let mut max_drawdown_date = first.date;
        let mut max_drawdown_peak_date = first.date;
        let mut recovery_date = None;
        let mut drawdown_start: Option<NaiveDate> = None;
        let mut max_duration = 0i64;
        let mut drawdowns = Vec::new();
        let mut periods = 0;

        for point in equity_curve {
            if point.equity >= peak {
                if let Some(start) = drawdown_start.take() {
                    periods += 1;
                    max_duration = max_duration.max((point.date - start).num_days());
                    if peak_date == max_drawdown_peak_date && recovery_date.is_none() && !max_drawdown.is_zero() {
                        recovery_date = Some(point.date);
                    }
                }
                peak = point.equity;
                peak_date = point.date;
                continue;
            }

            let drawdown = peak - point.equity;
            let drawdown_pct = if peak > Decimal::ZERO {
                let dd: f64 = drawdown.try_into().unwrap_or(0.0);
                let pk: f64 = peak.try_into().unwrap_or(1.0);
                dd / pk * 100.0
            } else {
                0.0
            };

            let start = *drawdown_start.get_or_insert(peak_date);
            max_duration = max_duration.max((point.date - start).num_days());

            if drawdown_pct > max_drawdown_pct {
                max_drawdown = drawdown;
                max_drawdown_pct = drawdown_pct;
                max_drawdown_date = point.date;
                if max_drawdown_peak_date != peak_date {
                    recovery_date = None;
                }
                max_drawdown_peak_date = peak_date;
            }

            drawdowns.push(drawdown_pct);
        }

        if drawdown_start.is_some() {
            periods += 1;
        }

        let avg_drawdown_pct = if !drawdowns.is_empty() {
            drawdowns.iter().sum::<f64>() / drawdowns.len() as f64
        } else {
            0.0
        };

        DrawdownAnalysis {
            max_drawdown,
            max_drawdown_pct,
            max_drawdown_date: Some(max_drawdown_date),
            peak_date: Some(max_drawdown_peak_date),
            recovery_date,
            duration_days: max_duration,
            avg_drawdown_pct,
            drawdown_periods: periods,
        }
    }

    /// Count trades by exit reason.
    fn exits_by_reason(trades: &[Trade]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for trade in trades {
            *counts.entry(trade.exit_reason.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn point(day: u32, equity: Decimal) -> EquityPoint {
        EquityPoint {
            date: NaiveDate::from_ymd_opt(2021, 1, day).unwrap(),
            equity,
            cash: equity,
            positions_value: Decimal::ZERO,
            in_position: false,
            daily_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn test_summary_stats() {
        let stats = SummaryStats::from_values(&[1.0, 2.0, 3.0, 4.0, f64::NAN]);
        assert_eq!(stats.count, 4);
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.median, 2.5);
        assert_relative_eq!(stats.std_dev, 1.25_f64.sqrt());
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 4.0);
    }

    #[test]
    fn test_summary_stats_empty() {
        let stats = SummaryStats::from_values(&[f64::INFINITY]);
        assert_eq!(stats, SummaryStats::default());
    }

    #[test]
    fn test_cagr() {
        // 100K -> 121K over 2 years (504 days) = 10% CAGR
        let cagr = MetricsCalculator::calculate_cagr(dec!(100000), dec!(121000), 504);
        assert_relative_eq!(cagr, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sharpe_flat_is_zero() {
        assert_eq!(MetricsCalculator::sharpe_ratio(&[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(MetricsCalculator::sharpe_ratio(&[0.01]), 0.0);
    }

    #[test]
    fn test_sharpe_and_sortino_sign() {
        let returns = [0.01, -0.005, 0.02, 0.0, -0.01, 0.015];
        assert!(MetricsCalculator::sharpe_ratio(&returns) > 0.0);
        assert!(MetricsCalculator::sortino_ratio(&returns) > 0.0);
        assert_eq!(MetricsCalculator::sortino_ratio(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn test_daily_returns() {
        let curve = vec![point(1, dec!(100)), point(2, dec!(110)), point(3, dec!(99))];
        let returns = MetricsCalculator::daily_returns(&curve);
        assert_relative_eq!(returns[0], 0.1);
        assert_relative_eq!(returns[1], -0.1);
    }

    #[test]
    fn test_drawdown_analysis() {
        let curve = vec![
            point(1, dec!(100)),
            point(2, dec!(120)),
            point(3, dec!(90)),
            point(4, dec!(100)),
            point(5, dec!(125)),
        ];
        let analysis = MetricsCalculator::analyze_drawdown(&curve);
        assert_eq!(analysis.max_drawdown, dec!(30));
        assert_relative_eq!(analysis.max_drawdown_pct, 25.0);
        assert_eq!(analysis.peak_date, NaiveDate::from_ymd_opt(2021, 1, 2));
        assert_eq!(analysis.max_drawdown_date, NaiveDate::from_ymd_opt(2021, 1, 3));
        assert_eq!(analysis.recovery_date, NaiveDate::from_ymd_opt(2021, 1, 5));
        assert_eq!(analysis.duration_days, 3);
        assert_eq!(analysis.drawdown_periods, 1);
    }

    #[test]
    fn test_drawdown_analysis_empty() {
        let analysis = MetricsCalculator::analyze_drawdown(&[]);
        assert_eq!(analysis.max_drawdown_pct, 0.0);
        assert_eq!(analysis.drawdown_periods, 0);
    }

    #[test]
    fn test_performance_metrics_default() {
        let metrics = PerformanceMetrics::default();
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert!(metrics.summary().contains("Exits: none"));
    }
}
