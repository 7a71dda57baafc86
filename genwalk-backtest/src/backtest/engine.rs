//! Core backtesting engine.
//!
//! Runs the simulation loop over daily bars:
//! 1. Fill the order queued on the previous bar at this bar's open
//! 2. Check bracket exits on the open position
//! 3. Evaluate entry/exit signals at the close
//! 4. Record daily equity
//!
//! The engine itself is immutable so one instance can be shared across
//! threads; all per-run state lives in a `Simulation`.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Bar;
use crate::genetic::StrategyParams;
use crate::metrics::MetricsCalculator;

use super::commission::CommissionModel;
use super::indicators::{rsi, sma};
use super::trade::{price_to_decimal, ExitReason, Position, Trade};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("Price series is empty")]
    EmptySeries,

    #[error("Invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error("Backtest failed: {0}")]
    Failed(String),
}

/// Configuration for backtest execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting cash.
    pub initial_cash: Decimal,

    /// Percentage of available cash committed per entry.
    pub allocation_pct: f64,

    /// Commission model. Derived from the ticker when unset.
    pub commission: Option<CommissionModel>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::from(10_000),
            allocation_pct: 95.0,
            commission: None,
        }
    }
}

/// Daily equity snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: Decimal,
    pub cash: Decimal,
    pub positions_value: Decimal,
    pub in_position: bool,
    pub daily_pnl: Decimal,
}

/// Result of a completed backtest.
#[derive(Debug, Clone)]
pub struct BacktestResult {
    /// Parameters used.
    pub params: StrategyParams,

    /// First bar date (including warm-up bars).
    pub start_date: NaiveDate,

    /// Last bar date.
    pub end_date: NaiveDate,

    /// First date on which entries were allowed.
    pub activation_date: Option<NaiveDate>,

    /// All completed trades.
    pub trades: Vec<Trade>,

    /// Daily equity curve from the activation date on.
    pub equity_curve: Vec<EquityPoint>,

    /// Starting cash.
    pub initial_cash: Decimal,

    /// Final equity.
    pub final_equity: Decimal,

    /// Total return percentage.
    pub total_return_pct: f64,

    /// Number of recorded trading days.
    pub trading_days: usize,

    /// Peak equity.
    pub peak_equity: Decimal,

    /// Maximum drawdown.
    pub max_drawdown: Decimal,

    /// Maximum drawdown percentage (peak to trough).
    pub max_drawdown_pct: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub total_commission: Decimal,
}

impl BacktestResult {
    /// Fraction of trades that were profitable.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    /// Calculate profit factor.
    pub fn profit_factor(&self) -> f64 {
        let loss: f64 = self.gross_loss.abs().try_into().unwrap_or(0.0);
        if loss == 0.0 {
            return f64::INFINITY;
        }
        let profit: f64 = self.gross_profit.try_into().unwrap_or(0.0);
        profit / loss
    }

    /// Calculate average trade P&L.
    pub fn avg_trade_pnl(&self) -> Decimal {
        if self.total_trades == 0 {
            return Decimal::ZERO;
        }
        self.total_pnl / Decimal::from(self.total_trades as i64)
    }

    /// Calculate average winner.
    pub fn avg_winner(&self) -> Decimal {
        if self.winning_trades == 0 {
            return Decimal::ZERO;
        }
        self.gross_profit / Decimal::from(self.winning_trades as i64)
    }

    /// Calculate average loser.
    pub fn avg_loser(&self) -> Decimal {
        if self.losing_trades == 0 {
            return Decimal::ZERO;
        }
        self.gross_loss / Decimal::from(self.losing_trades as i64)
    }

    /// Daily returns of the equity curve.
    pub fn daily_returns(&self) -> Vec<f64> {
        MetricsCalculator::daily_returns(&self.equity_curve)
    }

    /// Annualized Sharpe ratio (risk-free rate = 0).
    pub fn sharpe_ratio(&self) -> f64 {
        MetricsCalculator::sharpe_ratio(&self.daily_returns())
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        format!(
            "Backtest Results ({} to {})\n\
             ----------------------------------------\n\
             Params: {}\n\
             Total Return: {:.2}%\n\
             Final Equity: ${:.2}\n\
             Max Drawdown: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             \n\
             Trades: {} (W: {}, L: {})\n\
             Win Rate: {:.1}%\n\
             Profit Factor: {:.2}\n\
             Avg Trade: ${:.2}\n\
             Avg Winner: ${:.2}\n\
             Avg Loser: ${:.2}\n\
             \n\
             Total Commission: ${:.2}",
            self.activation_date.unwrap_or(self.start_date),
            self.end_date,
            self.params.key(),
            self.total_return_pct,
            self.final_equity,
            self.max_drawdown_pct,
            self.sharpe_ratio(),
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate() * 100.0,
            self.profit_factor(),
            self.avg_trade_pnl(),
            self.avg_winner(),
            self.avg_loser(),
            self.total_commission,
        )
    }
}

/// Compact backtest outcome consumed by fitness evaluation and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    /// Net profit as a percentage of starting cash.
    pub profit_pct: f64,
    /// Largest peak-to-trough equity decline, in percent.
    pub max_drawdown_pct: f64,
    pub trade_count: usize,
    /// Winning trades as a percentage of all trades; 0 without trades.
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub final_equity: Decimal,
}

impl BacktestSummary {
    /// True when every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        self.profit_pct.is_finite()
            && self.max_drawdown_pct.is_finite()
            && self.win_rate.is_finite()
            && self.sharpe_ratio.is_finite()
    }
}

impl From<&BacktestResult> for BacktestSummary {
    fn from(result: &BacktestResult) -> Self {
        Self {
            profit_pct: result.total_return_pct,
            max_drawdown_pct: result.max_drawdown_pct,
            trade_count: result.total_trades,
            win_rate: result.win_rate() * 100.0,
            sharpe_ratio: result.sharpe_ratio(),
            final_equity: result.final_equity,
        }
    }
}

/// Runs one strategy over a bar sequence.
///
/// Entries are only allowed on or after `activation_date`; bars before it
/// only warm up the indicators.
pub trait Backtester: Sync {
    fn run(
        &self,
        params: &StrategyParams,
        bars: &[Bar],
        activation_date: Option<NaiveDate>,
    ) -> Result<BacktestSummary, BacktestError>;
}

/// The main backtesting engine.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: BacktestConfig,
    commission: CommissionModel,
}

impl BacktestEngine {
    /// Create an engine; an unset commission model uses the default rate.
    pub fn new(config: BacktestConfig) -> Self {
        let commission = config.commission.clone().unwrap_or_default();
        Self { config, commission }
    }

    /// Create an engine whose default commission follows the ticker.
    pub fn for_ticker(config: BacktestConfig, ticker: &str) -> Self {
        let commission = config
            .commission
            .clone()
            .unwrap_or_else(|| CommissionModel::for_ticker(ticker));
        Self { config, commission }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn commission(&self) -> &CommissionModel {
        &self.commission
    }

    /// Run a full backtest over pre-loaded bars.
    pub fn run_with_data(
        &self,
        params: &StrategyParams,
        bars: &[Bar],
        activation_date: Option<NaiveDate>,
    ) -> Result<BacktestResult, BacktestError> {
        validate_params(params)?;
        let (first, last) = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(BacktestError::EmptySeries),
        };

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let signals = Signals {
            sma_fast: sma(&closes, params.sma_fast as usize),
            sma_slow: sma(&closes, params.sma_slow as usize),
            rsi: rsi(&closes, params.rsi_period as usize),
        };

        let mut sim = Simulation::new(&self.config, &self.commission, params, activation_date);
        for (i, bar) in bars.iter().enumerate() {
            sim.process_day(i, bar, &signals);
        }
        sim.close_remaining_positions(bars.len() - 1, last);

        Ok(sim.build_result(first.date, last.date))
    }
}

impl Backtester for BacktestEngine {
    fn run(
        &self,
        params: &StrategyParams,
        bars: &[Bar],
        activation_date: Option<NaiveDate>,
    ) -> Result<BacktestSummary, BacktestError> {
        self.run_with_data(params, bars, activation_date)
            .map(|result| BacktestSummary::from(&result))
    }
}

fn validate_params(params: &StrategyParams) -> Result<(), BacktestError> {
    if params.sma_fast == 0 || params.sma_slow == 0 || params.rsi_period == 0 {
        return Err(BacktestError::InvalidParameters(
            "indicator periods must be positive".to_string(),
        ));
    }
    if !params.is_structurally_valid() {
        return Err(BacktestError::InvalidParameters(format!(
            "SMA_F ({}) must be below SMA_S ({})",
            params.sma_fast, params.sma_slow
        )));
    }
    if !(params.stop_loss > 0.0 && params.stop_loss < 1.0) || !(params.take_profit > 0.0) {
        return Err(BacktestError::InvalidParameters(format!(
            "SL ({}) must be in (0, 1) and TP ({}) positive",
            params.stop_loss, params.take_profit
        )));
    }
    Ok(())
}

/// Indicator series aligned with the bars.
struct Signals {
    sma_fast: Vec<f64>,
    sma_slow: Vec<f64>,
    rsi: Vec<f64>,
}

/// Order queued at a close, filled at the next open.
#[derive(Debug, Clone, Copy)]
enum PendingOrder {
    Entry { stop_price: f64, target_price: f64 },
    Exit,
}

/// Mutable state of a single backtest run.
struct Simulation<'a> {
    config: &'a BacktestConfig,
    commission: &'a CommissionModel,
    params: &'a StrategyParams,
    activation_date: Option<NaiveDate>,
    cash: Decimal,
    equity: Decimal,
    position: Option<Position>,
    pending: Option<PendingOrder>,
    closed_trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    peak_equity: Decimal,
    max_drawdown: Decimal,
    max_drawdown_pct: f64,
    total_commission: Decimal,
}

impl<'a> Simulation<'a> {
    fn new(
        config: &'a BacktestConfig,
        commission: &'a CommissionModel,
        params: &'a StrategyParams,
        activation_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            config,
            commission,
            params,
            activation_date,
            cash: config.initial_cash,
            equity: config.initial_cash,
            position: None,
            pending: None,
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            peak_equity: config.initial_cash,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            total_commission: Decimal::ZERO,
        }
    }

    fn is_active(&self, date: NaiveDate) -> bool {
        self.activation_date.map_or(true, |activation| date >= activation)
    }

    /// Process a single trading day.
    fn process_day(&mut self, index: usize, bar: &Bar, signals: &Signals) {
        self.fill_pending(index, bar);
        self.check_exits(index, bar);
        self.evaluate_signals(index, bar, signals);
        self.mark_to_market(bar);
    }

    fn fill_pending(&mut self, index: usize, bar: &Bar) {
        match self.pending.take() {
            Some(PendingOrder::Entry {
                stop_price,
                target_price,
            }) if self.position.is_none() => {
                self.open_position(index, bar, stop_price, target_price);
            }
            Some(PendingOrder::Exit) => {
                if let Some(position) = self.position.take() {
                    self.close_position(position, index, bar.date, bar.open, ExitReason::Signal);
                }
            }
            _ => {}
        }
    }

    fn open_position(&mut self, index: usize, bar: &Bar, stop_price: f64, target_price: f64) {
        let price = price_to_decimal(bar.open);
        if price <= Decimal::ZERO {
            return;
        }

        let allocation = self.cash * price_to_decimal(self.config.allocation_pct / 100.0);
        let unit_cost = price * (Decimal::ONE + self.commission.rate);
        let quantity = (allocation / unit_cost).round_dp_with_strategy(8, RoundingStrategy::ToZero);
        if quantity <= Decimal::ZERO {
            return;
        }

        let notional = quantity * price;
        let commission = self.commission.calculate(notional).total;
        if notional + commission > self.cash {
            return;
        }

        self.cash -= notional + commission;
        self.total_commission += commission;
        self.position = Some(Position {
            entry_date: bar.date,
            entry_index: index,
            entry_price: bar.open,
            quantity,
            stop_price,
            target_price,
            entry_commission: commission,
        });
    }

    fn close_position(
        &mut self,
        position: Position,
        index: usize,
        date: NaiveDate,
        price: f64,
        reason: ExitReason,
    ) {
        let proceeds = position.market_value(price);
        let commission = self.commission.calculate(proceeds).total;
        self.cash += proceeds - commission;
        self.total_commission += commission;
        self.closed_trades
            .push(position.close(date, index, price, reason, commission));
    }

    /// Bracket exits apply from the bar after the entry fill.
    fn check_exits(&mut self, index: usize, bar: &Bar) {
        let triggered = match &self.position {
            Some(position) if position.entry_index < index => {
                position.bracket_exit(bar.open, bar.high, bar.low)
            }
            _ => None,
        };

        if let Some((reason, price)) = triggered {
            if let Some(position) = self.position.take() {
                self.close_position(position, index, bar.date, price, reason);
            }
        }
    }

    fn evaluate_signals(&mut self, index: usize, bar: &Bar, signals: &Signals) {
        if self.pending.is_some() {
            return;
        }

        let sma_fast = signals.sma_fast[index];
        let sma_slow = signals.sma_slow[index];
        let rsi = signals.rsi[index];
        if sma_fast.is_nan() || sma_slow.is_nan() || rsi.is_nan() {
            return;
        }

        let close = bar.close;
        if self.position.is_none() {
            let entry = close > sma_fast
                && sma_fast > sma_slow
                && rsi < self.params.rsi_lower as f64;
            if entry && self.is_active(bar.date) {
                self.pending = Some(PendingOrder::Entry {
                    stop_price: close * (1.0 - self.params.stop_loss),
                    target_price: close * (1.0 + self.params.take_profit),
                });
            }
        } else if rsi > self.params.rsi_upper as f64 || close < sma_slow {
            self.pending = Some(PendingOrder::Exit);
        }
    }

    fn mark_to_market(&mut self, bar: &Bar) {
        let positions_value = self
            .position
            .as_ref()
            .map(|p| p.market_value(bar.close))
            .unwrap_or(Decimal::ZERO);
        self.equity = self.cash + positions_value;

        if !self.is_active(bar.date) {
            return;
        }

        self.track_drawdown();

        let prev_equity = self
            .equity_curve
            .last()
            .map(|e| e.equity)
            .unwrap_or(self.config.initial_cash);

        self.equity_curve.push(EquityPoint {
            date: bar.date,
            equity: self.equity,
            cash: self.cash,
            positions_value,
            in_position: self.position.is_some(),
            daily_pnl: self.equity - prev_equity,
        });
    }

    fn track_drawdown(&mut self) {
        if self.equity > self.peak_equity {
            self.peak_equity = self.equity;
        }
        let drawdown = self.peak_equity - self.equity;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        if self.peak_equity > Decimal::ZERO {
            let dd: f64 = drawdown.try_into().unwrap_or(0.0);
            let peak: f64 = self.peak_equity.try_into().unwrap_or(1.0);
            self.max_drawdown_pct = self.max_drawdown_pct.max(dd / peak * 100.0);
        }
    }

    /// Close any open position at the last close.
    fn close_remaining_positions(&mut self, index: usize, last: &Bar) {
        self.pending = None;
        let Some(position) = self.position.take() else {
            return;
        };
        self.close_position(position, index, last.date, last.close, ExitReason::EndOfPeriod);
        self.equity = self.cash;

        if let Some(point) = self.equity_curve.last_mut() {
            if point.date == last.date {
                point.daily_pnl += self.cash - point.equity;
                point.equity = self.cash;
                point.cash = self.cash;
                point.positions_value = Decimal::ZERO;
                point.in_position = false;
                self.track_drawdown();
            }
        }
    }

    /// Build the final backtest result.
    fn build_result(self, start_date: NaiveDate, end_date: NaiveDate) -> BacktestResult {
        let initial: f64 = self.config.initial_cash.try_into().unwrap_or(1.0);
        let final_eq: f64 = self.equity.try_into().unwrap_or(initial);
        let total_return_pct = if initial > 0.0 {
            (final_eq - initial) / initial * 100.0
        } else {
            0.0
        };

        let winning_trades = self.closed_trades.iter().filter(|t| t.is_winner()).count();
        let losing_trades = self.closed_trades.len() - winning_trades;

        let total_pnl: Decimal = self.closed_trades.iter().map(|t| t.pnl()).sum();
        let gross_profit: Decimal = self
            .closed_trades
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.pnl())
            .sum();
        let gross_loss: Decimal = self
            .closed_trades
            .iter()
            .filter(|t| !t.is_winner())
            .map(|t| t.pnl())
            .sum();

        BacktestResult {
            params: *self.params,
            start_date,
            end_date,
            activation_date: self.activation_date,
            total_trades: self.closed_trades.len(),
            trades: self.closed_trades,
            trading_days: self.equity_curve.len(),
            equity_curve: self.equity_curve,
            initial_cash: self.config.initial_cash,
            final_equity: self.equity,
            total_return_pct,
            peak_equity: self.peak_equity,
            max_drawdown: self.max_drawdown,
            max_drawdown_pct: self.max_drawdown_pct,
            winning_trades,
            losing_trades,
            total_pnl,
            gross_profit,
            gross_loss,
            total_commission: self.total_commission,
        }
    }
}
