//! Trade and position management for backtesting.
//!
//! Handles the long-only trade lifecycle:
//! - Entry (bracketed position creation)
//! - Mark-to-market
//! - Bracket exits (stop loss first, then take profit)
//! - P&L calculation

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reason for exiting a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Stop-loss leg of the bracket filled.
    StopLoss,
    /// Take-profit leg of the bracket filled.
    TakeProfit,
    /// Strategy exit signal.
    Signal,
    /// End of backtest period.
    EndOfPeriod,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::Signal => "signal",
            Self::EndOfPeriod => "end_of_period",
        };
        f.write_str(label)
    }
}

/// An open long position with its bracket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Date position was opened.
    pub entry_date: NaiveDate,
    /// Bar index of the entry fill.
    pub entry_index: usize,
    /// Fill price.
    pub entry_price: f64,
    /// Units held.
    pub quantity: Decimal,
    /// Protective stop price.
    pub stop_price: f64,
    /// Profit target price.
    pub target_price: f64,
    /// Entry commission paid.
    pub entry_commission: Decimal,
}

impl Position {
    /// Notional at entry.
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * price_to_decimal(self.entry_price)
    }

    /// Market value at `price`.
    pub fn market_value(&self, price: f64) -> Decimal {
        self.quantity * price_to_decimal(price)
    }

    /// Bracket exit triggered by a bar, with its fill price.
    ///
    /// The stop is checked first. Gaps through either level fill at the open.
    pub fn bracket_exit(&self, open: f64, high: f64, low: f64) -> Option<(ExitReason, f64)> {
        if low <= self.stop_price {
            Some((ExitReason::StopLoss, open.min(self.stop_price)))
        } else if high >= self.target_price {
            Some((ExitReason::TakeProfit, open.max(self.target_price)))
        } else {
            None
        }
    }

    /// Close the position and produce the completed trade.
    pub fn close(
        self,
        exit_date: NaiveDate,
        exit_index: usize,
        exit_price: f64,
        reason: ExitReason,
        exit_commission: Decimal,
    ) -> Trade {
        let gross = self.market_value(exit_price) - self.cost_basis();
        let commission = self.entry_commission + exit_commission;
        Trade {
            entry_date: self.entry_date,
            exit_date,
            entry_price: self.entry_price,
            exit_price,
            quantity: self.quantity,
            pnl: gross - commission,
            commission,
            exit_reason: reason,
            bars_held: exit_index.saturating_sub(self.entry_index),
        }
    }
}

/// A completed round-trip trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: Decimal,
    /// Net P&L after both commissions.
    pub pnl: Decimal,
    pub commission: Decimal,
    pub exit_reason: ExitReason,
    pub bars_held: usize,
}

impl Trade {
    /// Check if trade was profitable.
    pub fn is_winner(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    /// Net P&L.
    pub fn pnl(&self) -> Decimal {
        self.pnl
    }

    /// Return on the entry notional, in percent.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (self.exit_price - self.entry_price) / self.entry_price * 100.0
    }

    /// Calendar days between entry and exit.
    pub fn days_held(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}

/// Convert an f64 price to Decimal, falling back to zero for non-finite input.
pub fn price_to_decimal(price: f64) -> Decimal {
    Decimal::try_from(price).unwrap_or(Decimal::ZERO)
}
