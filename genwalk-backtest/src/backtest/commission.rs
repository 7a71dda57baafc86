//! Commission model.
//!
//! Commission is a fixed rate on traded notional, charged on both entry
//! and exit. Crypto pairs default to 0.1%, everything else to 0.01%.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Commission charged on a single fill.
#[derive(Debug, Clone, Copy)]
pub struct Commission {
    pub notional: Decimal,
    pub rate: Decimal,
    pub total: Decimal,
}

impl Commission {
    pub fn calculate(notional: Decimal, rate: Decimal) -> Self {
        Self {
            notional,
            rate,
            total: notional.abs() * rate,
        }
    }
}

/// Configurable commission model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionModel {
    /// Fraction of notional charged per fill (0.001 = 0.1%).
    pub rate: Decimal,
    /// Minimum commission per fill.
    #[serde(default)]
    pub min_per_fill: Decimal,
}

impl Default for CommissionModel {
    fn default() -> Self {
        Self::new(Decimal::new(1, 4))
    }
}

impl CommissionModel {
    /// Create a model with the given rate and no minimum.
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate,
            min_per_fill: Decimal::ZERO,
        }
    }

    /// Create a zero-commission model.
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO)
    }

    /// Default model for a ticker: 0.1% for BTC/ETH pairs, 0.01% otherwise.
    pub fn for_ticker(ticker: &str) -> Self {
        let upper = ticker.to_ascii_uppercase();
        if upper.contains("BTC") || upper.contains("ETH") {
            Self::new(Decimal::new(1, 3))
        } else {
            Self::default()
        }
    }

    /// Commission for a fill of the given notional.
    pub fn calculate(&self, notional: Decimal) -> Commission {
        let mut commission = Commission::calculate(notional, self.rate);
        if commission.total < self.min_per_fill {
            commission.total = self.min_per_fill;
        }
        commission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_commission() {
        let model = CommissionModel::default();
        assert_eq!(model.rate, dec!(0.0001));
    }

    #[test]
    fn test_for_ticker() {
        assert_eq!(CommissionModel::for_ticker("BTC-USD").rate, dec!(0.001));
        assert_eq!(CommissionModel::for_ticker("eth-usd").rate, dec!(0.001));
        assert_eq!(CommissionModel::for_ticker("SPY").rate, dec!(0.0001));
    }

    #[test]
    fn test_commission_calculation() {
        let model = CommissionModel::new(dec!(0.001));
        assert_eq!(model.calculate(dec!(10_000)).total, dec!(10));
    }

    #[test]
    fn test_minimum_applies() {
        let model = CommissionModel {
            rate: dec!(0.001),
            min_per_fill: dec!(1),
        };
        assert_eq!(model.calculate(dec!(100)).total, dec!(1));
    }

    #[test]
    fn test_zero_commission() {
        assert_eq!(CommissionModel::zero().calculate(dec!(5_000)).total, dec!(0));
    }
}
