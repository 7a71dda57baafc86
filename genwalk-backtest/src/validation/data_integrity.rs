//! Data integrity validation for OHLCV bars.
//!
//! Validates:
//! - Non-empty input
//! - Date ordering (strictly increasing, no duplicates)
//! - Price validity (finite and positive)
//! - OHLC consistency (low <= high, open/close within [low, high])
//! - Volume validity (finite and non-negative)
//! - Date continuity (no calendar gaps longer than `max_gap_days`)

use serde::Serialize;

use crate::data::Bar;

/// Result of a single validation check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete integrity report for one price series.
#[derive(Debug, Clone, Serialize)]
pub struct DataIntegrityReport {
    pub ticker: String,
    pub bar_count: usize,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let total = self.checks.len();
        format!(
            "{} ({} bars): {}/{} checks passed",
            self.ticker, self.bar_count, passed, total
        )
    }
}

/// Validator for OHLCV data integrity.
#[derive(Debug, Clone)]
pub struct DataIntegrityValidator {
    /// Calendar gaps longer than this are reported.
    max_gap_days: i64,
    /// Offending rows listed in a failure's details.
    max_examples: usize,
}

impl Default for DataIntegrityValidator {
    fn default() -> Self {
        Self {
            max_gap_days: 7,
            max_examples: 5,
        }
    }
}

impl DataIntegrityValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_gap_days(mut self, days: i64) -> Self {
        self.max_gap_days = days;
        self
    }

    /// Run all checks on `bars` in the given order.
    pub fn validate(&self, ticker: &str, bars: &[Bar]) -> DataIntegrityReport {
        let mut checks = Vec::new();

        if bars.is_empty() {
            checks.push(CheckResult::fail("non_empty", "No bars", None));
            return DataIntegrityReport {
                ticker: ticker.to_string(),
                bar_count: 0,
                checks,
            };
        }
        checks.push(CheckResult::pass(
            "non_empty",
            &format!("{} bars", bars.len()),
        ));

        checks.push(self.check_date_order(bars));
        checks.push(self.check_prices(bars));
        checks.push(self.check_ohlc_consistency(bars));
        checks.push(self.check_volume(bars));
        checks.push(self.check_date_gaps(bars));

        DataIntegrityReport {
            ticker: ticker.to_string(),
            bar_count: bars.len(),
            checks,
        }
    }

    fn check_date_order(&self, bars: &[Bar]) -> CheckResult {
        let bad: Vec<String> = bars
            .windows(2)
            .filter(|w| w[1].date <= w[0].date)
            .map(|w| format!("{} after {}", w[1].date, w[0].date))
            .collect();

        if bad.is_empty() {
            CheckResult::pass("date_order", "Dates strictly increasing")
        } else {
            CheckResult::fail(
                "date_order",
                &format!("{} out-of-order or duplicate dates", bad.len()),
                Some(self.examples(&bad)),
            )
        }
    }

    fn check_prices(&self, bars: &[Bar]) -> CheckResult {
        let bad: Vec<String> = bars
            .iter()
            .filter(|b| {
                [b.open, b.high, b.low, b.close]
                    .iter()
                    .any(|p| !p.is_finite() || *p <= 0.0)
            })
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass("price_validity", "All prices finite and positive")
        } else {
            CheckResult::fail(
                "price_validity",
                &format!("{} bars with invalid prices", bad.len()),
                Some(self.examples(&bad)),
            )
        }
    }

    fn check_ohlc_consistency(&self, bars: &[Bar]) -> CheckResult {
        let bad: Vec<String> = bars
            .iter()
            .filter(|b| {
                b.low > b.high
                    || b.open < b.low
                    || b.open > b.high
                    || b.close < b.low
                    || b.close > b.high
            })
            .map(|b| {
                format!(
                    "{} (O {} H {} L {} C {})",
                    b.date, b.open, b.high, b.low, b.close
                )
            })
            .collect();

        if bad.is_empty() {
            CheckResult::pass("ohlc_consistency", "Open/close within [low, high]")
        } else {
            CheckResult::fail(
                "ohlc_consistency",
                &format!("{} inconsistent bars", bad.len()),
                Some(self.examples(&bad)),
            )
        }
    }

    fn check_volume(&self, bars: &[Bar]) -> CheckResult {
        let bad: Vec<String> = bars
            .iter()
            .filter(|b| !b.volume.is_finite() || b.volume < 0.0)
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass("volume_validity", "Volume non-negative")
        } else {
            CheckResult::fail(
                "volume_validity",
                &format!("{} bars with invalid volume", bad.len()),
                Some(self.examples(&bad)),
            )
        }
    }

    fn check_date_gaps(&self, bars: &[Bar]) -> CheckResult {
        let gaps: Vec<String> = bars
            .windows(2)
            .filter_map(|w| {
                let days = (w[1].date - w[0].date).num_days();
                (days > self.max_gap_days)
                    .then(|| format!("{} to {} ({} days)", w[0].date, w[1].date, days))
            })
            .collect();

        if gaps.is_empty() {
            CheckResult::pass(
                "date_continuity",
                &format!("No gaps longer than {} days", self.max_gap_days),
            )
        } else {
            CheckResult::fail(
                "date_continuity",
                &format!("{} major gaps found", gaps.len()),
                Some(self.examples(&gaps)),
            )
        }
    }

    fn examples(&self, items: &[String]) -> String {
        let shown: Vec<&str> = items
            .iter()
            .take(self.max_examples)
            .map(String::as_str)
            .collect();
        if items.len() > self.max_examples {
            format!("{}; ... {} more", shown.join("; "), items.len() - self.max_examples)
        } else {
            shown.join("; ")
        }
    }
}
