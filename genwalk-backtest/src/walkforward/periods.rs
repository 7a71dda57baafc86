//! Walk-forward window generation.
//!
//! Windows are anchored on the first bar of the data: window `k` trains on
//! `[start + k·step, start + k·step + train)` and tests on the following
//! `test` months. All ranges are half-open. Month arithmetic clamps to the
//! end of the month.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// A single walk-forward window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Window number (0-indexed).
    pub index: usize,
    /// Training start date (inclusive).
    pub train_start: NaiveDate,
    /// Training end date (exclusive).
    pub train_end: NaiveDate,
    /// Test start date (inclusive); trading activates here.
    pub test_start: NaiveDate,
    /// Test end date (exclusive).
    pub test_end: NaiveDate,
    /// First bar fed to the validation backtest so indicators are warm at `test_start`.
    pub warmup_start: NaiveDate,
}

impl Window {
    /// Get training period length in days.
    pub fn train_days(&self) -> i64 {
        (self.train_end - self.train_start).num_days()
    }

    /// Get test period length in days.
    pub fn test_days(&self) -> i64 {
        (self.test_end - self.test_start).num_days()
    }

    pub fn train_label(&self) -> String {
        format!("{} -> {}", self.train_start, self.train_end)
    }

    pub fn test_label(&self) -> String {
        format!("{} -> {}", self.test_start, self.test_end)
    }
}

/// Configuration for walk-forward analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Training period length in months.
    pub train_months: u32,
    /// Test period length in months.
    pub test_months: u32,
    /// Roll forward by this many months.
    pub step_months: u32,
    /// Indicator lookback in bars; defaults to the largest SMA_S / RSI_P bound.
    pub lookback: Option<usize>,
    /// Extra warm-up bars on top of the lookback.
    pub warmup_margin: usize,
    /// Minimum bars in a train or test slice.
    pub min_bars: usize,
    /// Minimum bars on or after `test_start` in the test slice.
    pub min_test_bars: usize,
    /// Population size of the per-window optimization.
    pub window_population: usize,
    /// Generations of the per-window optimization.
    pub window_generations: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_months: 12,
            test_months: 3,
            step_months: 3,
            lookback: None,
            warmup_margin: 10,
            min_bars: 50,
            min_test_bars: 10,
            window_population: 30,
            window_generations: 5,
        }
    }
}

impl WalkForwardConfig {
    /// Warm-up bars prepended to each test slice.
    pub fn warmup_buffer(&self, default_lookback: usize) -> usize {
        self.lookback.unwrap_or(default_lookback) + self.warmup_margin
    }
}

/// Lazily generates windows over a trading calendar.
pub struct WindowScheduler<'a> {
    calendar: &'a [NaiveDate],
    train_months: u32,
    test_months: u32,
    step_months: u32,
    warmup_buffer: usize,
}

impl<'a> WindowScheduler<'a> {
    /// `calendar` must be sorted ascending.
    pub fn new(
        calendar: &'a [NaiveDate],
        train_months: u32,
        test_months: u32,
        step_months: u32,
        warmup_buffer: usize,
    ) -> Self {
        Self {
            calendar,
            train_months,
            test_months,
            step_months,
            warmup_buffer,
        }
    }

    /// Scheduler for a walk-forward configuration.
    pub fn from_config(calendar: &'a [NaiveDate], config: &WalkForwardConfig, warmup_buffer: usize) -> Self {
        Self::new(
            calendar,
            config.train_months,
            config.test_months,
            config.step_months,
            warmup_buffer,
        )
    }

    /// Windows in chronological order; stops at the first window whose test
    /// period would run past the last bar.
    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        (0usize..).map_while(move |k| self.window(k))
    }

    fn window(&self, k: usize) -> Option<Window> {
        let data_start = *self.calendar.first()?;
        let data_end = *self.calendar.last()?;
        if self.step_months == 0 {
            return None;
        }

        let offset = u32::try_from(k).ok()?.checked_mul(self.step_months)?;
        let train_start = data_start.checked_add_months(Months::new(offset))?;
        let train_end = train_start.checked_add_months(Months::new(self.train_months))?;
        let test_start = train_end;
        let test_end = test_start.checked_add_months(Months::new(self.test_months))?;
        if test_end > data_end {
            return None;
        }

        Some(Window {
            index: k,
            train_start,
            train_end,
            test_start,
            test_end,
            warmup_start: self.warmup_start(test_start),
        })
    }

    /// The bar `warmup_buffer` bars before the first bar on or after
    /// `test_start`, never before the first bar.
    fn warmup_start(&self, test_start: NaiveDate) -> NaiveDate {
        let first_test_bar = self.calendar.partition_point(|d| *d < test_start);
        let idx = first_test_bar
            .saturating_sub(self.warmup_buffer)
            .min(self.calendar.len().saturating_sub(1));
        self.calendar[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start.iter_days().take_while(|day| *day <= end).collect()
    }

    #[test]
    fn test_default_config() {
        let config = WalkForwardConfig::default();
        assert_eq!(config.train_months, 12);
        assert_eq!(config.test_months, 3);
        assert_eq!(config.step_months, 3);
        assert_eq!(config.warmup_buffer(200), 210);
    }

    #[test]
    fn test_three_years_yield_seven_windows() {
        let calendar = daily(d(2020, 1, 1), d(2022, 12, 31));
        let windows: Vec<_> = WindowScheduler::new(&calendar, 12, 3, 3, 70).windows().collect();

        assert_eq!(windows.len(), 7);

        let first = &windows[0];
        assert_eq!(first.train_start, d(2020, 1, 1));
        assert_eq!(first.train_end, d(2021, 1, 1));
        assert_eq!(first.test_start, d(2021, 1, 1));
        assert_eq!(first.test_end, d(2021, 4, 1));

        let last = &windows[6];
        assert_eq!(last.train_start, d(2021, 7, 1));
        assert_eq!(last.test_end, d(2022, 10, 1));
    }

    #[test]
    fn test_warmup_counts_bars_and_clamps() {
        let calendar = daily(d(2020, 1, 1), d(2022, 12, 31));
        let windows: Vec<_> = WindowScheduler::new(&calendar, 12, 3, 3, 70).windows().collect();
        assert_eq!(windows[0].warmup_start, d(2020, 10, 23));

        let huge: Vec<_> = WindowScheduler::new(&calendar, 12, 3, 3, 10_000).windows().collect();
        assert!(huge.iter().all(|w| w.warmup_start == d(2020, 1, 1)));
    }

    #[test]
    fn test_month_end_clamps() {
        let calendar = daily(d(2020, 1, 31), d(2020, 12, 31));
        let first = WindowScheduler::new(&calendar, 1, 1, 1, 0)
            .windows()
            .next()
            .unwrap();
        assert_eq!(first.train_end, d(2020, 2, 29));
        assert_eq!(first.test_end, d(2020, 3, 29));
    }

    #[test]
    fn test_windows_anchor_on_first_bar_not_previous_window() {
        let calendar = daily(d(2020, 1, 31), d(2021, 12, 31));
        let windows: Vec<_> = WindowScheduler::new(&calendar, 3, 1, 1, 0).windows().collect();

        assert_eq!(windows[1].train_start, d(2020, 2, 29));
        assert_eq!(windows[2].train_start, d(2020, 3, 31));
        assert_eq!(windows[2].train_end, d(2020, 6, 30));
        assert_eq!(windows[2].test_end, d(2020, 7, 30));
    }

    #[test]
    fn test_too_short_and_empty() {
        let calendar = daily(d(2020, 1, 1), d(2020, 6, 30));
        assert_eq!(WindowScheduler::new(&calendar, 12, 3, 3, 10).windows().count(), 0);
        assert_eq!(WindowScheduler::new(&[], 12, 3, 3, 10).windows().count(), 0);
        assert_eq!(WindowScheduler::new(&calendar, 1, 1, 0, 10).windows().count(), 0);
    }

    #[test]
    fn test_window_days_and_labels() {
        let window = Window {
            index: 0,
            train_start: d(2020, 1, 1),
            train_end: d(2021, 1, 1),
            test_start: d(2021, 1, 1),
            test_end: d(2021, 4, 1),
            warmup_start: d(2020, 10, 23),
        };
        assert_eq!(window.train_days(), 366);
        assert_eq!(window.test_days(), 90);
        assert_eq!(window.test_label(), "2021-01-01 -> 2021-04-01");
    }
}
