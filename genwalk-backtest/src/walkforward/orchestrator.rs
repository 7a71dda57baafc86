//! Walk-forward analysis with per-window genetic re-optimization.
//!
//! For every window the optimizer evolves parameters on the training slice,
//! picks the best candidate and validates it out of sample on the test
//! slice. The test slice is extended backwards by the warm-up buffer so
//! indicators are ready on the first test day; entries are only allowed
//! from `test_start` on.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::backtest::{BacktestSummary, Backtester};
use crate::data::{DataSource, LoaderError, PriceSeries};
use crate::genetic::{
    EvaluationOutcome, EvolutionConfig, EvolutionEngine, FitnessConfig, FitnessEvaluator,
    GeneBounds, StrategyParams,
};
use crate::metrics::SummaryStats;

use super::periods::{WalkForwardConfig, Window, WindowScheduler};

#[derive(Error, Debug)]
pub enum WalkForwardError {
    #[error("No price data available")]
    NoData,

    #[error("Data error: {0}")]
    Data(#[from] LoaderError),
}

/// Validation outcome of a processed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Completed,
    BacktestFailed,
}

/// Result of one processed walk-forward window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: Window,
    pub train_period: String,
    pub test_period: String,
    /// Best parameters found during training.
    pub best_params: StrategyParams,
    /// Fitness of the best parameters on the training slice.
    pub in_sample_fitness: f64,
    pub in_sample_outcome: EvaluationOutcome,
    /// Out-of-sample profit; 0.0 when validation failed.
    pub profit_pct: f64,
    pub max_drawdown_pct: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub status: WindowStatus,
    pub error: Option<String>,
    pub train_bars: usize,
    pub test_bars: usize,
    /// True when the optimization was cut short by the stop flag.
    pub interrupted: bool,
}

impl WindowResult {
    pub fn is_completed(&self) -> bool {
        self.status == WindowStatus::Completed
    }
}

/// A window skipped for lack of data or of optimization candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedWindow {
    pub window: Window,
    pub train_bars: usize,
    pub test_bars: usize,
    pub reason: String,
}

/// Statistics over all processed windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateReport {
    pub windows_completed: usize,
    pub windows_failed: usize,
    pub windows_skipped: usize,
    /// Out-of-sample profit statistics over completed windows.
    pub profit: SummaryStats,
    pub positive_windows: usize,
    pub negative_windows: usize,
    /// Share of completed windows with positive profit, in percent.
    pub winning_window_pct: f64,
    /// Sum of window profits.
    pub cumulative_profit_pct: f64,
    pub total_trades: usize,
    pub avg_max_drawdown_pct: f64,
    /// Most frequently selected parameters.
    pub consensus_params: Option<StrategyParams>,
}

/// Passive benchmark over the full data span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyHoldBenchmark {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_price: f64,
    pub final_price: f64,
    pub profit_pct: f64,
}

impl BuyHoldBenchmark {
    pub fn from_series(series: &PriceSeries) -> Option<Self> {
        let first = series.bars().first()?;
        let last = series.bars().last()?;
        if first.close == 0.0 {
            return None;
        }
        Some(Self {
            start_date: first.date,
            end_date: last.date,
            initial_price: first.close,
            final_price: last.close,
            profit_pct: (last.close - first.close) / first.close * 100.0,
        })
    }
}

/// Complete walk-forward analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub ticker: String,
    pub data_start: NaiveDate,
    pub data_end: NaiveDate,
    pub total_bars: usize,
    pub config: WalkForwardConfig,
    pub windows: Vec<WindowResult>,
    pub skipped: Vec<SkippedWindow>,
    pub aggregate: AggregateReport,
    pub benchmark: Option<BuyHoldBenchmark>,
    /// True when the stop flag ended the run early.
    pub interrupted: bool,
}

impl WalkForwardReport {
    /// Console table of windows followed by aggregate and benchmark lines.
    pub fn summary_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Walk-Forward Results: {} ({} to {}, {} bars)\n",
            self.ticker, self.data_start, self.data_end, self.total_bars
        ));
        out.push_str(&format!(
            "{:<6} | {:<26} | {:>10} | {:>8} | {:>6} | {:>7} | {}\n",
            "Window", "Test Period", "Profit %", "MaxDD %", "Trades", "Win %", "Status"
        ));
        out.push_str(&"-".repeat(86));
        out.push('\n');

        for r in &self.windows {
            let status = match r.status {
                WindowStatus::Completed => "ok",
                WindowStatus::BacktestFailed => "FAILED",
            };
            out.push_str(&format!(
                "{:<6} | {:<26} | {:>9.2}% | {:>7.2}% | {:>6} | {:>6.1}% | {}\n",
                r.window.index + 1,
                r.test_period,
                r.profit_pct,
                r.max_drawdown_pct,
                r.trade_count,
                r.win_rate,
                status
            ));
        }
        for s in &self.skipped {
            out.push_str(&format!(
                "{:<6} | {:<26} | skipped: {}\n",
                s.window.index + 1,
                s.window.test_label(),
                s.reason
            ));
        }
        out.push_str(&"-".repeat(86));
        out.push('\n');

        let agg = &self.aggregate;
        out.push_str(&format!(
            "Windows: {} completed, {} failed, {} skipped\n",
            agg.windows_completed, agg.windows_failed, agg.windows_skipped
        ));
        out.push_str(&format!(
            "Avg Profit per Window: {:.2}% (median {:.2}%, std {:.2}%, min {:.2}%, max {:.2}%)\n",
            agg.profit.mean, agg.profit.median, agg.profit.std_dev, agg.profit.min, agg.profit.max
        ));
        out.push_str(&format!("Cumulative Profit (sum): {:.2}%\n", agg.cumulative_profit_pct));
        out.push_str(&format!(
            "Winning Windows: {:.2}% ({} positive, {} negative)\n",
            agg.winning_window_pct, agg.positive_windows, agg.negative_windows
        ));
        out.push_str(&format!("Total Trades: {}\n", agg.total_trades));
        if let Some(params) = &agg.consensus_params {
            out.push_str(&format!("Consensus Params: {}\n", params.key()));
        }
        if let Some(bh) = &self.benchmark {
            out.push_str(&format!(
                "Buy & Hold: {:.2}% ({:.2} -> {:.2})\n",
                bh.profit_pct, bh.initial_price, bh.final_price
            ));
        }
        if self.interrupted {
            out.push_str("Run interrupted: results are partial\n");
        }
        out
    }
}

/// Per-window progress notification.
#[derive(Debug, Clone, Copy)]
pub struct WindowProgress {
    pub processed: usize,
    pub total: usize,
    pub window: Window,
}

type ProgressCallback<'a> = Box<dyn Fn(WindowProgress) + Send + Sync + 'a>;

/// Walk-forward analyzer with genetic optimization per window.
pub struct WalkForwardAnalyzer<'a, D: DataSource + ?Sized, B: Backtester + ?Sized> {
    data: &'a D,
    backtester: &'a B,
    ticker: String,
    config: WalkForwardConfig,
    evolution: EvolutionConfig,
    fitness: FitnessConfig,
    bounds: GeneBounds,
    stop_flag: Arc<AtomicBool>,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a, D: DataSource + ?Sized, B: Backtester + ?Sized> WalkForwardAnalyzer<'a, D, B> {
    /// Create an analyzer with default configuration.
    pub fn new(data: &'a D, backtester: &'a B) -> Self {
        Self {
            data,
            backtester,
            ticker: String::new(),
            config: WalkForwardConfig::default(),
            evolution: EvolutionConfig::default(),
            fitness: FitnessConfig::default(),
            bounds: GeneBounds::default(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = ticker.into();
        self
    }

    /// Set walk-forward configuration.
    pub fn with_config(mut self, config: WalkForwardConfig) -> Self {
        self.config = config;
        self
    }

    /// Set evolution operators; size is overridden per window.
    pub fn with_evolution_config(mut self, config: EvolutionConfig) -> Self {
        self.evolution = config;
        self
    }

    pub fn with_fitness_config(mut self, config: FitnessConfig) -> Self {
        self.fitness = config;
        self
    }

    pub fn with_bounds(mut self, bounds: GeneBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Share a stop flag; setting it ends the run after the current generation.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = flag;
        self
    }

    pub fn with_progress(mut self, callback: impl Fn(WindowProgress) + Send + Sync + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Warm-up bars prepended to each test slice.
    pub fn warmup_buffer(&self) -> usize {
        self.config.warmup_buffer(self.bounds.max_lookback())
    }

    /// Run the analysis over the full dataset.
    pub fn run(&self) -> Result<WalkForwardReport, WalkForwardError> {
        let full = self.data.get_full_data()?;
        let (Some(data_start), Some(data_end)) = (full.first_date(), full.last_date()) else {
            return Err(WalkForwardError::NoData);
        };

        let calendar = full.dates();
        let warmup_buffer = self.warmup_buffer();
        let scheduler = WindowScheduler::from_config(&calendar, &self.config, warmup_buffer);
        let total = scheduler.windows().count();

        info!(
            "Walk-forward on {} bars ({} to {}): {} windows, train {}m / test {}m / step {}m, warm-up {} bars",
            full.len(),
            data_start,
            data_end,
            total,
            self.config.train_months,
            self.config.test_months,
            self.config.step_months,
            warmup_buffer
        );

        let mut windows = Vec::new();
        let mut skipped = Vec::new();
        let mut interrupted = false;

        for (processed, window) in scheduler.windows().enumerate() {
            if self.stop_flag.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }

            let train = self.data.get_data_slice(window.train_start, window.train_end)?;
            let test = self.data.get_data_slice(window.warmup_start, window.test_end)?;

            let processed_window = match self.insufficient_data(&window, &train, &test) {
                Some(reason) => Err(reason),
                None => self.process_window(&window, &train, &test, total),
            };
            match processed_window {
                Ok(result) => {
                    let stop = result.interrupted;
                    windows.push(result);
                    if stop {
                        interrupted = true;
                        break;
                    }
                }
                Err(reason) => {
                    warn!(
                        "Window {}/{} skipped: {} ({} train bars, {} test bars)",
                        window.index + 1,
                        total,
                        reason,
                        train.len(),
                        test.len()
                    );
                    skipped.push(SkippedWindow {
                        window,
                        train_bars: train.len(),
                        test_bars: test.len(),
                        reason,
                    });
                }
            }

            if let Some(callback) = &self.progress {
                callback(WindowProgress {
                    processed: processed + 1,
                    total,
                    window,
                });
            }
        }

        let aggregate = aggregate_windows(&windows, skipped.len());
        let benchmark = BuyHoldBenchmark::from_series(&full);

        info!(
            "Walk-forward complete: {} completed, {} failed, {} skipped, avg profit {:.2}%",
            aggregate.windows_completed,
            aggregate.windows_failed,
            aggregate.windows_skipped,
            aggregate.profit.mean
        );

        Ok(WalkForwardReport {
            ticker: self.ticker.clone(),
            data_start,
            data_end,
            total_bars: full.len(),
            config: self.config.clone(),
            windows,
            skipped,
            aggregate,
            benchmark,
            interrupted,
        })
    }

    /// Why a window cannot be processed, if it cannot.
    fn insufficient_data(
        &self,
        window: &Window,
        train: &PriceSeries,
        test: &PriceSeries,
    ) -> Option<String> {
        let min = self.config.min_bars;
        if train.len() < min {
            return Some(format!("fewer than {} training bars", min));
        }
        if test.len() < min {
            return Some(format!("fewer than {} test bars including warm-up", min));
        }
        let in_period = test
            .bars()
            .iter()
            .filter(|b| b.date >= window.test_start)
            .count();
        if in_period < self.config.min_test_bars {
            return Some(format!(
                "{} bars in the test period, minimum {}",
                in_period, self.config.min_test_bars
            ));
        }
        None
    }

    /// Optimize on the train slice and validate on the test slice.
    ///
    /// Returns the skip reason when the optimization yields no evaluated candidate.
    fn process_window(
        &self,
        window: &Window,
        train: &PriceSeries,
        test: &PriceSeries,
        total: usize,
    ) -> Result<WindowResult, String> {
        info!(
            "Window {}/{}: train {} ({} bars), test {} ({} bars incl. warm-up)",
            window.index + 1,
            total,
            window.train_label(),
            train.len(),
            window.test_label(),
            test.len()
        );

        let mut rng = self.window_rng(window.index);
        let evaluator = FitnessEvaluator::new(self.backtester, self.fitness.clone());
        let engine = EvolutionEngine::new(
            evaluator,
            self.evolution
                .with_size(self.config.window_population, self.config.window_generations),
            self.bounds,
        )
        .with_stop_flag(self.stop_flag.clone());

        let outcome = engine.run(train.bars(), &mut rng);
        let Some((best, evaluation)) = outcome
            .best()
            .and_then(|best| best.evaluation.as_ref().map(|evaluation| (best, evaluation)))
        else {
            return Err("optimization produced no evaluated candidates".to_string());
        };

        let validation = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backtester
                .run(&best.params, test.bars(), Some(window.test_start))
        }));
        let validation = match validation {
            Ok(Ok(summary)) if summary.is_finite() => Ok(summary),
            Ok(Ok(_)) => Err("non-finite backtest output".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("backtest panicked".to_string()),
        };

        let mut result = WindowResult {
            window: *window,
            train_period: window.train_label(),
            test_period: window.test_label(),
            best_params: best.params,
            in_sample_fitness: evaluation.fitness.primary(),
            in_sample_outcome: evaluation.outcome,
            profit_pct: 0.0,
            max_drawdown_pct: 0.0,
            trade_count: 0,
            win_rate: 0.0,
            sharpe_ratio: 0.0,
            status: WindowStatus::Completed,
            error: None,
            train_bars: train.len(),
            test_bars: test.len(),
            interrupted: outcome.interrupted,
        };

        match validation {
            Ok(summary) => {
                apply_summary(&mut result, &summary);
                info!(
                    "Window {}/{}: {} -> profit {:.2}% | trades {} | win {:.1}%",
                    window.index + 1,
                    total,
                    best.params.key(),
                    result.profit_pct,
                    result.trade_count,
                    result.win_rate
                );
            }
            Err(error) => {
                warn!("Window {}/{} validation failed: {}", window.index + 1, total, error);
                result.status = WindowStatus::BacktestFailed;
                result.error = Some(error);
            }
        }

        Ok(result)
    }

    fn window_rng(&self, index: usize) -> StdRng {
        match self.evolution.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        }
    }
}

fn apply_summary(result: &mut WindowResult, summary: &BacktestSummary) {
    result.profit_pct = summary.profit_pct;
    result.max_drawdown_pct = summary.max_drawdown_pct;
    result.trade_count = summary.trade_count;
    result.win_rate = summary.win_rate;
    result.sharpe_ratio = summary.sharpe_ratio;
}

/// Aggregate processed windows; failed windows count but carry no profit.
pub fn aggregate_windows(windows: &[WindowResult], skipped: usize) -> AggregateReport {
    let completed: Vec<&WindowResult> = windows.iter().filter(|w| w.is_completed()).collect();
    let profits: Vec<f64> = completed.iter().map(|w| w.profit_pct).collect();
    let positive_windows = profits.iter().filter(|&&p| p > 0.0).count();
    let negative_windows = profits.iter().filter(|&&p| p < 0.0).count();

    let winning_window_pct = if completed.is_empty() {
        0.0
    } else {
        positive_windows as f64 / completed.len() as f64 * 100.0
    };

    let avg_max_drawdown_pct = SummaryStats::from_values(
        &completed.iter().map(|w| w.max_drawdown_pct).collect::<Vec<_>>(),
    )
    .mean;

    AggregateReport {
        windows_completed: completed.len(),
        windows_failed: windows.len() - completed.len(),
        windows_skipped: skipped,
        profit: SummaryStats::from_values(&profits),
        positive_windows,
        negative_windows,
        winning_window_pct,
        cumulative_profit_pct: profits.iter().sum(),
        total_trades: completed.iter().map(|w| w.trade_count).sum(),
        avg_max_drawdown_pct,
        consensus_params: find_consensus_params(&completed),
    }
}

/// Most common best parameters; ties go to the earliest window.
pub fn find_consensus_params(results: &[&WindowResult]) -> Option<StrategyParams> {
    let mut counts: BTreeMap<String, (usize, usize, StrategyParams)> = BTreeMap::new();
    for (order, result) in results.iter().enumerate() {
        let entry = counts
            .entry(result.best_params.key())
            .or_insert((0, order, result.best_params));
        entry.0 += 1;
    }

    counts
        .into_values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, params)| params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::BacktestError;
    use crate::data::Bar;
    use rust_decimal::Decimal;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Returns a profit derived from the activation month so windows differ.
    struct CountingBacktester;

    impl Backtester for CountingBacktester {
        fn run(
            &self,
            params: &StrategyParams,
            bars: &[Bar],
            activation_date: Option<NaiveDate>,
        ) -> Result<BacktestSummary, BacktestError> {
            if let (Some(activation), Some(first)) = (activation_date, bars.first()) {
                assert!(first.date <= activation);
            }
            Ok(BacktestSummary {
                profit_pct: params.take_profit * 100.0 - 5.0,
                max_drawdown_pct: params.stop_loss * 100.0,
                trade_count: 6,
                win_rate: 50.0,
                sharpe_ratio: 1.0,
                final_equity: Decimal::from(10_000),
            })
        }
    }

    fn window_result(index: usize, profit: f64, status: WindowStatus, params: StrategyParams) -> WindowResult {
        let window = Window {
            index,
            train_start: d(2020, 1, 1),
            train_end: d(2021, 1, 1),
            test_start: d(2021, 1, 1),
            test_end: d(2021, 4, 1),
            warmup_start: d(2020, 10, 1),
        };
        WindowResult {
            window,
            train_period: window.train_label(),
            test_period: window.test_label(),
            best_params: params,
            in_sample_fitness: 1.0,
            in_sample_outcome: EvaluationOutcome::Scored,
            profit_pct: profit,
            max_drawdown_pct: 4.0,
            trade_count: 3,
            win_rate: 50.0,
            sharpe_ratio: 0.0,
            status,
            error: None,
            train_bars: 366,
            test_bars: 90,
            interrupted: false,
        }
    }

    #[test]
    fn test_buy_hold_benchmark() {
        let series = PriceSeries::from_closes(d(2020, 1, 1), &[100.0, 90.0, 150.0]);
        let bh = BuyHoldBenchmark::from_series(&series).unwrap();
        assert_eq!(bh.profit_pct, 50.0);
        assert!(BuyHoldBenchmark::from_series(&PriceSeries::default()).is_none());
    }

    #[test]
    fn test_aggregate_excludes_failed_windows() {
        let params = StrategyParams::default();
        let windows = vec![
            window_result(0, 10.0, WindowStatus::Completed, params),
            window_result(1, -4.0, WindowStatus::Completed, params),
            window_result(2, 0.0, WindowStatus::BacktestFailed, params),
        ];
        let agg = aggregate_windows(&windows, 2);

        assert_eq!(agg.windows_completed, 2);
        assert_eq!(agg.windows_failed, 1);
        assert_eq!(agg.windows_skipped, 2);
        assert_eq!(agg.profit.count, 2);
        assert_eq!(agg.profit.mean, 3.0);
        assert_eq!(agg.cumulative_profit_pct, 6.0);
        assert_eq!(agg.positive_windows, 1);
        assert_eq!(agg.negative_windows, 1);
        assert_eq!(agg.winning_window_pct, 50.0);
        assert_eq!(agg.total_trades, 6);
    }

    #[test]
    fn test_consensus_prefers_most_common_then_earliest() {
        let a = StrategyParams::default();
        let b = StrategyParams {
            sma_fast: 10,
            ..StrategyParams::default()
        };
        let windows = [
            window_result(0, 1.0, WindowStatus::Completed, b),
            window_result(1, 1.0, WindowStatus::Completed, a),
            window_result(2, 1.0, WindowStatus::Completed, a),
        ];
        let refs: Vec<&WindowResult> = windows.iter().collect();
        assert_eq!(find_consensus_params(&refs), Some(a));

        let tied: Vec<&WindowResult> = windows[..2].iter().collect();
        assert_eq!(find_consensus_params(&tied), Some(b));
        assert_eq!(find_consensus_params(&[]), None);
    }

    #[test]
    fn test_empty_data_is_fatal() {
        let empty = PriceSeries::default();
        let analyzer = WalkForwardAnalyzer::new(&empty, &CountingBacktester);
        assert!(matches!(analyzer.run(), Err(WalkForwardError::NoData)));
    }

    #[test]
    fn test_run_with_stub_backtester() {
        let closes: Vec<f64> = (0..1096).map(|i| 100.0 + (i as f64 * 0.05).sin()).collect();
        let series = PriceSeries::from_closes(d(2020, 1, 1), &closes);
        let evolution = EvolutionConfig {
            seed: Some(7),
            ..EvolutionConfig::default()
        };
        let config = WalkForwardConfig {
            window_population: 8,
            window_generations: 2,
            ..WalkForwardConfig::default()
        };

        let report = WalkForwardAnalyzer::new(&series, &CountingBacktester)
            .with_ticker("TEST")
            .with_config(config)
            .with_evolution_config(evolution)
            .run()
            .unwrap();

        assert_eq!(report.windows.len(), 7);
        assert!(report.skipped.is_empty());
        assert!(!report.interrupted);
        assert!(report.windows.iter().all(|w| w.is_completed()));
        assert!(report.benchmark.is_some());
        assert!(report.summary_table().contains("Buy & Hold"));
        for pair in report.windows.windows(2) {
            assert!(pair[0].window.test_start < pair[1].window.test_start);
        }
    }

    #[test]
    fn test_empty_population_records_skipped_windows() {
        let closes: Vec<f64> = (0..1096).map(|i| 100.0 + (i as f64 * 0.05).sin()).collect();
        let series = PriceSeries::from_closes(d(2020, 1, 1), &closes);
        let config = WalkForwardConfig {
            window_population: 0,
            window_generations: 1,
            ..WalkForwardConfig::default()
        };

        let report = WalkForwardAnalyzer::new(&series, &CountingBacktester)
            .with_config(config)
            .run()
            .unwrap();

        assert!(report.windows.is_empty());
        assert_eq!(report.skipped.len(), 7);
        assert_eq!(report.aggregate.windows_skipped, 7);
        assert!(report.skipped[0].reason.contains("no evaluated candidates"));
        assert_eq!(report.skipped[6].window.index, 6);
    }

    #[test]
    fn test_stop_flag_returns_partial_report() {
        let closes = vec![100.0; 1096];
        let series = PriceSeries::from_closes(d(2020, 1, 1), &closes);
        let flag = Arc::new(AtomicBool::new(true));
        let report = WalkForwardAnalyzer::new(&series, &CountingBacktester)
            .with_stop_flag(flag)
            .run()
            .unwrap();
        assert!(report.interrupted);
        assert!(report.windows.is_empty());
    }
}
