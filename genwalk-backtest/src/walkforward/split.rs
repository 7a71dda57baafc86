//! Single train/test split optimization.
//!
//! Evolves on the first `train_ratio` share of the bars and validates the
//! hall-of-fame candidate on the rest. The test slice is prefixed with
//! warm-up bars and entries are gated at the first test date.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backtest::{BacktestSummary, Backtester};
use crate::data::PriceSeries;
use crate::genetic::{
    Evaluation, EvolutionConfig, EvolutionEngine, FitnessConfig, FitnessEvaluator, GeneBounds,
    GenerationStats, StrategyParams,
};

use super::orchestrator::WalkForwardError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of bars used for training.
    pub train_ratio: f64,
    /// Warm-up bars before the first test bar; defaults to max lookback + 10.
    pub warmup_bars: Option<usize>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.70,
            warmup_bars: None,
        }
    }
}

/// Outcome of a split optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitReport {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub train_bars: usize,
    pub test_bars: usize,
    pub best_params: StrategyParams,
    pub in_sample: Evaluation,
    /// `None` when the validation backtest failed.
    pub out_of_sample: Option<BacktestSummary>,
    pub error: Option<String>,
    pub logbook: Vec<GenerationStats>,
    pub interrupted: bool,
}

impl SplitReport {
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Train {} -> {} ({} bars) | Test {} -> {} ({} bars)\n",
            self.train_start,
            self.train_end,
            self.train_bars,
            self.test_start,
            self.test_end,
            self.test_bars
        );
        out.push_str(&format!("Best params: {}\n", self.best_params.key()));
        out.push_str(&format!(
            "In-sample fitness: {:.2} ({:?})\n",
            self.in_sample.fitness.primary(),
            self.in_sample.outcome
        ));
        match (&self.out_of_sample, &self.error) {
            (Some(s), _) => out.push_str(&format!(
                "Out-of-sample: profit {:.2}% | max DD {:.2}% | trades {} | win {:.1}% | sharpe {:.2}\n",
                s.profit_pct, s.max_drawdown_pct, s.trade_count, s.win_rate, s.sharpe_ratio
            )),
            (None, Some(e)) => out.push_str(&format!("Out-of-sample backtest failed: {}\n", e)),
            (None, None) => {}
        }
        if self.interrupted {
            out.push_str("Optimization interrupted: results are partial\n");
        }
        out
    }
}

/// Split-mode optimizer.
pub struct SplitValidator<'a, B: Backtester + ?Sized> {
    backtester: &'a B,
    config: SplitConfig,
    evolution: EvolutionConfig,
    fitness: FitnessConfig,
    bounds: GeneBounds,
    stop_flag: Arc<AtomicBool>,
}

impl<'a, B: Backtester + ?Sized> SplitValidator<'a, B> {
    pub fn new(backtester: &'a B) -> Self {
        Self {
            backtester,
            config: SplitConfig::default(),
            evolution: EvolutionConfig::default(),
            fitness: FitnessConfig::default(),
            bounds: GeneBounds::default(),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(mut self, config: SplitConfig) -> Self {
        self.config = config;
        self
    }

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

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = flag;
        self
    }

    /// Optimize on the train share of `series`, validate on the rest.
    pub fn run(&self, series: &PriceSeries) -> Result<SplitReport, WalkForwardError> {
        let (train, test) = series.split_at_ratio(self.config.train_ratio);
        let (Some(train_start), Some(train_end), Some(test_start), Some(test_end)) = (
            train.first_date(),
            train.last_date(),
            test.first_date(),
            test.last_date(),
        ) else {
            return Err(WalkForwardError::NoData);
        };

        let warmup = self
            .config
            .warmup_bars
            .unwrap_or(self.bounds.max_lookback() + 10);
        let test_from = train.len().saturating_sub(warmup);
        let validation_bars = &series.bars()[test_from..];

        info!(
            "Split optimization: train {} bars ({} to {}), test {} bars ({} to {}), warm-up {}",
            train.len(),
            train_start,
            train_end,
            test.len(),
            test_start,
            test_end,
            train.len() - test_from
        );

        let mut rng = match self.evolution.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let evaluator = FitnessEvaluator::new(self.backtester, self.fitness.clone());
        let engine = EvolutionEngine::new(evaluator, self.evolution.clone(), self.bounds)
            .with_stop_flag(self.stop_flag.clone());
        let outcome = engine.run(train.bars(), &mut rng);

        let best = outcome
            .hall_of_fame
            .clone()
            .or_else(|| outcome.best().cloned())
            .ok_or(WalkForwardError::NoData)?;
        let in_sample = best.evaluation.clone().ok_or(WalkForwardError::NoData)?;

        let validation = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backtester
                .run(&best.params, validation_bars, Some(test_start))
        }));
        let (out_of_sample, error) = match validation {
            Ok(Ok(summary)) if summary.is_finite() => (Some(summary), None),
            Ok(Ok(_)) => (None, Some("non-finite backtest output".to_string())),
            Ok(Err(e)) => (None, Some(e.to_string())),
            Err(_) => (None, Some("backtest panicked".to_string())),
        };
        if let Some(e) = &error {
            warn!("Out-of-sample backtest failed: {}", e);
        }

        Ok(SplitReport {
            train_start,
            train_end,
            test_start,
            test_end,
            train_bars: train.len(),
            test_bars: test.len(),
            best_params: best.params,
            in_sample,
            out_of_sample,
            error,
            logbook: outcome.logbook,
            interrupted: outcome.interrupted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::BacktestError;
    use crate::data::Bar;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Records the activation date and first bar of each gated run.
    #[derive(Default)]
    struct RecordingBacktester {
        gated: Mutex<Vec<(NaiveDate, NaiveDate)>>,
    }

    impl Backtester for RecordingBacktester {
        fn run(
            &self,
            params: &StrategyParams,
            bars: &[Bar],
            activation_date: Option<NaiveDate>,
        ) -> Result<BacktestSummary, BacktestError> {
            if let (Some(activation), Some(first)) = (activation_date, bars.first()) {
                self.gated.lock().unwrap().push((activation, first.date));
            }
            Ok(BacktestSummary {
                profit_pct: params.take_profit * 100.0,
                max_drawdown_pct: 5.0,
                trade_count: 10,
                win_rate: 60.0,
                sharpe_ratio: 1.2,
                final_equity: Decimal::from(11_000),
            })
        }
    }

    #[test]
    fn test_split_validates_with_warmup_prefix() {
        let closes: Vec<f64> = (0..400).map(|i| 100.0 + i as f64 * 0.1).collect();
        let series = PriceSeries::from_closes(d(2020, 1, 1), &closes);
        let backtester = RecordingBacktester::default();
        let report = SplitValidator::new(&backtester)
            .with_config(SplitConfig {
                train_ratio: 0.75,
                warmup_bars: Some(20),
            })
            .with_evolution_config(EvolutionConfig {
                population_size: 6,
                generations: 2,
                seed: Some(3),
                ..EvolutionConfig::default()
            })
            .run(&series)
            .unwrap();

        assert_eq!(report.train_bars, 300);
        assert_eq!(report.test_bars, 100);
        assert_eq!(report.test_start, series.bars()[300].date);
        assert_eq!(report.logbook.len(), 3);
        assert!(report.out_of_sample.is_some());

        let gated = backtester.gated.lock().unwrap();
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].0, report.test_start);
        assert_eq!(gated[0].1, series.bars()[280].date);
    }

    #[test]
    fn test_split_without_test_bars_is_an_error() {
        let series = PriceSeries::from_closes(d(2020, 1, 1), &[1.0, 2.0]);
        let backtester = RecordingBacktester::default();
        let result = SplitValidator::new(&backtester)
            .with_config(SplitConfig {
                train_ratio: 1.0,
                warmup_bars: None,
            })
            .run(&series);
        assert!(matches!(result, Err(WalkForwardError::NoData)));
    }
}
