//! Property-based tests using proptest.
//!
//! These tests verify invariants of the codec, scheduler, fitness and
//! evolution components.

use chrono::{Duration, Months, NaiveDate};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;

use genwalk_backtest::backtest::indicators::{rsi, sma};
use genwalk_backtest::backtest::{BacktestEngine, BacktestError, BacktestSummary, Backtester};
use genwalk_backtest::data::{Bar, PriceSeries};
use genwalk_backtest::genetic::{
    EvaluationOutcome, EvolutionConfig, EvolutionEngine, FitnessConfig, FitnessEvaluator,
    GeneBounds, StrategyParams, INVALID_PARAMS_FITNESS,
};
use genwalk_backtest::walkforward::WindowScheduler;

/// Cheap deterministic backtester: profit follows the parameters.
struct LinearBacktester;

impl Backtester for LinearBacktester {
    fn run(
        &self,
        params: &StrategyParams,
        _bars: &[Bar],
        _activation_date: Option<NaiveDate>,
    ) -> Result<BacktestSummary, BacktestError> {
        Ok(BacktestSummary {
            profit_pct: params.take_profit * 100.0 - params.stop_loss * 50.0,
            max_drawdown_pct: params.stop_loss * 100.0,
            trade_count: 10,
            win_rate: 50.0,
            sharpe_ratio: 0.5,
            final_equity: Decimal::from(10_000),
        })
    }
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
}

fn params_strategy() -> impl Strategy<Value = StrategyParams> {
    (
        1u32..300,
        1u32..300,
        1u32..60,
        50u32..100,
        0u32..50,
        0.0f64..0.5,
        0.0f64..0.5,
    )
        .prop_map(|(f, s, p, up, lo, sl, tp)| StrategyParams {
            sma_fast: f,
            sma_slow: s,
            rsi_period: p,
            rsi_upper: up,
            rsi_lower: lo,
            stop_loss: sl,
            take_profit: tp,
        })
}

proptest! {
    #[test]
    fn prop_codec_round_trip(params in params_strategy()) {
        let decoded = StrategyParams::decode(&params.encode()).unwrap();
        prop_assert_eq!(decoded, params);

        let named = StrategyParams::from_named(&params.to_named()).unwrap();
        prop_assert_eq!(named, params);
    }

    #[test]
    fn prop_decode_rejects_wrong_length(len in 0usize..20) {
        prop_assume!(len != 7);
        let genes = vec![10.0; len];
        prop_assert!(StrategyParams::decode(&genes).is_err());
    }

    #[test]
    fn prop_sampled_params_within_bounds(seed in any::<u64>()) {
        let bounds = GeneBounds::default();
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..20 {
            let params = bounds.sample(&mut rng);
            prop_assert!(bounds.contains(&params));
        }
    }

    #[test]
    fn prop_fast_not_below_slow_is_invalid(slow in 1u32..200, extra in 0u32..50) {
        let params = StrategyParams {
            sma_fast: slow + extra,
            sma_slow: slow,
            ..StrategyParams::default()
        };
        let engine = BacktestEngine::new(Default::default());
        let evaluator = FitnessEvaluator::new(&engine, FitnessConfig::default());
        let bars = PriceSeries::from_closes(base_date(), &[100.0; 10]);
        let evaluation = evaluator.evaluate(&params, bars.bars());

        prop_assert_eq!(evaluation.outcome, EvaluationOutcome::InvalidParams);
        prop_assert_eq!(evaluation.fitness.primary(), INVALID_PARAMS_FITNESS);
    }

    #[test]
    fn prop_scheduler_windows_fit_the_data(
        start_offset in 0i64..366,
        days in 30i64..2000,
        train in 1u32..24,
        test in 1u32..12,
        step in 1u32..12,
        warmup in 0usize..400,
    ) {
        // offsets cover start days 29, 30 and 31
        let start = base_date() + Duration::days(start_offset);
        let calendar: Vec<NaiveDate> = (0..=days).map(|i| start + Duration::days(i)).collect();
        let data_end = *calendar.last().unwrap();
        let scheduler = WindowScheduler::new(&calendar, train, test, step, warmup);

        let window_dates = |k: u32| {
            let train_start = start.checked_add_months(Months::new(k * step)).unwrap();
            let train_end = train_start.checked_add_months(Months::new(train)).unwrap();
            let test_end = train_end.checked_add_months(Months::new(test)).unwrap();
            (train_start, train_end, test_end)
        };

        let windows: Vec<_> = scheduler.windows().collect();
        for (k, w) in windows.iter().enumerate() {
            let (train_start, train_end, test_end) = window_dates(k as u32);
            prop_assert_eq!(w.index, k);
            prop_assert_eq!(w.train_start, train_start);
            prop_assert_eq!(w.train_end, train_end);
            prop_assert_eq!(w.test_start, train_end);
            prop_assert_eq!(w.test_end, test_end);
            prop_assert!(w.test_end <= data_end);
            prop_assert!(w.warmup_start >= start);
            prop_assert!(w.warmup_start <= w.test_start);
        }

        // the first window left out overruns the data
        let (_, _, next_test_end) = window_dates(windows.len() as u32);
        prop_assert!(next_test_end > data_end);
    }

    #[test]
    fn prop_indicators_align_with_input(
        closes in prop::collection::vec(1.0f64..1000.0, 0..120),
        period in 1usize..40,
    ) {
        let sma_out = sma(&closes, period);
        let rsi_out = rsi(&closes, period);
        prop_assert_eq!(sma_out.len(), closes.len());
        prop_assert_eq!(rsi_out.len(), closes.len());
        for value in rsi_out.iter().filter(|v| !v.is_nan()) {
            prop_assert!((0.0..=100.0).contains(value));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_evolution_preserves_population(
        seed in any::<u64>(),
        size in 2usize..16,
        generations in 0usize..4,
    ) {
        let bounds = GeneBounds::default();
        let evaluator = FitnessEvaluator::new(&LinearBacktester, FitnessConfig::default());
        let config = EvolutionConfig {
            population_size: size,
            generations,
            ..EvolutionConfig::default()
        };
        let engine = EvolutionEngine::new(evaluator, config, bounds);
        let bars = PriceSeries::from_closes(base_date(), &[100.0; 5]);
        let mut rng = StdRng::seed_from_u64(seed);

        let outcome = engine.run(bars.bars(), &mut rng);
        prop_assert_eq!(outcome.population.len(), size);
        prop_assert_eq!(outcome.logbook.len(), generations + 1);
        prop_assert!(outcome.hall_of_fame.is_some());
        for candidate in &outcome.population {
            prop_assert!(candidate.evaluation.is_some());
            prop_assert!(bounds.contains(&candidate.params));
        }
    }
}
