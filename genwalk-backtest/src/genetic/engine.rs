//! Generational evolution loop.
//!
//! Init → {Evaluate → Select → Crossover → Mutate} × G. The population is
//! replaced wholesale each generation; only candidates whose parameters
//! changed are re-evaluated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backtest::Backtester;
use crate::data::Bar;
use crate::metrics::SummaryStats;

use super::codec::{GeneBounds, StrategyParams, GENE_COUNT};
use super::fitness::{Evaluation, FitnessEvaluator, Objective};
use super::nsga::{rank_population, Ranking};

/// Evolution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Candidates per generation.
    pub population_size: usize,
    /// Generations after the initial evaluation.
    pub generations: usize,
    /// Probability that a pair is crossed over.
    pub crossover_prob: f64,
    /// Probability that a candidate is mutated.
    pub mutation_prob: f64,
    /// Per-gene mutation probability inside a mutated candidate.
    pub gene_mutation_prob: f64,
    /// Maximum integer gene shift.
    pub int_step: u32,
    /// Standard deviation of float gene perturbation.
    pub float_sigma: f64,
    /// Tournament size.
    pub tournament_size: usize,
    /// RNG seed; unset draws from entropy.
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 10,
            crossover_prob: 0.7,
            mutation_prob: 0.2,
            gene_mutation_prob: 0.2,
            int_step: 5,
            float_sigma: 0.02,
            tournament_size: 3,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Copy with a different population size and generation count.
    pub fn with_size(&self, population_size: usize, generations: usize) -> Self {
        Self {
            population_size,
            generations,
            ..self.clone()
        }
    }
}

/// One member of the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub params: StrategyParams,
    pub evaluation: Option<Evaluation>,
}

impl Candidate {
    pub fn new(params: StrategyParams) -> Self {
        Self {
            params,
            evaluation: None,
        }
    }

    /// Primary fitness, `None` until evaluated.
    pub fn primary_fitness(&self) -> Option<f64> {
        self.evaluation.as_ref().map(|e| e.fitness.primary())
    }

    /// Replace the parameters and invalidate the fitness.
    fn set_params(&mut self, params: StrategyParams) {
        self.params = params;
        self.evaluation = None;
    }

    /// Higher primary fitness, then lower drawdown.
    fn beats(&self, other: &Candidate) -> bool {
        match (&self.evaluation, &other.evaluation) {
            (Some(a), Some(b)) => {
                let (fa, fb) = (a.fitness.primary(), b.fitness.primary());
                fa > fb || (fa == fb && a.drawdown() < b.drawdown())
            }
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Best evaluated candidate: highest primary fitness, ties broken by lower
/// drawdown, then by position.
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.evaluation.is_some())
        .fold(None, |best: Option<&Candidate>, c| match best {
            Some(b) if !c.beats(b) => Some(b),
            _ => Some(c),
        })
}

/// Fitness statistics for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    /// Candidates evaluated in this generation.
    pub evaluations: usize,
    pub avg: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl GenerationStats {
    /// Statistics over finite primary fitness values only.
    pub fn from_population(generation: usize, evaluations: usize, population: &[Candidate]) -> Self {
        let values: Vec<f64> = population.iter().filter_map(|c| c.primary_fitness()).collect();
        let stats = SummaryStats::from_values(&values);
        Self {
            generation,
            evaluations,
            avg: stats.mean,
            std: stats.std_dev,
            min: stats.min,
            max: stats.max,
        }
    }
}

/// Result of an evolution run.
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    /// Final population.
    pub population: Vec<Candidate>,
    /// One entry per generation, starting with the initial population.
    pub logbook: Vec<GenerationStats>,
    /// Best candidate seen in any generation.
    pub hall_of_fame: Option<Candidate>,
    /// True when the stop flag ended the run early.
    pub interrupted: bool,
}

impl EvolutionOutcome {
    /// Best candidate of the final population.
    pub fn best(&self) -> Option<&Candidate> {
        select_best(&self.population)
    }
}

/// Genetic optimizer over strategy parameters.
pub struct EvolutionEngine<'a, B: Backtester + ?Sized> {
    evaluator: FitnessEvaluator<'a, B>,
    config: EvolutionConfig,
    bounds: GeneBounds,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl<'a, B: Backtester + ?Sized> EvolutionEngine<'a, B> {
    pub fn new(evaluator: FitnessEvaluator<'a, B>, config: EvolutionConfig, bounds: GeneBounds) -> Self {
        Self {
            evaluator,
            config,
            bounds,
            stop_flag: None,
        }
    }

    /// Stop cleanly between generations once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    fn should_stop(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Evolve a population on `bars`.
    pub fn run(&self, bars: &[Bar], rng: &mut StdRng) -> EvolutionOutcome {
        let size = self.config.population_size;
        let mut population: Vec<Candidate> = (0..size)
            .map(|_| Candidate::new(self.bounds.sample(rng)))
            .collect();

        let evaluations = self.evaluate(&mut population, bars);
        let mut logbook = vec![GenerationStats::from_population(0, evaluations, &population)];
        let mut hall_of_fame = select_best(&population).cloned();
        let mut interrupted = false;

        for generation in 1..=self.config.generations {
            if self.should_stop() {
                interrupted = true;
                break;
            }

            let mut offspring = self.select(&population, rng);
            self.crossover(&mut offspring, rng);
            self.mutate(&mut offspring, rng);

            let evaluations = self.evaluate(&mut offspring, bars);
            population = offspring;

            let stats = GenerationStats::from_population(generation, evaluations, &population);
            debug!(
                "Generation {}/{}: evals={} avg={:.2} max={:.2}",
                generation, self.config.generations, stats.evaluations, stats.avg, stats.max
            );
            logbook.push(stats);

            if let Some(best) = select_best(&population) {
                let improved = hall_of_fame.as_ref().map_or(true, |hof| best.beats(hof));
                if improved {
                    hall_of_fame = Some(best.clone());
                }
            }
        }

        EvolutionOutcome {
            population,
            logbook,
            hall_of_fame,
            interrupted,
        }
    }

    /// Evaluate every candidate lacking fitness, in parallel. Returns the count.
    fn evaluate(&self, population: &mut [Candidate], bars: &[Bar]) -> usize {
        let pending = population.iter().filter(|c| c.evaluation.is_none()).count();
        population
            .par_iter_mut()
            .filter(|c| c.evaluation.is_none())
            .for_each(|c| c.evaluation = Some(self.evaluator.evaluate(&c.params, bars)));
        pending
    }

    /// Tournament selection with replacement.
    fn select(&self, population: &[Candidate], rng: &mut StdRng) -> Vec<Candidate> {
        if population.is_empty() {
            return Vec::new();
        }
        let k = self.config.tournament_size.max(1);

        match self.evaluator.objective() {
            Objective::MaximizeProfit => (0..population.len())
                .map(|_| {
                    let mut winner = rng.gen_range(0..population.len());
                    for _ in 1..k {
                        let challenger = rng.gen_range(0..population.len());
                        if population[challenger].beats(&population[winner]) {
                            winner = challenger;
                        }
                    }
                    population[winner].clone()
                })
                .collect(),
            Objective::ParetoProfitDrawdown => {
                let fitness: Vec<_> = population
                    .iter()
                    .filter_map(|c| c.evaluation.as_ref().map(|e| e.fitness))
                    .collect();
                let rankings: Vec<Ranking> = if fitness.len() == population.len() {
                    rank_population(&fitness)
                } else {
                    vec![Ranking { rank: 0, crowding: 0.0 }; population.len()]
                };

                (0..population.len())
                    .map(|_| {
                        let mut winner = rng.gen_range(0..population.len());
                        for _ in 1..k {
                            let challenger = rng.gen_range(0..population.len());
                            if rankings[challenger].crowded_cmp(&rankings[winner]).is_gt() {
                                winner = challenger;
                            }
                        }
                        population[winner].clone()
                    })
                    .collect()
            }
        }
    }

    /// Pairwise two-point crossover on the encoded genes.
    fn crossover(&self, offspring: &mut [Candidate], rng: &mut StdRng) {
        for pair in offspring.chunks_exact_mut(2) {
            if !rng.gen_bool(self.config.crossover_prob.clamp(0.0, 1.0)) {
                continue;
            }
            let mut a = pair[0].params.encode();
            let mut b = pair[1].params.encode();
            two_point_crossover(&mut a, &mut b, rng);

            if let (Ok(pa), Ok(pb)) = (StrategyParams::decode(&a), StrategyParams::decode(&b)) {
                pair[0].set_params(pa);
                pair[1].set_params(pb);
            }
        }
    }

    /// Per-gene mutation: integers shift by up to `int_step`, floats get
    /// Gaussian noise. Results are clamped into bounds.
    fn mutate(&self, offspring: &mut [Candidate], rng: &mut StdRng) {
        let noise = Normal::new(0.0, self.config.float_sigma).ok();
        let indpb = self.config.gene_mutation_prob.clamp(0.0, 1.0);
        let step = self.config.int_step as i64;

        for candidate in offspring.iter_mut() {
            if !rng.gen_bool(self.config.mutation_prob.clamp(0.0, 1.0)) {
                continue;
            }

            let mut params = candidate.params;
            let int_ranges = self.bounds.int_ranges();
            let int_fields = [
                &mut params.sma_fast,
                &mut params.sma_slow,
                &mut params.rsi_period,
                &mut params.rsi_upper,
                &mut params.rsi_lower,
            ];
            for (value, range) in int_fields.into_iter().zip(int_ranges) {
                if rng.gen_bool(indpb) {
                    *value = range.shift(*value, rng.gen_range(-step..=step));
                }
            }

            for (value, range) in [
                (&mut params.stop_loss, self.bounds.stop_loss),
                (&mut params.take_profit, self.bounds.take_profit),
            ] {
                if rng.gen_bool(indpb) {
                    if let Some(noise) = &noise {
                        *value = range.snap(*value + noise.sample(rng));
                    }
                }
            }

            candidate.set_params(params);
        }
    }
}

/// Swap the segment between two random cut points.
fn two_point_crossover<R: Rng + ?Sized>(a: &mut [f64; GENE_COUNT], b: &mut [f64; GENE_COUNT], rng: &mut R) {
    let mut cx1 = rng.gen_range(1..GENE_COUNT);
    let mut cx2 = rng.gen_range(1..GENE_COUNT - 1);
    if cx2 >= cx1 {
        cx2 += 1;
    } else {
        std::mem::swap(&mut cx1, &mut cx2);
    }
    for i in cx1..cx2 {
        std::mem::swap(&mut a[i], &mut b[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{BacktestError, BacktestSummary};
    use crate::genetic::fitness::{FitnessConfig, INVALID_PARAMS_FITNESS};
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rust_decimal::Decimal;

    /// Profit grows with the take-profit gene; drawdown with the stop-loss gene.
    struct ShapedBacktester;

    impl Backtester for ShapedBacktester {
        fn run(
            &self,
            params: &StrategyParams,
            _bars: &[Bar],
            _activation_date: Option<NaiveDate>,
        ) -> Result<BacktestSummary, BacktestError> {
            Ok(BacktestSummary {
                profit_pct: params.take_profit * 100.0,
                max_drawdown_pct: params.stop_loss * 100.0,
                trade_count: 10,
                win_rate: 50.0,
                sharpe_ratio: 0.5,
                final_equity: Decimal::from(10_000),
            })
        }
    }

    fn engine(config: EvolutionConfig, objective: Objective) -> EvolutionEngine<'static, ShapedBacktester> {
        let evaluator = FitnessEvaluator::new(
            &ShapedBacktester,
            FitnessConfig {
                objective,
                ..FitnessConfig::default()
            },
        );
        EvolutionEngine::new(evaluator, config, GeneBounds::default())
    }

    fn small_config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 20,
            generations: 4,
            ..EvolutionConfig::default()
        }
    }

    #[test]
    fn test_population_size_and_fitness_preserved() {
        let mut rng = StdRng::seed_from_u64(42);
        let outcome = engine(small_config(), Objective::MaximizeProfit).run(&[], &mut rng);

        assert_eq!(outcome.population.len(), 20);
        assert!(outcome.population.iter().all(|c| c.evaluation.is_some()));
        assert_eq!(outcome.logbook.len(), 5);
        assert_eq!(outcome.logbook[0].evaluations, 20);
        assert!(!outcome.interrupted);
    }

    #[test]
    fn test_offspring_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = EvolutionConfig {
            mutation_prob: 1.0,
            gene_mutation_prob: 1.0,
            float_sigma: 0.5,
            ..small_config()
        };
        let bounds = GeneBounds::default();
        let outcome = engine(config, Objective::MaximizeProfit).run(&[], &mut rng);
        assert!(outcome.population.iter().all(|c| bounds.contains(&c.params)));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = engine(small_config(), Objective::MaximizeProfit)
            .run(&[], &mut StdRng::seed_from_u64(9));
        let b = engine(small_config(), Objective::MaximizeProfit)
            .run(&[], &mut StdRng::seed_from_u64(9));
        assert_eq!(a.population, b.population);
        assert_eq!(a.logbook, b.logbook);
    }

    #[test]
    fn test_hall_of_fame_is_best_seen() {
        let outcome = engine(small_config(), Objective::MaximizeProfit)
            .run(&[], &mut StdRng::seed_from_u64(1));
        let hof = outcome.hall_of_fame.unwrap().primary_fitness().unwrap();
        let best_logged = outcome
            .logbook
            .iter()
            .map(|g| g.max)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(hof, best_logged);
    }

    #[test]
    fn test_stop_flag_interrupts() {
        let flag = Arc::new(AtomicBool::new(true));
        let outcome = engine(small_config(), Objective::MaximizeProfit)
            .with_stop_flag(flag)
            .run(&[], &mut StdRng::seed_from_u64(5));
        assert!(outcome.interrupted);
        assert_eq!(outcome.logbook.len(), 1);
        assert_eq!(outcome.population.len(), 20);
        assert!(outcome.best().is_some());
    }

    #[test]
    fn test_pareto_mode_runs() {
        let outcome = engine(small_config(), Objective::ParetoProfitDrawdown)
            .run(&[], &mut StdRng::seed_from_u64(11));
        assert_eq!(outcome.population.len(), 20);
        assert!(outcome
            .population
            .iter()
            .all(|c| c.evaluation.as_ref().unwrap().fitness.drawdown().is_some()));
    }

    #[test]
    fn test_select_best_tie_break() {
        let mut low_dd = Candidate::new(StrategyParams {
            stop_loss: 0.02,
            take_profit: 0.10,
            ..StrategyParams::default()
        });
        let mut high_dd = Candidate::new(StrategyParams {
            stop_loss: 0.08,
            take_profit: 0.10,
            ..StrategyParams::default()
        });
        let evaluator = FitnessEvaluator::new(&ShapedBacktester, FitnessConfig::default());
        low_dd.evaluation = Some(evaluator.evaluate(&low_dd.params, &[]));
        high_dd.evaluation = Some(evaluator.evaluate(&high_dd.params, &[]));

        let population = vec![high_dd.clone(), low_dd.clone()];
        assert_eq!(select_best(&population).unwrap().params, low_dd.params);

        let twins = vec![low_dd.clone(), low_dd.clone()];
        assert!(std::ptr::eq(select_best(&twins).unwrap(), &twins[0]));
    }

    #[test]
    fn test_invalid_candidates_get_sentinel() {
        let evaluator = FitnessEvaluator::new(&ShapedBacktester, FitnessConfig::default());
        let params = StrategyParams {
            sma_fast: 50,
            sma_slow: 50,
            ..StrategyParams::default()
        };
        let eval = evaluator.evaluate(&params, &[]);
        assert_eq!(eval.fitness.primary(), INVALID_PARAMS_FITNESS);
    }

    #[test]
    fn test_two_point_crossover_swaps_segment() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut a = [0.0; GENE_COUNT];
        let mut b = [1.0; GENE_COUNT];
        two_point_crossover(&mut a, &mut b, &mut rng);
        let swapped = a.iter().filter(|&&v| v == 1.0).count();
        assert!(swapped >= 1 && swapped < GENE_COUNT);
        assert_eq!(a.iter().sum::<f64>() + b.iter().sum::<f64>(), GENE_COUNT as f64);
    }
}
