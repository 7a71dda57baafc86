//! Genetic optimization of strategy parameters.
//!
//! - `codec`: chromosome layout, gene bounds and the `StrategyParams` record
//! - `fitness`: backtest-driven fitness with sentinel outcomes
//! - `engine`: the generational loop (tournament, two-point crossover, mutation)
//! - `nsga`: non-dominated sorting for the profit/drawdown mode

pub mod codec;
pub mod engine;
pub mod fitness;
pub mod nsga;

pub use codec::{CodecError, FloatRange, GeneBounds, IntRange, StrategyParams, GENE_COUNT, GENE_NAMES};
pub use engine::{
    select_best, Candidate, EvolutionConfig, EvolutionEngine, EvolutionOutcome, GenerationStats,
};
pub use fitness::{
    Evaluation, EvaluationOutcome, Fitness, FitnessConfig, FitnessEvaluator, Objective,
    FAILED_EVALUATION_FITNESS, INACTIVE_FITNESS, INVALID_PARAMS_FITNESS, SENTINEL_DRAWDOWN,
};
