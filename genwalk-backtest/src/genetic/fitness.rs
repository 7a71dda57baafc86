//! Fitness evaluation.
//!
//! Maps one parameter set and a bar sequence to a fitness value. Evaluation
//! never fails: structural problems, inactivity and backtest failures all
//! collapse to distinct sentinel values tagged with an [`EvaluationOutcome`].

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backtest::{BacktestSummary, Backtester};
use crate::data::Bar;

use super::codec::StrategyParams;

/// Fitness of a structurally invalid parameter set (SMA_F >= SMA_S).
pub const INVALID_PARAMS_FITNESS: f64 = -100.0;

/// Fitness of a strategy that traded fewer than `min_trades` times.
pub const INACTIVE_FITNESS: f64 = -50.0;

/// Fitness of an evaluation whose backtest errored, panicked or produced non-finite output.
pub const FAILED_EVALUATION_FITNESS: f64 = -200.0;

/// Drawdown objective assigned to sentinel outcomes in multi-objective mode.
pub const SENTINEL_DRAWDOWN: f64 = 100.0;

/// Fitness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Minimum trade count before a result is scored.
    pub min_trades: usize,
    /// Drawdown percentage above which the excess is subtracted from profit.
    pub max_drawdown_ceiling: f64,
    /// Optimization objective.
    pub objective: Objective,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            min_trades: 5,
            max_drawdown_ceiling: 30.0,
            objective: Objective::MaximizeProfit,
        }
    }
}

/// What the optimizer maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Single objective: penalized profit percentage.
    #[default]
    MaximizeProfit,
    /// Two objectives: maximize profit, minimize drawdown.
    ParetoProfitDrawdown,
}

/// Fitness value of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fitness {
    Scalar(f64),
    Pareto { profit: f64, drawdown: f64 },
}

impl Fitness {
    /// The profit component; the value maximized in single-objective mode.
    pub fn primary(&self) -> f64 {
        match self {
            Self::Scalar(value) => *value,
            Self::Pareto { profit, .. } => *profit,
        }
    }

    /// The drawdown component, when present.
    pub fn drawdown(&self) -> Option<f64> {
        match self {
            Self::Scalar(_) => None,
            Self::Pareto { drawdown, .. } => Some(*drawdown),
        }
    }

    /// Pareto dominance: no worse in every objective and better in one.
    pub fn dominates(&self, other: &Fitness) -> bool {
        match (self, other) {
            (
                Self::Pareto { profit: p1, drawdown: d1 },
                Self::Pareto { profit: p2, drawdown: d2 },
            ) => p1 >= p2 && d1 <= d2 && (p1 > p2 || d1 < d2),
            _ => self.primary() > other.primary(),
        }
    }
}

/// How an evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Scored,
    InvalidParams,
    Inactive,
    Failed,
}

/// Fitness with its outcome tag and the backtest summary when one ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub fitness: Fitness,
    pub outcome: EvaluationOutcome,
    pub summary: Option<BacktestSummary>,
}

impl Evaluation {
    /// Drawdown used for tie-breaking; sentinels rank as worst.
    pub fn drawdown(&self) -> f64 {
        self.fitness
            .drawdown()
            .or_else(|| self.summary.as_ref().map(|s| s.max_drawdown_pct))
            .unwrap_or(SENTINEL_DRAWDOWN)
    }
}

/// Scores parameter sets by backtesting them.
pub struct FitnessEvaluator<'a, B: Backtester + ?Sized> {
    backtester: &'a B,
    config: FitnessConfig,
}

impl<'a, B: Backtester + ?Sized> FitnessEvaluator<'a, B> {
    pub fn new(backtester: &'a B, config: FitnessConfig) -> Self {
        Self { backtester, config }
    }

    pub fn objective(&self) -> Objective {
        self.config.objective
    }

    pub fn config(&self) -> &FitnessConfig {
        &self.config
    }

    /// Evaluate one parameter set on `bars`. Never fails.
    pub fn evaluate(&self, params: &StrategyParams, bars: &[Bar]) -> Evaluation {
        if !params.is_structurally_valid() {
            return self.sentinel(INVALID_PARAMS_FITNESS, EvaluationOutcome::InvalidParams, None);
        }

        let run = panic::catch_unwind(AssertUnwindSafe(|| self.backtester.run(params, bars, None)));
        let summary = match run {
            Ok(Ok(summary)) if summary.is_finite() => summary,
            Ok(Ok(_)) => {
                debug!("Non-finite backtest output for {}", params.key());
                return self.sentinel(FAILED_EVALUATION_FITNESS, EvaluationOutcome::Failed, None);
            }
            Ok(Err(e)) => {
                debug!("Backtest failed for {}: {}", params.key(), e);
                return self.sentinel(FAILED_EVALUATION_FITNESS, EvaluationOutcome::Failed, None);
            }
            Err(_) => {
                debug!("Backtest panicked for {}", params.key());
                return self.sentinel(FAILED_EVALUATION_FITNESS, EvaluationOutcome::Failed, None);
            }
        };

        if summary.trade_count < self.config.min_trades {
            return self.sentinel(INACTIVE_FITNESS, EvaluationOutcome::Inactive, Some(summary));
        }

        let fitness = match self.config.objective {
            Objective::MaximizeProfit => {
                let excess = (summary.max_drawdown_pct - self.config.max_drawdown_ceiling).max(0.0);
                Fitness::Scalar(summary.profit_pct - excess)
            }
            Objective::ParetoProfitDrawdown => Fitness::Pareto {
                profit: summary.profit_pct,
                drawdown: summary.max_drawdown_pct,
            },
        };

        Evaluation {
            fitness,
            outcome: EvaluationOutcome::Scored,
            summary: Some(summary),
        }
    }

    fn sentinel(
        &self,
        value: f64,
        outcome: EvaluationOutcome,
        summary: Option<BacktestSummary>,
    ) -> Evaluation {
        let fitness = match self.config.objective {
            Objective::MaximizeProfit => Fitness::Scalar(value),
            Objective::ParetoProfitDrawdown => Fitness::Pareto {
                profit: value,
                drawdown: SENTINEL_DRAWDOWN,
            },
        };
        Evaluation {
            fitness,
            outcome,
            summary,
        }
    }
}
