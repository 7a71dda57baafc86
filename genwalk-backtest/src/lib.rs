pub mod backtest;
pub mod config;
pub mod data;
pub mod genetic;
pub mod metrics;
pub mod report;
pub mod validation;
pub mod walkforward;

// Re-export commonly used types
pub use backtest::{BacktestConfig, BacktestEngine, BacktestResult, BacktestSummary, Backtester, Trade};
pub use config::{AppConfig, ConfigError, DataConfig};
pub use data::{Bar, DataManager, DataSource, PriceSeries};
pub use genetic::{EvolutionConfig, EvolutionEngine, FitnessConfig, FitnessEvaluator, GeneBounds, Objective, StrategyParams};
pub use metrics::{MetricsCalculator, PerformanceMetrics};
pub use validation::DataIntegrityValidator;
pub use walkforward::{SplitValidator, WalkForwardAnalyzer, WalkForwardConfig, WalkForwardReport};
