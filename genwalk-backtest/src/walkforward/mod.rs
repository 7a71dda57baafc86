//! Walk-forward validation module.
//!
//! Rolling windows over the price history:
//! - Train: 12 months (genetic optimization)
//! - Test: 3 months (out-of-sample validation, warm-up prefixed)
//! - Roll: 3 months
//!
//! `split` runs the single train/test split variant.

pub mod orchestrator;
pub mod periods;
pub mod split;

pub use orchestrator::{
    aggregate_windows, find_consensus_params, AggregateReport, BuyHoldBenchmark, SkippedWindow,
    WalkForwardAnalyzer, WalkForwardError, WalkForwardReport, WindowProgress, WindowResult,
    WindowStatus,
};
pub use periods::{WalkForwardConfig, Window, WindowScheduler};
pub use split::{SplitConfig, SplitReport, SplitValidator};
