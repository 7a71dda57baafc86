//! Application configuration.
//!
//! Loaded from a TOML file; every section and field falls back to its
//! default, so an empty file is a valid configuration.
//!
//! ```toml
//! [data]
//! ticker = "BTC-USD"
//!
//! [walk_forward]
//! train_months = 12
//! test_months = 3
//! step_months = 3
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::BacktestConfig;
use crate::genetic::{EvolutionConfig, FitnessConfig, GeneBounds};
use crate::walkforward::{SplitConfig, WalkForwardConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where price data comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub ticker: String,
    /// Bar interval used in the cached file name.
    pub interval: String,
    pub data_dir: PathBuf,
    /// Explicit file; overrides `{data_dir}/{ticker}_{interval}.{csv,parquet}`.
    pub file: Option<PathBuf>,
    /// First bar kept (inclusive).
    pub start_date: Option<NaiveDate>,
    /// Last bar kept (inclusive).
    pub end_date: Option<NaiveDate>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            ticker: "BTC-USD".to_string(),
            interval: "1d".to_string(),
            data_dir: PathBuf::from("data"),
            file: None,
            start_date: None,
            end_date: None,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub backtest: BacktestConfig,
    pub fitness: FitnessConfig,
    pub evolution: EvolutionConfig,
    pub walk_forward: WalkForwardConfig,
    pub split: SplitConfig,
    pub gene_bounds: GeneBounds,
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let wf = &self.walk_forward;
        if wf.train_months == 0 || wf.test_months == 0 || wf.step_months == 0 {
            return Err(ConfigError::Invalid(
                "walk_forward months must be greater than zero".to_string(),
            ));
        }
        if wf.window_population == 0 {
            return Err(ConfigError::Invalid(
                "walk_forward.window_population must be greater than zero".to_string(),
            ));
        }

        let evo = &self.evolution;
        if evo.population_size == 0 {
            return Err(ConfigError::Invalid(
                "evolution.population_size must be greater than zero".to_string(),
            ));
        }
        if evo.tournament_size == 0 {
            return Err(ConfigError::Invalid(
                "evolution.tournament_size must be greater than zero".to_string(),
            ));
        }
        for (name, p) in [
            ("crossover_prob", evo.crossover_prob),
            ("mutation_prob", evo.mutation_prob),
            ("gene_mutation_prob", evo.gene_mutation_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "evolution.{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        if !(evo.float_sigma.is_finite() && evo.float_sigma >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "evolution.float_sigma must be non-negative, got {}",
                evo.float_sigma
            )));
        }

        self.gene_bounds
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("gene_bounds: {}", e)))?;

        let ratio = self.split.train_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "split.train_ratio must be within (0, 1), got {}",
                ratio
            )));
        }

        let alloc = self.backtest.allocation_pct;
        if !(alloc > 0.0 && alloc <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "backtest.allocation_pct must be within (0, 100], got {}",
                alloc
            )));
        }
        if self.backtest.initial_cash <= rust_decimal::Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "backtest.initial_cash must be positive".to_string(),
            ));
        }

        if let (Some(start), Some(end)) = (self.data.start_date, self.data.end_date) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "data.start_date {} must not be after end_date {}",
                    start, end
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic::{IntRange, Objective};

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.data.ticker, "BTC-USD");
        assert_eq!(config.evolution.population_size, 50);
        assert_eq!(config.evolution.generations, 10);
        assert_eq!(config.walk_forward.train_months, 12);
        assert_eq!(config.split.train_ratio, 0.70);
        assert_eq!(config.gene_bounds, GeneBounds::default());
    }

    #[test]
    fn test_partial_sections_override() {
        let config = AppConfig::from_toml_str(
            r#"
            [data]
            ticker = "SPY"
            start_date = "2020-01-01"

            [fitness]
            objective = "pareto_profit_drawdown"

            [evolution]
            population_size = 20
            seed = 42

            [gene_bounds.sma_fast]
            min = 3
            max = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.data.ticker, "SPY");
        assert_eq!(config.data.interval, "1d");
        assert_eq!(
            config.data.start_date,
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
        assert_eq!(config.fitness.objective, Objective::ParetoProfitDrawdown);
        assert_eq!(config.evolution.population_size, 20);
        assert_eq!(config.evolution.generations, 10);
        assert_eq!(config.evolution.seed, Some(42));
        assert_eq!(config.gene_bounds.sma_fast, IntRange::new(3, 20));
        assert_eq!(config.gene_bounds.sma_slow, IntRange::new(50, 200));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_months = AppConfig::from_toml_str("[walk_forward]\ntest_months = 0\n");
        assert!(matches!(zero_months, Err(ConfigError::Invalid(_))));

        let bad_prob = AppConfig::from_toml_str("[evolution]\nmutation_prob = 1.5\n");
        assert!(matches!(bad_prob, Err(ConfigError::Invalid(_))));

        let inverted = AppConfig::from_toml_str("[gene_bounds.rsi_period]\nmin = 30\nmax = 5\n");
        assert!(matches!(inverted, Err(ConfigError::Invalid(_))));

        let ratio = AppConfig::from_toml_str("[split]\ntrain_ratio = 1.0\n");
        assert!(matches!(ratio, Err(ConfigError::Invalid(_))));

        let reversed = AppConfig::from_toml_str(
            "[data]\nstart_date = \"2021-01-02\"\nend_date = \"2021-01-01\"\n",
        );
        assert!(matches!(reversed, Err(ConfigError::Invalid(_))));

        let single_day = AppConfig::from_toml_str(
            "[data]\nstart_date = \"2021-01-01\"\nend_date = \"2021-01-01\"\n",
        );
        assert!(single_day.is_ok());
    }

    #[test]
    fn test_parse_error() {
        let result = AppConfig::from_toml_str("[data\nticker = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_toml_file(Path::new("/nonexistent/genwalk.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
