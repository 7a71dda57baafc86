//! Chromosome codec and gene bounds.
//!
//! A chromosome is the fixed sequence of seven genes
//! `[SMA_F, SMA_S, RSI_P, RSI_UP, RSI_LO, SL, TP]`. The first five are
//! integer indicator settings, the last two are fractional stop-loss and
//! take-profit distances. `StrategyParams` is the canonical in-memory form;
//! the flat and named representations only exist at the edges (crossover,
//! config files, reports).

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of genes in a chromosome.
pub const GENE_COUNT: usize = 7;

/// Gene names in chromosome order.
pub const GENE_NAMES: [&str; GENE_COUNT] = ["SMA_F", "SMA_S", "RSI_P", "RSI_UP", "RSI_LO", "SL", "TP"];

/// Number of leading integer genes.
pub const INTEGER_GENES: usize = 5;

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("Expected {expected} genes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Missing gene: {0}")]
    MissingGene(String),
}

/// Strategy parameters decoded from a chromosome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Fast SMA period.
    #[serde(rename = "SMA_F")]
    pub sma_fast: u32,
    /// Slow SMA period.
    #[serde(rename = "SMA_S")]
    pub sma_slow: u32,
    /// RSI period.
    #[serde(rename = "RSI_P")]
    pub rsi_period: u32,
    /// RSI overbought threshold.
    #[serde(rename = "RSI_UP")]
    pub rsi_upper: u32,
    /// RSI oversold threshold.
    #[serde(rename = "RSI_LO")]
    pub rsi_lower: u32,
    /// Stop loss as a fraction of entry price.
    #[serde(rename = "SL")]
    pub stop_loss: f64,
    /// Take profit as a fraction of entry price.
    #[serde(rename = "TP")]
    pub take_profit: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            sma_fast: 20,
            sma_slow: 100,
            rsi_period: 14,
            rsi_upper: 70,
            rsi_lower: 30,
            stop_loss: 0.05,
            take_profit: 0.10,
        }
    }
}

impl StrategyParams {
    /// Fast average must be strictly shorter than the slow one.
    pub fn is_structurally_valid(&self) -> bool {
        self.sma_fast < self.sma_slow
    }

    /// Longest indicator lookback in bars.
    pub fn max_lookback(&self) -> usize {
        self.sma_fast.max(self.sma_slow).max(self.rsi_period + 1) as usize
    }

    /// Flat chromosome in gene order.
    pub fn encode(&self) -> [f64; GENE_COUNT] {
        [
            self.sma_fast as f64,
            self.sma_slow as f64,
            self.rsi_period as f64,
            self.rsi_upper as f64,
            self.rsi_lower as f64,
            self.stop_loss,
            self.take_profit,
        ]
    }

    /// Decode a flat chromosome. Integer genes are truncated toward zero.
    pub fn decode(genes: &[f64]) -> Result<Self, CodecError> {
        if genes.len() != GENE_COUNT {
            return Err(CodecError::WrongLength {
                expected: GENE_COUNT,
                actual: genes.len(),
            });
        }
        Ok(Self {
            sma_fast: genes[0].trunc() as u32,
            sma_slow: genes[1].trunc() as u32,
            rsi_period: genes[2].trunc() as u32,
            rsi_upper: genes[3].trunc() as u32,
            rsi_lower: genes[4].trunc() as u32,
            stop_loss: genes[5],
            take_profit: genes[6],
        })
    }

    /// Named record keyed by gene name.
    pub fn to_named(&self) -> BTreeMap<String, f64> {
        GENE_NAMES
            .iter()
            .zip(self.encode())
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Decode a named record; extra keys are ignored.
    pub fn from_named(record: &BTreeMap<String, f64>) -> Result<Self, CodecError> {
        let mut genes = [0.0; GENE_COUNT];
        for (slot, name) in genes.iter_mut().zip(GENE_NAMES) {
            *slot = *record
                .get(name)
                .ok_or_else(|| CodecError::MissingGene(name.to_string()))?;
        }
        Self::decode(&genes)
    }

    /// Short identifier used for grouping identical parameter sets.
    pub fn key(&self) -> String {
        format!(
            "sma{}-{}_rsi{}_{}-{}_sl{:.4}_tp{:.4}",
            self.sma_fast,
            self.sma_slow,
            self.rsi_period,
            self.rsi_lower,
            self.rsi_upper,
            self.stop_loss,
            self.take_profit
        )
    }
}

/// Inclusive integer range for one gene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: u32,
    pub max: u32,
}

impl IntRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }

    /// Shift by `delta`, staying inside the range.
    pub fn shift(&self, value: u32, delta: i64) -> u32 {
        (value as i64 + delta).clamp(self.min as i64, self.max as i64) as u32
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Inclusive float range for one gene, optionally discretized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl FloatRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            step: None,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let raw = if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        };
        self.snap(raw)
    }

    /// Clamp into range and round onto the step grid when one is set.
    pub fn snap(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        match self.step {
            Some(step) if step > 0.0 => {
                let steps = ((clamped - self.min) / step).round();
                (self.min + steps * step).clamp(self.min, self.max)
            }
            _ => clamped,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Per-gene bounds used by initialization and mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneBounds {
    pub sma_fast: IntRange,
    pub sma_slow: IntRange,
    pub rsi_period: IntRange,
    pub rsi_upper: IntRange,
    pub rsi_lower: IntRange,
    pub stop_loss: FloatRange,
    pub take_profit: FloatRange,
}

impl Default for GeneBounds {
    fn default() -> Self {
        Self {
            sma_fast: IntRange::new(5, 50),
            sma_slow: IntRange::new(50, 200),
            rsi_period: IntRange::new(5, 30),
            rsi_upper: IntRange::new(60, 90),
            rsi_lower: IntRange::new(10, 40),
            stop_loss: FloatRange::new(0.01, 0.10),
            take_profit: FloatRange::new(0.02, 0.20),
        }
    }
}

impl GeneBounds {
    /// Integer ranges in chromosome order.
    pub fn int_ranges(&self) -> [IntRange; INTEGER_GENES] {
        [
            self.sma_fast,
            self.sma_slow,
            self.rsi_period,
            self.rsi_upper,
            self.rsi_lower,
        ]
    }

    /// Largest lookback any candidate can request.
    pub fn max_lookback(&self) -> usize {
        self.sma_fast
            .max
            .max(self.sma_slow.max)
            .max(self.rsi_period.max + 1) as usize
    }

    /// Draw a random parameter set, each field independently.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> StrategyParams {
        StrategyParams {
            sma_fast: self.sma_fast.sample(rng),
            sma_slow: self.sma_slow.sample(rng),
            rsi_period: self.rsi_period.sample(rng),
            rsi_upper: self.rsi_upper.sample(rng),
            rsi_lower: self.rsi_lower.sample(rng),
            stop_loss: self.stop_loss.sample(rng),
            take_profit: self.take_profit.sample(rng),
        }
    }

    pub fn contains(&self, params: &StrategyParams) -> bool {
        self.sma_fast.contains(params.sma_fast)
            && self.sma_slow.contains(params.sma_slow)
            && self.rsi_period.contains(params.rsi_period)
            && self.rsi_upper.contains(params.rsi_upper)
            && self.rsi_lower.contains(params.rsi_lower)
            && self.stop_loss.contains(params.stop_loss)
            && self.take_profit.contains(params.take_profit)
    }

    /// Returns a description of the first malformed range, if any.
    pub fn validate(&self) -> Result<(), String> {
        for (name, range) in GENE_NAMES.iter().zip(self.int_ranges()) {
            if range.min > range.max {
                return Err(format!("{} min {} > max {}", name, range.min, range.max));
            }
        }
        for (name, range) in [("SL", self.stop_loss), ("TP", self.take_profit)] {
            if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
                return Err(format!("{} range [{}, {}] is invalid", name, range.min, range.max));
            }
        }
        if self.sma_fast.min == 0 || self.sma_slow.min == 0 || self.rsi_period.min == 0 {
            return Err("indicator periods must be at least 1".to_string());
        }
        Ok(())
    }
}
