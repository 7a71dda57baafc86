//! Technical indicators used by the strategy.
//!
//! Outputs are aligned index-for-index with the input and hold `NaN`
//! until enough history has accumulated.

/// Simple moving average over `period` values.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Relative strength index with Wilder smoothing.
///
/// The first value is available at index `period`. A window with neither
/// gains nor losses reads 50.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (1.0 - alpha) * avg_gain + alpha * gain;
        avg_loss = (1.0 - alpha) * avg_loss + alpha * loss;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let total = avg_gain + avg_loss;
    if total == 0.0 {
        50.0
    } else {
        100.0 * avg_gain / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_warmup_and_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_relative_eq!(out[2], 2.0);
        assert_relative_eq!(out[3], 3.0);
        assert_relative_eq!(out[4], 4.0);
    }

    #[test]
    fn test_sma_short_input() {
        assert!(sma(&[1.0, 2.0], 5).iter().all(|v| v.is_nan()));
        assert!(sma(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_rsi_flat_is_fifty() {
        let out = rsi(&[10.0; 20], 14);
        assert!(out[13].is_nan());
        assert_relative_eq!(out[14], 50.0);
        assert_relative_eq!(out[19], 50.0);
    }

    #[test]
    fn test_rsi_monotonic_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_relative_eq!(rsi(&rising, 14)[29], 100.0);
        assert_relative_eq!(rsi(&falling, 14)[29], 0.0);
    }

    #[test]
    fn test_rsi_seed_average() {
        // Two gains of 1 and one loss of 1 over a 3-bar seed.
        let out = rsi(&[10.0, 11.0, 12.0, 11.0], 3);
        assert_relative_eq!(out[3], 100.0 * (2.0 / 3.0) / (2.0 / 3.0 + 1.0 / 3.0));
    }

    #[test]
    fn test_rsi_stays_bounded() {
        let values: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        for v in rsi(&values, 9).into_iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
