//! Core market data types.
//!
//! A `PriceSeries` is the single price table shared read-only by the
//! optimizer, the backtester and the walk-forward loop. Dates are kept
//! sorted and unique so half-open slicing is a pair of binary searches.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Bar with every price set to `close`.
    pub fn flat(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    /// True when every price and the volume are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }
}

/// Date-indexed OHLCV table for a single instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series, sorting by date and keeping the last bar for a repeated date.
    pub fn new(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { bars: deduped }
    }

    /// Build a series of consecutive calendar days from a list of closes.
    ///
    /// Open is the previous close, high/low bracket both.
    pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Self {
        let bars = closes
            .iter()
            .enumerate()
            .filter_map(|(i, &close)| {
                let date = start.checked_add_days(chrono::Days::new(i as u64))?;
                let open = if i == 0 { close } else { closes[i - 1] };
                Some(Bar {
                    date,
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume: 1_000.0,
                })
            })
            .collect();
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn first_close(&self) -> Option<f64> {
        self.bars.first().map(|b| b.close)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Trading calendar of the series.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Bars with `start <= date < end`. Empty when nothing matches.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        if start >= end {
            return PriceSeries::default();
        }
        let lo = self.bars.partition_point(|b| b.date < start);
        let hi = self.bars.partition_point(|b| b.date < end);
        PriceSeries {
            bars: self.bars[lo..hi].to_vec(),
        }
    }

    /// Split at `ratio` of the bar count into (head, tail).
    pub fn split_at_ratio(&self, ratio: f64) -> (PriceSeries, PriceSeries) {
        let idx = ((self.bars.len() as f64) * ratio.clamp(0.0, 1.0)) as usize;
        let (head, tail) = self.bars.split_at(idx.min(self.bars.len()));
        (
            PriceSeries { bars: head.to_vec() },
            PriceSeries { bars: tail.to_vec() },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_new_sorts_and_dedupes() {
        let series = PriceSeries::new(vec![
            Bar::flat(d(2020, 1, 3), 3.0),
            Bar::flat(d(2020, 1, 1), 1.0),
            Bar::flat(d(2020, 1, 3), 4.0),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), Some(d(2020, 1, 1)));
        assert_eq!(series.last_close(), Some(4.0));
    }

    #[test]
    fn test_slice_is_half_open() {
        let series = PriceSeries::from_closes(d(2020, 1, 1), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let slice = series.slice(d(2020, 1, 2), d(2020, 1, 4));
        assert_eq!(slice.closes(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_slice_outside_range_is_empty() {
        let series = PriceSeries::from_closes(d(2020, 1, 1), &[1.0, 2.0]);
        assert!(series.slice(d(2021, 1, 1), d(2021, 2, 1)).is_empty());
        assert!(series.slice(d(2020, 1, 2), d(2020, 1, 1)).is_empty());
    }

    #[test]
    fn test_split_at_ratio() {
        let closes: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let series = PriceSeries::from_closes(d(2020, 1, 1), &closes);
        let (train, test) = series.split_at_ratio(0.7);
        assert_eq!(train.len(), 7);
        assert_eq!(test.len(), 3);
        assert_eq!(test.first_close(), Some(7.0));
    }
}
