//! Daily feature computation.
//!
//! Turns one ticker's raw bars into `daily_features` rows:
//! - calendar columns (year, month, day of week)
//! - intraday return `(close - open) / open`
//! - close-to-close return against the previous bar
//! - rolling sample standard deviation of the close-to-close return
//!
//! Values a lag or a rolling window cannot define yet are written as `0.0`.

use crate::domain::errors::ComputationError;
use crate::domain::types::{FeatureRow, PriceBar, RunStamp};
use chrono::Datelike;
use statrs::statistics::{Data, Distribution};

/// Trailing observations in `volatility_20_days`.
pub const VOLATILITY_WINDOW: usize = 20;

/// Compute features with the default 20-day window.
pub fn compute_features(
    bars: &[PriceBar],
    stamp: &RunStamp,
) -> Result<Vec<FeatureRow>, ComputationError> {
    FeatureCalculator::default().compute(bars, stamp)
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureCalculator {
    volatility_window: usize,
}

impl Default for FeatureCalculator {
    fn default() -> Self {
        Self {
            volatility_window: VOLATILITY_WINDOW,
        }
    }
}

impl FeatureCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute one feature row per bar.
    ///
    /// The input may arrive in any order; rows come back sorted by date.
    /// Output length always equals input length.
    pub fn compute(
        &self,
        bars: &[PriceBar],
        stamp: &RunStamp,
    ) -> Result<Vec<FeatureRow>, ComputationError> {
        let sorted = sort_and_validate(bars)?;

        let closes: Vec<f64> = sorted.iter().map(|b| b.close).collect();
        let prev_close_returns = pct_change(&closes);
        let volatility = rolling_sample_std(&prev_close_returns, self.volatility_window);

        sorted
            .iter()
            .zip(prev_close_returns.iter().zip(volatility.iter()))
            .map(|(bar, (ret, vol))| {
                let row = FeatureRow {
                    date: bar.date,
                    ticker: bar.ticker.clone(),
                    year: bar.date.year(),
                    month: bar.date.month(),
                    day_of_week: bar.date.weekday().num_days_from_monday(),
                    open: bar.open,
                    close: bar.close,
                    high: bar.high,
                    low: bar.low,
                    volume: bar.volume,
                    return_close_open: (bar.close - bar.open) / bar.open,
                    return_prev_close: ret.unwrap_or(0.0),
                    volatility_20_days: vol.unwrap_or(0.0),
                    run_id: stamp.run_id.clone(),
                    ingested_at_utc: stamp.ingested_at_utc,
                };
                ensure_finite(&row)?;
                Ok(row)
            })
            .collect()
    }
}

fn sort_and_validate(bars: &[PriceBar]) -> Result<Vec<&PriceBar>, ComputationError> {
    let first = bars.first().ok_or(ComputationError::EmptySeries)?;

    if let Some(other) = bars.iter().find(|b| b.ticker != first.ticker) {
        return Err(ComputationError::MixedTickers {
            expected: first.ticker.clone(),
            found: other.ticker.clone(),
        });
    }

    // Stable: equal dates keep input order, then get rejected below.
    let mut sorted: Vec<&PriceBar> = bars.iter().collect();
    sorted.sort_by_key(|b| b.date);

    if let Some(pair) = sorted.windows(2).find(|w| w[0].date >= w[1].date) {
        return Err(ComputationError::DuplicateDate {
            ticker: pair[1].ticker.clone(),
            date: pair[1].date,
        });
    }

    for bar in &sorted {
        for (field, value) in [("open", bar.open), ("close", bar.close)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ComputationError::NonPositivePrice {
                    date: bar.date,
                    field,
                    value,
                });
            }
        }
        for (field, value) in [("high", bar.high), ("low", bar.low)] {
            if !value.is_finite() {
                return Err(ComputationError::NonPositivePrice {
                    date: bar.date,
                    field,
                    value,
                });
            }
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(ComputationError::InvalidVolume {
                date: bar.date,
                value: bar.volume,
            });
        }
    }

    Ok(sorted)
}

/// Relative change against the previous element; `None` for the first.
pub fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(values.windows(2).map(|w| Some((w[1] - w[0]) / w[0])));
    out
}

/// Sample standard deviation (n - 1) over a trailing window of exactly
/// `window` observations. Any window with an undefined member is undefined.
pub fn rolling_sample_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let observed: Option<Vec<f64>> = slice.iter().copied().collect();
            let data = Data::new(observed?);
            data.std_dev().filter(|s| s.is_finite())
        })
        .collect()
}

fn ensure_finite(row: &FeatureRow) -> Result<(), ComputationError> {
    let checks = [
        ("return_close_open", row.return_close_open),
        ("return_prev_close", row.return_prev_close),
        ("volatility_20_days", row.volatility_20_days),
    ];
    match checks.iter().find(|(_, v)| !v.is_finite()) {
        Some(&(field, _)) => Err(ComputationError::NonFiniteValue {
            date: row.date,
            field,
        }),
        None => Ok(()),
    }
}
