use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::ConfigurationError;

/// One raw daily OHLCV observation as stored in `prices_daily`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(
        ticker: impl Into<String>,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            date,
            ticker: ticker.into(),
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// One computed row of `daily_features`.
///
/// Field names and [`FeatureRow::COLUMNS`] are the stable tabular contract
/// consumed by scoring services; do not rename them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub year: i32,
    pub month: u32,
    pub day_of_week: u32,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub return_close_open: f64,
    pub return_prev_close: f64,
    pub volatility_20_days: f64,
    pub run_id: String,
    pub ingested_at_utc: DateTime<Utc>,
}

impl FeatureRow {
    /// Destination column order.
    pub const COLUMNS: [&'static str; 15] = [
        "date",
        "ticker",
        "year",
        "month",
        "day_of_week",
        "open",
        "close",
        "high",
        "low",
        "volume",
        "return_close_open",
        "return_prev_close",
        "volatility_20_days",
        "run_id",
        "ingested_at_utc",
    ];

    /// Numeric feature values, in column order.
    pub fn numeric_values(&self) -> [f64; 8] {
        [
            self.open,
            self.close,
            self.high,
            self.low,
            self.volume,
            self.return_close_open,
            self.return_prev_close,
            self.volatility_20_days,
        ]
    }

    /// Same row with `run_id` and `ingested_at_utc` stripped, for comparing
    /// destination states across runs.
    pub fn without_provenance(&self) -> FeatureRow {
        FeatureRow {
            run_id: String::new(),
            ingested_at_utc: DateTime::<Utc>::UNIX_EPOCH,
            ..self.clone()
        }
    }
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigurationError> {
        if start > end {
            return Err(ConfigurationError::InvertedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Smallest range covering every date yielded by `dates`.
    pub fn spanning<I>(dates: I) -> Option<Self>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        dates.into_iter().fold(None, |acc, date| match acc {
            None => Some(Self {
                start: date,
                end: date,
            }),
            Some(r) => Some(Self {
                start: r.start.min(date),
                end: r.end.max(date),
            }),
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Provenance stamped on every row produced by one pipeline execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStamp {
    pub run_id: String,
    pub ingested_at_utc: DateTime<Utc>,
}

impl RunStamp {
    pub fn new(run_id: impl Into<String>, ingested_at_utc: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            ingested_at_utc,
        }
    }

    pub fn now(run_id: impl Into<String>) -> Self {
        Self::new(run_id, Utc::now())
    }
}
