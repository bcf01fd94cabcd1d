//! Repository Pattern Abstractions
//!
//! Storage seams of the feature pipeline:
//! - `PriceRepository`: read-only access to raw daily bars (`prices_daily`)
//! - `FeatureRepository`: transactional writes to `daily_features`
//!
//! # Implementations
//!
//! - `infrastructure::persistence` provides PostgreSQL and SQLite adapters
//! - `infrastructure::repositories` provides in-memory adapters for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use feature_builder::domain::repositories::PriceRepository;
//! use feature_builder::infrastructure::InMemoryPriceRepository;
//!
//! # async {
//! let repo = InMemoryPriceRepository::new();
//! let bars = repo.fetch("AAPL", None).await.unwrap();
//! assert!(bars.is_empty());
//! # };
//! ```

use crate::domain::types::{DateRange, FeatureRow, PriceBar};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Source of raw OHLCV history
#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// Bars for `ticker`, restricted to the inclusive `range` when given.
    ///
    /// An unknown ticker yields an empty vector, not an error.
    async fn fetch(&self, ticker: &str, range: Option<DateRange>) -> Result<Vec<PriceBar>>;
}

/// Rows touched by one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub deleted: u64,
    pub inserted: u64,
}

/// Destination of computed features
#[async_trait]
pub trait FeatureRepository: Send + Sync {
    /// Atomically replace (`overwrite = true`) or append to the rows of
    /// `ticker` within `span`.
    ///
    /// With `overwrite` the delete and the insert commit together or not at all.
    async fn load(
        &self,
        ticker: &str,
        span: DateRange,
        rows: &[FeatureRow],
        overwrite: bool,
    ) -> Result<LoadOutcome>;

    /// All stored rows for `ticker`, ordered by date
    async fn find_by_ticker(&self, ticker: &str) -> Result<Vec<FeatureRow>>;

    /// Count stored rows for `ticker`
    async fn count_rows(&self, ticker: &str) -> Result<usize>;
}
