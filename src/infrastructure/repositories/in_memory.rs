//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementations of the repository traits defined
//! in `domain::repositories`.
//!
//! # Features
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Atomic loads**: a load builds the next state aside and swaps it in
//!   under one write lock, mirroring a database transaction
//! - **Testing**: Ideal for unit tests of the pipeline without a database
//!
//! For persistence use the PostgreSQL or SQLite repositories in
//! `infrastructure::persistence`.

use crate::domain::repositories::{FeatureRepository, LoadOutcome, PriceRepository};
use crate::domain::types::{DateRange, FeatureRow, PriceBar};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of PriceRepository
#[derive(Clone, Default)]
pub struct InMemoryPriceRepository {
    bars: Arc<RwLock<Vec<PriceBar>>>,
}

impl InMemoryPriceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(bars: Vec<PriceBar>) -> Self {
        Self {
            bars: Arc::new(RwLock::new(bars)),
        }
    }

    pub async fn insert(&self, bar: PriceBar) {
        self.bars.write().await.push(bar);
    }
}

#[async_trait]
impl PriceRepository for InMemoryPriceRepository {
    async fn fetch(&self, ticker: &str, range: Option<DateRange>) -> Result<Vec<PriceBar>> {
        let bars = self.bars.read().await;
        let mut selected: Vec<PriceBar> = bars
            .iter()
            .filter(|b| b.ticker == ticker)
            .filter(|b| range.is_none_or(|r| r.contains(b.date)))
            .cloned()
            .collect();
        selected.sort_by_key(|b| b.date);
        Ok(selected)
    }
}

/// In-memory implementation of FeatureRepository
/// Rows are kept in insertion order, duplicates included.
#[derive(Clone, Default)]
pub struct InMemoryFeatureRepository {
    rows: Arc<RwLock<Vec<FeatureRow>>>,
}

impl InMemoryFeatureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row
    pub async fn all_rows(&self) -> Vec<FeatureRow> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl FeatureRepository for InMemoryFeatureRepository {
    async fn load(
        &self,
        ticker: &str,
        span: DateRange,
        rows: &[FeatureRow],
        overwrite: bool,
    ) -> Result<LoadOutcome> {
        let mut guard = self.rows.write().await;
        let mut next = guard.clone();

        let before = next.len();
        if overwrite {
            next.retain(|r| !(r.ticker == ticker && span.contains(r.date)));
        }
        let deleted = (before - next.len()) as u64;
        next.extend_from_slice(rows);

        *guard = next;
        Ok(LoadOutcome {
            deleted,
            inserted: rows.len() as u64,
        })
    }

    async fn find_by_ticker(&self, ticker: &str) -> Result<Vec<FeatureRow>> {
        let rows = self.rows.read().await;
        let mut selected: Vec<FeatureRow> =
            rows.iter().filter(|r| r.ticker == ticker).cloned().collect();
        selected.sort_by_key(|r| r.date);
        Ok(selected)
    }

    async fn count_rows(&self, ticker: &str) -> Result<usize> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.ticker == ticker)
            .count())
    }
}
