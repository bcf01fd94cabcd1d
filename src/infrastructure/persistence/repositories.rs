use crate::domain::repositories::{FeatureRepository, LoadOutcome, PriceRepository};
use crate::domain::types::{DateRange, FeatureRow, PriceBar};
use crate::infrastructure::persistence::database::{PostgresDatabase, SqliteDatabase};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Postgres, QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

// 15 binds per row; stays well below both drivers' parameter limits.
const PG_INSERT_CHUNK: usize = 1_000;
const SQLITE_INSERT_CHUNK: usize = 500;

const FEATURE_COLUMN_LIST: &str = "date, ticker, year, month, day_of_week, open, close, high, low, volume, \
     return_close_open, return_prev_close, volatility_20_days, run_id, ingested_at_utc";

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

pub struct PgPriceRepository {
    database: PostgresDatabase,
}

impl PgPriceRepository {
    pub fn new(database: PostgresDatabase) -> Self {
        Self { database }
    }
}

#[async_trait]
impl PriceRepository for PgPriceRepository {
    async fn fetch(&self, ticker: &str, range: Option<DateRange>) -> Result<Vec<PriceBar>> {
        let table = self.database.schemas.prices_table();
        let select = format!(
            "SELECT date::date AS date, ticker::text AS ticker, open::float8 AS open, \
             high::float8 AS high, low::float8 AS low, close::float8 AS close, \
             volume::float8 AS volume FROM {table} WHERE ticker = $1"
        );

        let rows = match range {
            Some(range) => {
                sqlx::query(&format!(
                    "{select} AND date::date >= $2 AND date::date <= $3 ORDER BY date ASC"
                ))
                .bind(ticker)
                .bind(range.start)
                .bind(range.end)
                .fetch_all(&self.database.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{select} ORDER BY date ASC"))
                    .bind(ticker)
                    .fetch_all(&self.database.pool)
                    .await
            }
        }
        .with_context(|| format!("Failed to read {table} for {ticker}"))?;

        rows.iter().map(price_bar_from_pg_row).collect()
    }
}

fn price_bar_from_pg_row(row: &PgRow) -> Result<PriceBar> {
    Ok(PriceBar {
        date: row.try_get("date")?,
        ticker: row.try_get("ticker")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
    })
}

pub struct PgFeatureRepository {
    database: PostgresDatabase,
}

impl PgFeatureRepository {
    pub fn new(database: PostgresDatabase) -> Self {
        Self { database }
    }
}

#[async_trait]
impl FeatureRepository for PgFeatureRepository {
    async fn load(
        &self,
        ticker: &str,
        span: DateRange,
        rows: &[FeatureRow],
        overwrite: bool,
    ) -> Result<LoadOutcome> {
        let table = self.database.schemas.features_table();
        let mut outcome = LoadOutcome::default();

        // Dropping `tx` without commit rolls back the delete as well.
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .context("Failed to begin load transaction")?;

        if overwrite {
            let result = sqlx::query(&format!(
                "DELETE FROM {table} WHERE ticker = $1 AND date >= $2 AND date <= $3"
            ))
            .bind(ticker)
            .bind(span.start)
            .bind(span.end)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete {ticker} rows in {span}"))?;
            outcome.deleted = result.rows_affected();
            info!(
                "Deleted {} previous rows for {} between {} and {}",
                outcome.deleted, ticker, span.start, span.end
            );
        }

        for chunk in rows.chunks(PG_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {table} ({FEATURE_COLUMN_LIST}) "));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.date)
                    .push_bind(row.ticker.clone())
                    .push_bind(row.year as i64)
                    .push_bind(row.month as i64)
                    .push_bind(row.day_of_week as i64)
                    .push_bind(row.open)
                    .push_bind(row.close)
                    .push_bind(row.high)
                    .push_bind(row.low)
                    .push_bind(row.volume)
                    .push_bind(row.return_close_open)
                    .push_bind(row.return_prev_close)
                    .push_bind(row.volatility_20_days)
                    .push_bind(row.run_id.clone())
                    .push_bind(row.ingested_at_utc.naive_utc());
            });
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert features for {ticker}"))?;
            outcome.inserted += result.rows_affected();
            debug!("Inserted chunk of {} rows for {}", chunk.len(), ticker);
        }

        tx.commit()
            .await
            .context("Failed to commit load transaction")?;

        Ok(outcome)
    }

    async fn find_by_ticker(&self, ticker: &str) -> Result<Vec<FeatureRow>> {
        let rows = sqlx::query(&format!(
            "SELECT date::date AS date, ticker::text AS ticker, year::int8 AS year, \
             month::int8 AS month, day_of_week::int8 AS day_of_week, open::float8 AS open, \
             close::float8 AS close, high::float8 AS high, low::float8 AS low, \
             volume::float8 AS volume, return_close_open::float8 AS return_close_open, \
             return_prev_close::float8 AS return_prev_close, \
             volatility_20_days::float8 AS volatility_20_days, run_id::text AS run_id, \
             ingested_at_utc::timestamp AS ingested_at_utc \
             FROM {} WHERE ticker = $1 ORDER BY date ASC",
            self.database.schemas.features_table()
        ))
        .bind(ticker)
        .fetch_all(&self.database.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let ingested: NaiveDateTime = row.try_get("ingested_at_utc")?;
                Ok(FeatureRow {
                    date: row.try_get("date")?,
                    ticker: row.try_get("ticker")?,
                    year: row.try_get::<i64, _>("year")? as i32,
                    month: row.try_get::<i64, _>("month")? as u32,
                    day_of_week: row.try_get::<i64, _>("day_of_week")? as u32,
                    open: row.try_get("open")?,
                    close: row.try_get("close")?,
                    high: row.try_get("high")?,
                    low: row.try_get("low")?,
                    volume: row.try_get("volume")?,
                    return_close_open: row.try_get("return_close_open")?,
                    return_prev_close: row.try_get("return_prev_close")?,
                    volatility_20_days: row.try_get("volatility_20_days")?,
                    run_id: row.try_get("run_id")?,
                    ingested_at_utc: ingested.and_utc(),
                })
            })
            .collect()
    }

    async fn count_rows(&self, ticker: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE ticker = $1",
            self.database.schemas.features_table()
        ))
        .bind(ticker)
        .fetch_one(&self.database.pool)
        .await?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqlitePriceRepository {
    database: SqliteDatabase,
}

impl SqlitePriceRepository {
    pub fn new(database: SqliteDatabase) -> Self {
        Self { database }
    }

    /// Insert or replace raw bars. Used to seed local databases.
    pub async fn upsert(&self, bars: &[PriceBar]) -> Result<()> {
        let table = self.database.schemas.prices_table();
        let mut tx = self.database.pool.begin().await?;
        for bar in bars {
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO {table} (date, ticker, open, high, low, close, volume) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ))
            .bind(bar.date)
            .bind(&bar.ticker)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await
            .context("Failed to save price bar")?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PriceRepository for SqlitePriceRepository {
    async fn fetch(&self, ticker: &str, range: Option<DateRange>) -> Result<Vec<PriceBar>> {
        let table = self.database.schemas.prices_table();
        let select = format!(
            "SELECT date, ticker, CAST(open AS REAL) AS open, CAST(high AS REAL) AS high, \
             CAST(low AS REAL) AS low, CAST(close AS REAL) AS close, \
             CAST(volume AS REAL) AS volume FROM {table} WHERE ticker = $1"
        );

        let rows = match range {
            Some(range) => {
                sqlx::query(&format!(
                    "{select} AND date >= $2 AND date <= $3 ORDER BY date ASC"
                ))
                .bind(ticker)
                .bind(range.start)
                .bind(range.end)
                .fetch_all(&self.database.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{select} ORDER BY date ASC"))
                    .bind(ticker)
                    .fetch_all(&self.database.pool)
                    .await
            }
        }
        .with_context(|| format!("Failed to read {table} for {ticker}"))?;

        rows.iter().map(price_bar_from_sqlite_row).collect()
    }
}

fn price_bar_from_sqlite_row(row: &SqliteRow) -> Result<PriceBar> {
    Ok(PriceBar {
        date: row.try_get::<NaiveDate, _>("date")?,
        ticker: row.try_get("ticker")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
    })
}

pub struct SqliteFeatureRepository {
    database: SqliteDatabase,
}

impl SqliteFeatureRepository {
    pub fn new(database: SqliteDatabase) -> Self {
        Self { database }
    }
}

#[async_trait]
impl FeatureRepository for SqliteFeatureRepository {
    async fn load(
        &self,
        ticker: &str,
        span: DateRange,
        rows: &[FeatureRow],
        overwrite: bool,
    ) -> Result<LoadOutcome> {
        let table = self.database.schemas.features_table();
        let mut outcome = LoadOutcome::default();

        // Dropping `tx` without commit rolls back the delete as well.
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .context("Failed to begin load transaction")?;

        if overwrite {
            let result = sqlx::query(&format!(
                "DELETE FROM {table} WHERE ticker = $1 AND date >= $2 AND date <= $3"
            ))
            .bind(ticker)
            .bind(span.start)
            .bind(span.end)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete {ticker} rows in {span}"))?;
            outcome.deleted = result.rows_affected();
            info!(
                "Deleted {} previous rows for {} between {} and {}",
                outcome.deleted, ticker, span.start, span.end
            );
        }

        for chunk in rows.chunks(SQLITE_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {table} ({FEATURE_COLUMN_LIST}) "));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.date)
                    .push_bind(row.ticker.clone())
                    .push_bind(row.year as i64)
                    .push_bind(row.month as i64)
                    .push_bind(row.day_of_week as i64)
                    .push_bind(row.open)
                    .push_bind(row.close)
                    .push_bind(row.high)
                    .push_bind(row.low)
                    .push_bind(row.volume)
                    .push_bind(row.return_close_open)
                    .push_bind(row.return_prev_close)
                    .push_bind(row.volatility_20_days)
                    .push_bind(row.run_id.clone())
                    .push_bind(row.ingested_at_utc);
            });
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert features for {ticker}"))?;
            outcome.inserted += result.rows_affected();
            debug!("Inserted chunk of {} rows for {}", chunk.len(), ticker);
        }

        tx.commit()
            .await
            .context("Failed to commit load transaction")?;

        Ok(outcome)
    }

    async fn find_by_ticker(&self, ticker: &str) -> Result<Vec<FeatureRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {FEATURE_COLUMN_LIST} FROM {} WHERE ticker = $1 ORDER BY date ASC, rowid ASC",
            self.database.schemas.features_table()
        ))
        .bind(ticker)
        .fetch_all(&self.database.pool)
        .await?;

        rows.iter().map(feature_row_from_sqlite_row).collect()
    }

    async fn count_rows(&self, ticker: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE ticker = $1",
            self.database.schemas.features_table()
        ))
        .bind(ticker)
        .fetch_one(&self.database.pool)
        .await?;
        Ok(count as usize)
    }
}

fn feature_row_from_sqlite_row(row: &SqliteRow) -> Result<FeatureRow> {
    Ok(FeatureRow {
        date: row.try_get("date")?,
        ticker: row.try_get("ticker")?,
        year: row.try_get::<i64, _>("year")? as i32,
        month: row.try_get::<i64, _>("month")? as u32,
        day_of_week: row.try_get::<i64, _>("day_of_week")? as u32,
        open: row.try_get("open")?,
        close: row.try_get("close")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        volume: row.try_get("volume")?,
        return_close_open: row.try_get("return_close_open")?,
        return_prev_close: row.try_get("return_prev_close")?,
        volatility_20_days: row.try_get("volatility_20_days")?,
        run_id: row.try_get("run_id")?,
        ingested_at_utc: row.try_get::<DateTime<Utc>, _>("ingested_at_utc")?,
    })
}
