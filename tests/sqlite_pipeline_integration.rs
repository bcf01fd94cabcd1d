use chrono::{Duration, NaiveDate};
use feature_builder::application::pipeline::{
    PipelineRunner, PipelineState, RunMode, RunRequest,
};
use feature_builder::config::{SchemaNames, SqliteConfig};
use feature_builder::domain::repositories::{FeatureRepository, PriceRepository};
use feature_builder::domain::types::{DateRange, FeatureRow, PriceBar};
use feature_builder::infrastructure::persistence::{
    SqliteDatabase, SqliteFeatureRepository, SqlitePriceRepository,
};
use std::sync::Arc;

struct Harness {
    prices: Arc<SqlitePriceRepository>,
    features: Arc<SqliteFeatureRepository>,
}

impl Harness {
    async fn new() -> Self {
        let db = connect().await;
        db.ensure_schema().await.expect("schema");
        Self::from_db(db)
    }

    fn from_db(db: SqliteDatabase) -> Self {
        Self {
            prices: Arc::new(SqlitePriceRepository::new(db.clone())),
            features: Arc::new(SqliteFeatureRepository::new(db)),
        }
    }

    fn runner(&self) -> PipelineRunner {
        PipelineRunner::new(self.prices.clone(), self.features.clone())
    }
}

async fn connect() -> SqliteDatabase {
    let config = SqliteConfig {
        url: "sqlite::memory:".to_string(),
        schemas: SchemaNames::new("raw", "analytics").unwrap(),
    };
    SqliteDatabase::connect(&config).await.expect("connect")
}

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn daily_bars(ticker: &str, start: NaiveDate, len: usize) -> Vec<PriceBar> {
    (0..len)
        .map(|i| {
            let close = 100.0 + (i as f64 * 1.3).cos() * 3.0;
            PriceBar::new(
                ticker,
                start + Duration::days(i as i64),
                close - 0.4,
                close + 1.0,
                close - 1.0,
                close,
                10_000.0 + i as f64,
            )
        })
        .collect()
}

fn request(ticker: &str, run_id: &str, overwrite: bool) -> RunRequest {
    RunRequest::new(RunMode::Full, ticker, None, None, run_id, overwrite).unwrap()
}

fn strip(rows: &[FeatureRow]) -> Vec<FeatureRow> {
    rows.iter().map(FeatureRow::without_provenance).collect()
}

#[tokio::test]
async fn test_reference_scenario_roundtrips_through_sqlite() {
    let h = Harness::new().await;
    h.prices
        .upsert(&[
            PriceBar::new("AAA", jan(1), 99.0, 101.0, 98.0, 100.0, 1_000.0),
            PriceBar::new("AAA", jan(2), 101.0, 103.0, 100.0, 102.0, 1_100.0),
            PriceBar::new("AAA", jan(3), 102.0, 103.0, 100.0, 101.0, 900.0),
        ])
        .await
        .unwrap();

    let report = h.runner().run(&request("AAA", "run-1", true)).await.unwrap();
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.rows_written, 3);

    let stored = h.features.find_by_ticker("AAA").await.unwrap();
    assert_eq!(stored.len(), 3);
    let second = &stored[1];
    assert_eq!(second.date, jan(2));
    assert!((second.return_close_open - 0.0099).abs() < 1e-4);
    assert!((second.return_prev_close - 0.02).abs() < 1e-12);
    assert_eq!(second.day_of_week, 1);
    assert_eq!(second.run_id, "run-1");
}

#[tokio::test]
async fn test_overwrite_reruns_are_idempotent() {
    let h = Harness::new().await;
    h.prices.upsert(&daily_bars("AAA", jan(1), 30)).await.unwrap();

    h.runner().run(&request("AAA", "run-1", true)).await.unwrap();
    let once = h.features.find_by_ticker("AAA").await.unwrap();

    for run in 2..=4 {
        h.runner()
            .run(&request("AAA", &format!("run-{run}"), true))
            .await
            .unwrap();
    }
    let after = h.features.find_by_ticker("AAA").await.unwrap();

    assert_eq!(after.len(), 30);
    assert_eq!(strip(&after), strip(&once));
    assert!(after.iter().all(|r| r.run_id == "run-4"));
    assert!(after[20].volatility_20_days > 0.0);
}

#[tokio::test]
async fn test_append_mode_retains_duplicates() {
    let h = Harness::new().await;
    h.prices.upsert(&daily_bars("AAA", jan(1), 1)).await.unwrap();

    h.runner().run(&request("AAA", "run-1", true)).await.unwrap();
    let report = h.runner().run(&request("AAA", "run-2", false)).await.unwrap();

    assert_eq!(report.rows_deleted, 0);
    let stored = h.features.find_by_ticker("AAA").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.date == jan(1)));
    assert_eq!(
        stored.iter().map(|r| r.run_id.as_str()).collect::<Vec<_>>(),
        vec!["run-1", "run-2"]
    );
}

#[tokio::test]
async fn test_overwrite_only_touches_computed_span() {
    let h = Harness::new().await;
    h.prices.upsert(&daily_bars("AAA", jan(1), 10)).await.unwrap();
    h.prices.upsert(&daily_bars("BBB", jan(1), 10)).await.unwrap();

    h.runner().run(&request("AAA", "full", true)).await.unwrap();
    h.runner().run(&request("BBB", "full", true)).await.unwrap();

    let partial = RunRequest::new(RunMode::ByDateRange, "AAA", Some(jan(4)), Some(jan(6)), "partial", true)
        .unwrap();
    let report = h.runner().run(&partial).await.unwrap();
    assert_eq!(report.rows_deleted, 3);
    assert_eq!(report.span, Some(DateRange::new(jan(4), jan(6)).unwrap()));

    let aaa = h.features.find_by_ticker("AAA").await.unwrap();
    assert_eq!(aaa.len(), 10);
    let partial_dates: Vec<_> = aaa
        .iter()
        .filter(|r| r.run_id == "partial")
        .map(|r| r.date)
        .collect();
    assert_eq!(partial_dates, vec![jan(4), jan(5), jan(6)]);

    assert_eq!(h.features.count_rows("BBB").await.unwrap(), 10);
}

#[tokio::test]
async fn test_failed_insert_rolls_back_delete() {
    let db = connect().await;
    sqlx::query(
        r#"
        CREATE TABLE "analytics".daily_features (
            date TEXT NOT NULL,
            ticker TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            day_of_week INTEGER NOT NULL,
            open REAL NOT NULL,
            close REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            volume REAL NOT NULL,
            return_close_open REAL NOT NULL CHECK (return_close_open < 0.5),
            return_prev_close REAL NOT NULL,
            volatility_20_days REAL NOT NULL,
            run_id TEXT NOT NULL,
            ingested_at_utc TEXT NOT NULL
        )
        "#,
    )
    .execute(&db.pool)
    .await
    .unwrap();
    db.ensure_schema().await.unwrap();
    let h = Harness::from_db(db);

    h.prices.upsert(&daily_bars("AAA", jan(1), 5)).await.unwrap();
    h.runner().run(&request("AAA", "good", true)).await.unwrap();

    // Doubling intraday makes return_close_open = 1.0, which the CHECK rejects.
    h.prices
        .upsert(&[PriceBar::new("AAA", jan(5), 50.0, 101.0, 49.0, 100.0, 1.0)])
        .await
        .unwrap();
    let mut runner = h.runner();
    let err = runner.run(&request("AAA", "bad", true)).await.unwrap_err();

    assert_eq!(err.kind(), "persistence");
    assert_eq!(runner.state(), PipelineState::Failed);
    let stored = h.features.find_by_ticker("AAA").await.unwrap();
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().all(|r| r.run_id == "good"));
}

#[tokio::test]
async fn test_empty_ticker_is_a_no_op() {
    let h = Harness::new().await;
    h.prices.upsert(&daily_bars("AAA", jan(1), 3)).await.unwrap();

    let mut runner = h.runner();
    let report = runner.run(&request("ZZZ", "run-1", true)).await.unwrap();

    assert_eq!(runner.state(), PipelineState::Done);
    assert_eq!(report.rows_read, 0);
    assert_eq!(report.rows_written, 0);
    assert_eq!(h.features.count_rows("ZZZ").await.unwrap(), 0);
}

#[tokio::test]
async fn test_ticker_values_are_bound_not_interpolated() {
    let h = Harness::new().await;
    let tricky = "O'NEIL' OR '1'='1";
    h.prices.upsert(&daily_bars(tricky, jan(1), 2)).await.unwrap();
    h.prices.upsert(&daily_bars("AAA", jan(1), 2)).await.unwrap();

    let bars = h.prices.fetch(tricky, None).await.unwrap();
    assert_eq!(bars.len(), 2);
    assert!(bars.iter().all(|b| b.ticker == tricky));

    h.runner().run(&request(tricky, "run-1", true)).await.unwrap();
    assert_eq!(h.features.count_rows(tricky).await.unwrap(), 2);
    assert_eq!(h.features.count_rows("AAA").await.unwrap(), 0);
}

#[tokio::test]
async fn test_date_range_read_is_inclusive() {
    let h = Harness::new().await;
    h.prices.upsert(&daily_bars("AAA", jan(1), 10)).await.unwrap();

    let range = DateRange::new(jan(3), jan(7)).unwrap();
    let bars = h.prices.fetch("AAA", Some(range)).await.unwrap();

    assert_eq!(bars.first().map(|b| b.date), Some(jan(3)));
    assert_eq!(bars.last().map(|b| b.date), Some(jan(7)));
    assert_eq!(bars.len(), 5);
}
