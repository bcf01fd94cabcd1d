//! Feature Builder - daily technical features for one ticker
//!
//! Reads raw OHLCV bars from `<raw schema>.prices_daily`, computes the
//! feature table and loads it into `<analytics schema>.daily_features`.
//!
//! # Usage
//! ```sh
//! feature-builder --mode by-date-range --ticker AAPL \
//!     --start-date 2024-01-01 --end-date 2024-06-30 --run-id nightly-42
//! ```
//!
//! # Environment Variables
//! - `DB_BACKEND` - `postgres` (default) or `sqlite`
//! - `PG_USER`, `PG_PASSWORD`, `PG_HOST`, `PG_DB` - required for postgres
//! - `PG_PORT` (5432), `PG_SCHEMA_RAW` (raw), `PG_SCHEMA_ANALYTICS` (analytics)
//! - `SQLITE_URL` - required for sqlite
//! - `RUST_LOG` (info), `LOG_FORMAT` (pretty | json)

use anyhow::Result;
use chrono::NaiveDate;
use clap::{ArgAction, Parser};
use feature_builder::application::pipeline::{PipelineRunner, RunMode, RunRequest};
use feature_builder::config::{Config, DatabaseConfig, LogFormat, ObservabilityEnvConfig};
use feature_builder::domain::errors::PipelineError;
use feature_builder::infrastructure::persistence::{
    PgFeatureRepository, PgPriceRepository, PostgresDatabase, SqliteDatabase,
    SqliteFeatureRepository, SqlitePriceRepository,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Feature Builder CLI", long_about = None)]
struct Cli {
    /// Read the full history or only a date range
    #[arg(long)]
    mode: RunMode,

    /// Target instrument
    #[arg(long)]
    ticker: String,

    /// Inclusive start date (YYYY-MM-DD), required with by-date-range
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Inclusive end date (YYYY-MM-DD), required with by-date-range
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Tag stamped on every produced row (a UUID v4 when omitted)
    #[arg(long)]
    run_id: Option<String>,

    /// Delete overlapping rows before inserting
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    overwrite: bool,

    /// Also write the computed rows to this CSV file
    #[arg(long)]
    export_csv: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing();

    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // The runner reports its own failures; these happen before it starts.
    let (mut runner, request) = match prepare(&cli, &run_id).await {
        Ok(ready) => ready,
        Err(err) => {
            error!(
                ticker = %cli.ticker,
                run_id = %run_id,
                kind = err.kind(),
                "Feature builder failed: {}",
                err
            );
            return Err(err.into());
        }
    };

    let report = runner.run(&request).await?;

    match serde_json::to_string(&report) {
        Ok(summary) => info!(summary = %summary, "Run summary"),
        Err(e) => warn!("Could not serialize run summary: {}", e),
    }

    Ok(())
}

/// Validate parameters, load configuration and connect. Nothing here touches
/// the store until configuration has been fully validated.
async fn prepare(cli: &Cli, run_id: &str) -> Result<(PipelineRunner, RunRequest), PipelineError> {
    let mut request = RunRequest::new(
        cli.mode,
        cli.ticker.clone(),
        cli.start_date,
        cli.end_date,
        run_id,
        cli.overwrite,
    )?;
    if let Some(path) = &cli.export_csv {
        request = request.with_export_csv(path);
    }

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Backend={:?}, Schemas={:?}",
        config.database.backend(),
        config.database.schemas()
    );

    let runner = connect(&config.database)
        .await
        .map_err(|source| PipelineError::DataSource {
            ticker: request.ticker.clone(),
            source,
        })?;

    Ok((runner, request))
}

async fn connect(database: &DatabaseConfig) -> Result<PipelineRunner> {
    match database {
        DatabaseConfig::Postgres(pg) => {
            let db = PostgresDatabase::connect(pg).await?;
            Ok(PipelineRunner::new(
                Arc::new(PgPriceRepository::new(db.clone())),
                Arc::new(PgFeatureRepository::new(db)),
            ))
        }
        DatabaseConfig::Sqlite(sqlite) => {
            let db = SqliteDatabase::connect(sqlite).await?;
            db.ensure_schema().await?;
            Ok(PipelineRunner::new(
                Arc::new(SqlitePriceRepository::new(db.clone())),
                Arc::new(SqliteFeatureRepository::new(db)),
            ))
        }
    }
}

fn init_tracing() {
    let observability = ObservabilityEnvConfig::from_lookup(|key| std::env::var(key).ok())
        .unwrap_or_default();

    let filter = EnvFilter::try_new(&observability.log_filter)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match observability.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}
