use crate::config::{PostgresConfig, SchemaNames, SqliteConfig};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// PostgreSQL store holding both the raw and the analytics schema.
///
/// Tables are expected to exist already; no DDL is issued here.
#[derive(Clone)]
pub struct PostgresDatabase {
    pub pool: PgPool,
    pub schemas: SchemaNames,
}

impl PostgresDatabase {
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to PostgreSQL at {}:{}/{}",
                    config.host, config.port, config.database
                )
            })?;

        info!(
            "Connected to database: postgres://{}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            schemas: config.schemas.clone(),
        })
    }
}

/// SQLite store wrapper
///
/// Non-`main` schemas are attached on every new connection so that
/// `"<schema>".table` resolves the same way it does on PostgreSQL.
#[derive(Clone)]
pub struct SqliteDatabase {
    pub pool: SqlitePool,
    pub schemas: SchemaNames,
}

impl SqliteDatabase {
    pub async fn connect(config: &SqliteConfig) -> Result<Self> {
        let in_memory = config.is_in_memory();

        // Ensure the directory exists if it's a file path
        let main_path = config.url.strip_prefix("sqlite://").map(Path::new);
        if !in_memory
            && let Some(parent) = main_path.and_then(Path::parent)
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let attachments = attachments(&config.schemas, in_memory, main_path);

        let mut options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("Invalid SQLite URL: {}", config.url))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        }

        // An in-memory database (and each attached one) lives only as long as
        // its connection, so keep exactly one open.
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            pool_options.max_connections(5)
        };

        let pool = pool_options
            .after_connect(move |conn, _meta| {
                let attachments = attachments.clone();
                Box::pin(async move {
                    for (schema, file) in &attachments {
                        sqlx::query(&format!("ATTACH DATABASE ? AS \"{}\"", schema))
                            .bind(file.as_str())
                            .execute(&mut *conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", config.url);

        Ok(Self {
            pool,
            schemas: config.schemas.clone(),
        })
    }

    /// Create `prices_daily` and `daily_features` when missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                date TEXT NOT NULL,
                ticker TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (ticker, date)
            );
            "#,
            self.schemas.prices_table()
        ))
        .execute(&mut *conn)
        .await
        .context("Failed to create prices_daily table")?;

        // No primary key: with overwrite disabled, duplicates are allowed.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
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
                return_close_open REAL NOT NULL,
                return_prev_close REAL NOT NULL,
                volatility_20_days REAL NOT NULL,
                run_id TEXT NOT NULL,
                ingested_at_utc TEXT NOT NULL
            );
            "#,
            self.schemas.features_table()
        ))
        .execute(&mut *conn)
        .await
        .context("Failed to create daily_features table")?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS \"{}\".idx_daily_features_ticker_date ON daily_features (ticker, date);",
            self.schemas.analytics
        ))
        .execute(&mut *conn)
        .await
        .context("Failed to create daily_features index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}

/// (schema, database file) pairs to attach on connect.
fn attachments(
    schemas: &SchemaNames,
    in_memory: bool,
    main_path: Option<&Path>,
) -> Vec<(String, String)> {
    let mut names: Vec<&str> = vec![schemas.raw.as_str(), schemas.analytics.as_str()];
    names.retain(|s| !s.eq_ignore_ascii_case("main"));
    names.dedup();

    names
        .into_iter()
        .map(|schema| {
            let file = if in_memory {
                ":memory:".to_string()
            } else {
                let dir = main_path.and_then(Path::parent).unwrap_or(Path::new(""));
                dir.join(format!("{schema}.db")).to_string_lossy().into_owned()
            };
            (schema.to_string(), file)
        })
        .collect()
}
