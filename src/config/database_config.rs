//! Store connection configuration parsed from environment variables.
//!
//! Two backends are supported:
//! - PostgreSQL (`PG_*` variables), the production store
//! - SQLite (`SQLITE_*` variables), for local runs and tests

use crate::domain::errors::ConfigurationError;
use std::fmt;
use std::str::FromStr;

/// Which driver to connect with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
}

impl FromStr for DatabaseBackend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseBackend::Postgres),
            "sqlite" => Ok(DatabaseBackend::Sqlite),
            _ => Err(ConfigurationError::InvalidValue {
                name: "DB_BACKEND",
                value: s.to_string(),
                reason: "must be 'postgres' or 'sqlite'".to_string(),
            }),
        }
    }
}

/// Source and destination schema names, validated as plain SQL identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNames {
    pub raw: String,
    pub analytics: String,
}

impl SchemaNames {
    pub fn new(raw: impl Into<String>, analytics: impl Into<String>) -> Result<Self, ConfigurationError> {
        let raw = raw.into();
        let analytics = analytics.into();
        validate_identifier("raw schema", &raw)?;
        validate_identifier("analytics schema", &analytics)?;
        Ok(Self { raw, analytics })
    }

    /// `"<raw>".prices_daily`
    pub fn prices_table(&self) -> String {
        format!("\"{}\".prices_daily", self.raw)
    }

    /// `"<analytics>".daily_features`
    pub fn features_table(&self) -> String {
        format!("\"{}\".daily_features", self.analytics)
    }
}

/// PostgreSQL connection parameters
#[derive(Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schemas: SchemaNames,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("schemas", &self.schemas)
            .finish()
    }
}

impl PostgresConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port_raw = lookup("PG_PORT").unwrap_or_else(|| "5432".to_string());
        let port = port_raw
            .parse::<u16>()
            .map_err(|e| ConfigurationError::InvalidValue {
                name: "PG_PORT",
                value: port_raw.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            user: required(&lookup, "PG_USER")?,
            password: required(&lookup, "PG_PASSWORD")?,
            host: required(&lookup, "PG_HOST")?,
            database: required(&lookup, "PG_DB")?,
            port,
            schemas: SchemaNames::new(
                lookup("PG_SCHEMA_RAW").unwrap_or_else(|| "raw".to_string()),
                lookup("PG_SCHEMA_ANALYTICS").unwrap_or_else(|| "analytics".to_string()),
            )?,
        })
    }
}

/// SQLite connection parameters
///
/// A schema other than `main` is attached as a sibling database file named
/// `<schema>.db` (or a private in-memory database when `url` is in-memory).
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub url: String,
    pub schemas: SchemaNames,
}

impl SqliteConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            url: required(&lookup, "SQLITE_URL")?,
            schemas: SchemaNames::new(
                lookup("SQLITE_SCHEMA_RAW").unwrap_or_else(|| "main".to_string()),
                lookup("SQLITE_SCHEMA_ANALYTICS").unwrap_or_else(|| "main".to_string()),
            )?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            schemas: SchemaNames {
                raw: "main".to_string(),
                analytics: "main".to_string(),
            },
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Backend-specific connection settings
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    Postgres(PostgresConfig),
    Sqlite(SqliteConfig),
}

impl DatabaseConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup("DB_BACKEND")
            .map(|v| v.parse::<DatabaseBackend>())
            .transpose()?
            .unwrap_or(DatabaseBackend::Postgres);

        match backend {
            DatabaseBackend::Postgres => Ok(Self::Postgres(PostgresConfig::from_lookup(lookup)?)),
            DatabaseBackend::Sqlite => Ok(Self::Sqlite(SqliteConfig::from_lookup(lookup)?)),
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Self::Postgres(_) => DatabaseBackend::Postgres,
            Self::Sqlite(_) => DatabaseBackend::Sqlite,
        }
    }

    pub fn schemas(&self) -> &SchemaNames {
        match self {
            Self::Postgres(pg) => &pg.schemas,
            Self::Sqlite(sqlite) => &sqlite.schemas,
        }
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigurationError::MissingVar { name })
}

/// Schema names are spliced into SQL text, so only plain identifiers pass.
pub fn validate_identifier(name: &'static str, value: &str) -> Result<(), ConfigurationError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidIdentifier {
            name,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("schema", "analytics").is_ok());
        assert!(validate_identifier("schema", "_raw_2").is_ok());
        assert!(validate_identifier("schema", "").is_err());
        assert!(validate_identifier("schema", "2raw").is_err());
        assert!(validate_identifier("schema", "raw; DROP TABLE x").is_err());
        assert!(validate_identifier("schema", "ra\"w").is_err());
    }

    #[test]
    fn test_table_names_are_quoted() {
        let schemas = SchemaNames::new("raw", "analytics").unwrap();
        assert_eq!(schemas.prices_table(), "\"raw\".prices_daily");
        assert_eq!(schemas.features_table(), "\"analytics\".daily_features");
    }

    #[test]
    fn test_password_is_not_debug_printed() {
        let config = PostgresConfig {
            host: "db".to_string(),
            port: 5432,
            user: "etl".to_string(),
            password: "hunter2".to_string(),
            database: "markets".to_string(),
            schemas: SchemaNames::new("raw", "analytics").unwrap(),
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
