//! Configuration module for the feature builder.
//!
//! Configuration is read from the process environment exactly once, in the
//! binary, and handed to components as plain structs. Nothing below the
//! binary reads environment variables.

mod database_config;
mod observability_config;

pub use database_config::{
    DatabaseBackend, DatabaseConfig, PostgresConfig, SchemaNames, SqliteConfig,
    validate_identifier,
};
pub use observability_config::{LogFormat, ObservabilityEnvConfig};

use crate::domain::errors::ConfigurationError;
use std::env;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, map, test fixture).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database: DatabaseConfig::from_lookup(&lookup)?,
            observability: ObservabilityEnvConfig::from_lookup(&lookup)?,
        })
    }
}
