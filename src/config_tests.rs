use crate::config::{Config, DatabaseBackend, DatabaseConfig, LogFormat};
use crate::domain::errors::ConfigurationError;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const PG_VARS: [(&str, &str); 4] = [
    ("PG_USER", "etl"),
    ("PG_PASSWORD", "secret"),
    ("PG_HOST", "db.internal"),
    ("PG_DB", "markets"),
];

#[test]
fn test_postgres_config_with_defaults() {
    let config = Config::from_lookup(lookup_from(&PG_VARS)).unwrap();

    assert_eq!(config.database.backend(), DatabaseBackend::Postgres);
    let DatabaseConfig::Postgres(pg) = &config.database else {
        panic!("expected postgres config");
    };
    assert_eq!(pg.port, 5432);
    assert_eq!(pg.host, "db.internal");
    assert_eq!(pg.schemas.raw, "raw");
    assert_eq!(pg.schemas.analytics, "analytics");
    assert_eq!(config.observability.log_format, LogFormat::Pretty);
}

#[test]
fn test_postgres_config_overrides() {
    let mut vars = PG_VARS.to_vec();
    vars.extend([
        ("PG_PORT", "6543"),
        ("PG_SCHEMA_RAW", "landing"),
        ("PG_SCHEMA_ANALYTICS", "features"),
        ("LOG_FORMAT", "json"),
    ]);
    let config = Config::from_lookup(lookup_from(&vars)).unwrap();

    let DatabaseConfig::Postgres(pg) = &config.database else {
        panic!("expected postgres config");
    };
    assert_eq!(pg.port, 6543);
    assert_eq!(pg.schemas.prices_table(), "\"landing\".prices_daily");
    assert_eq!(pg.schemas.features_table(), "\"features\".daily_features");
    assert_eq!(config.observability.log_format, LogFormat::Json);
}

#[test]
fn test_each_missing_credential_is_fatal() {
    for missing in ["PG_USER", "PG_PASSWORD", "PG_HOST", "PG_DB"] {
        let vars: Vec<_> = PG_VARS.iter().copied().filter(|(k, _)| *k != missing).collect();
        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        match err {
            ConfigurationError::MissingVar { name } => assert_eq!(name, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn test_blank_credential_counts_as_missing() {
    let mut vars = PG_VARS.to_vec();
    vars[1] = ("PG_PASSWORD", "  ");
    let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingVar { name: "PG_PASSWORD" }));
}

#[test]
fn test_invalid_port_and_schema_rejected() {
    let mut vars = PG_VARS.to_vec();
    vars.push(("PG_PORT", "not-a-port"));
    assert!(matches!(
        Config::from_lookup(lookup_from(&vars)).unwrap_err(),
        ConfigurationError::InvalidValue { name: "PG_PORT", .. }
    ));

    let mut vars = PG_VARS.to_vec();
    vars.push(("PG_SCHEMA_RAW", "raw.prices; --"));
    assert!(matches!(
        Config::from_lookup(lookup_from(&vars)).unwrap_err(),
        ConfigurationError::InvalidIdentifier { .. }
    ));
}

#[test]
fn test_sqlite_backend() {
    let config = Config::from_lookup(lookup_from(&[
        ("DB_BACKEND", "sqlite"),
        ("SQLITE_URL", "sqlite://data/features.db"),
    ]))
    .unwrap();

    let DatabaseConfig::Sqlite(sqlite) = &config.database else {
        panic!("expected sqlite config");
    };
    assert_eq!(sqlite.url, "sqlite://data/features.db");
    assert_eq!(sqlite.schemas.raw, "main");
    assert!(!sqlite.is_in_memory());

    let err = Config::from_lookup(lookup_from(&[("DB_BACKEND", "sqlite")])).unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingVar { name: "SQLITE_URL" }));
}

#[test]
fn test_unknown_backend_rejected() {
    let err = Config::from_lookup(lookup_from(&[("DB_BACKEND", "oracle")])).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { name: "DB_BACKEND", .. }));
}
