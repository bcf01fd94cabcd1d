use chrono::NaiveDate;
use thiserror::Error;

/// Invalid or missing invocation parameters. Always raised before any store access.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required environment variable: {name}")]
    MissingVar { name: &'static str },

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid SQL identifier for {name}: {value:?}")]
    InvalidIdentifier { name: &'static str, value: String },

    #[error("Mode 'by-date-range' requires both --start-date and --end-date")]
    MissingDateRange,

    #[error("Start date {start} is after end date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
}

/// A price series that cannot produce trustworthy features.
#[derive(Debug, Error, PartialEq)]
pub enum ComputationError {
    #[error("Cannot compute features from an empty price series")]
    EmptySeries,

    #[error("Price series mixes tickers: expected {expected}, found {found}")]
    MixedTickers { expected: String, found: String },

    #[error("Duplicate bar for {ticker} on {date}")]
    DuplicateDate { ticker: String, date: NaiveDate },

    #[error("Non-positive or non-finite {field} price on {date}: {value}")]
    NonPositivePrice {
        date: NaiveDate,
        field: &'static str,
        value: f64,
    },

    #[error("Negative or non-finite volume on {date}: {value}")]
    InvalidVolume { date: NaiveDate, value: f64 },

    #[error("Computed {field} on {date} is not finite")]
    NonFiniteValue { date: NaiveDate, field: &'static str },
}

/// Terminal failure of one pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to read raw prices for {ticker}")]
    DataSource {
        ticker: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Computation(#[from] ComputationError),

    #[error("Failed to load features for {ticker}; transaction rolled back")]
    Persistence {
        ticker: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to export features for {ticker}")]
    Export {
        ticker: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Short failure class used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::DataSource { .. } => "data_source",
            PipelineError::Computation(_) => "computation",
            PipelineError::Persistence { .. } => "persistence",
            PipelineError::Export { .. } => "export",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_computation_error_formatting() {
        let error = ComputationError::NonPositivePrice {
            date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            field: "open",
            value: 0.0,
        };

        let msg = error.to_string();
        assert!(msg.contains("open"));
        assert!(msg.contains("2024-01-03"));
    }

    #[test]
    fn test_pipeline_error_kind() {
        let err = PipelineError::DataSource {
            ticker: "AAA".to_string(),
            source: anyhow::anyhow!("connection refused"),
        };
        assert_eq!(err.kind(), "data_source");
        assert!(err.to_string().contains("AAA"));

        let err: PipelineError = ConfigurationError::MissingVar { name: "PG_USER" }.into();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("PG_USER"));
    }
}
