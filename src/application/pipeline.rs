//! Feature pipeline orchestration.
//!
//! One invocation reads one ticker's raw bars, computes features and loads
//! them, walking `Idle → Reading → Computing → Loading → Done`. Any failure
//! moves to `Failed` and ends the run; there are no retries here.

use crate::application::export;
use crate::application::feature_calculator::FeatureCalculator;
use crate::domain::errors::{ComputationError, ConfigurationError, PipelineError};
use crate::domain::repositories::{FeatureRepository, PriceRepository};
use crate::domain::types::{DateRange, RunStamp};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Whether the raw read is bounded by dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Full,
    ByDateRange,
}

impl FromStr for RunMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(RunMode::Full),
            "by-date-range" => Ok(RunMode::ByDateRange),
            _ => Err(ConfigurationError::InvalidValue {
                name: "mode",
                value: s.to_string(),
                reason: "must be 'full' or 'by-date-range'".to_string(),
            }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::ByDateRange => write!(f, "by-date-range"),
        }
    }
}

/// Parameters of one pipeline invocation, validated up front.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: RunMode,
    pub ticker: String,
    pub range: Option<DateRange>,
    pub run_id: String,
    pub overwrite: bool,
    pub export_csv: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(
        mode: RunMode,
        ticker: impl Into<String>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        run_id: impl Into<String>,
        overwrite: bool,
    ) -> Result<Self, ConfigurationError> {
        let ticker = ticker.into();
        if ticker.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                name: "ticker",
                value: ticker,
                reason: "must not be empty".to_string(),
            });
        }

        let range = match mode {
            RunMode::Full => None,
            RunMode::ByDateRange => match (start_date, end_date) {
                (Some(start), Some(end)) => Some(DateRange::new(start, end)?),
                _ => return Err(ConfigurationError::MissingDateRange),
            },
        };

        Ok(Self {
            mode,
            ticker,
            range,
            run_id: run_id.into(),
            overwrite,
            export_csv: None,
        })
    }

    pub fn with_export_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_csv = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Reading,
    Computing,
    Loading,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Reading)
                | (Reading, Computing)
                | (Reading, Done)
                | (Computing, Loading)
                | (Loading, Done)
                | (Reading, Failed)
                | (Computing, Failed)
                | (Loading, Failed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub ticker: String,
    pub run_id: String,
    pub mode: RunMode,
    pub state: PipelineState,
    pub trail: Vec<PipelineState>,
    pub rows_read: usize,
    pub rows_written: u64,
    pub rows_deleted: u64,
    pub span: Option<DateRange>,
    pub ingested_at_utc: Option<DateTime<Utc>>,
}

impl PipelineReport {
    fn new(request: &RunRequest) -> Self {
        Self {
            ticker: request.ticker.clone(),
            run_id: request.run_id.clone(),
            mode: request.mode,
            state: PipelineState::Idle,
            trail: vec![PipelineState::Idle],
            rows_read: 0,
            rows_written: 0,
            rows_deleted: 0,
            span: None,
            ingested_at_utc: None,
        }
    }
}

/// Reader → Calculator → Loader for one (mode, ticker, range, run id).
pub struct PipelineRunner {
    prices: Arc<dyn PriceRepository>,
    features: Arc<dyn FeatureRepository>,
    calculator: FeatureCalculator,
    state: PipelineState,
}

impl PipelineRunner {
    pub fn new(prices: Arc<dyn PriceRepository>, features: Arc<dyn FeatureRepository>) -> Self {
        Self {
            prices,
            features,
            calculator: FeatureCalculator::default(),
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Execute one run. A failure is logged once with ticker, run id and kind,
    /// then returned unchanged.
    pub async fn run(&mut self, request: &RunRequest) -> Result<PipelineReport, PipelineError> {
        self.state = PipelineState::Idle;
        let mut report = PipelineReport::new(request);

        info!(
            ticker = %request.ticker,
            run_id = %request.run_id,
            mode = %request.mode,
            overwrite = request.overwrite,
            "Starting feature builder"
        );

        match self.execute(request, &mut report).await {
            Ok(()) => Ok(report),
            Err(err) => {
                self.transition(&mut report, PipelineState::Failed);
                error!(
                    ticker = %request.ticker,
                    run_id = %request.run_id,
                    kind = err.kind(),
                    "Pipeline failed: {}",
                    ErrorChain(&err)
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &mut self,
        request: &RunRequest,
        report: &mut PipelineReport,
    ) -> Result<(), PipelineError> {
        let ticker = request.ticker.as_str();

        self.transition(report, PipelineState::Reading);
        info!(ticker, range = ?request.range, "Reading raw prices");
        let bars = self
            .prices
            .fetch(ticker, request.range)
            .await
            .map_err(|source| PipelineError::DataSource {
                ticker: ticker.to_string(),
                source,
            })?;
        report.rows_read = bars.len();

        if bars.is_empty() {
            info!(ticker, run_id = %request.run_id, "No raw data found, nothing to do");
            self.transition(report, PipelineState::Done);
            return Ok(());
        }

        self.transition(report, PipelineState::Computing);
        info!(ticker, bars = bars.len(), "Computing features");
        let stamp = RunStamp::now(request.run_id.clone());
        let rows = self.calculator.compute(&bars, &stamp)?;
        report.ingested_at_utc = Some(stamp.ingested_at_utc);

        // Non-empty by construction, see the early return above.
        let span = DateRange::spanning(rows.iter().map(|r| r.date))
            .ok_or(ComputationError::EmptySeries)?;
        report.span = Some(span);

        if let Some(path) = &request.export_csv {
            export::write_csv_file(path, &rows).map_err(|source| PipelineError::Export {
                ticker: ticker.to_string(),
                source,
            })?;
            info!(ticker, path = %path.display(), rows = rows.len(), "Exported features");
        }

        self.transition(report, PipelineState::Loading);
        info!(ticker, %span, overwrite = request.overwrite, "Writing features");
        let outcome = self
            .features
            .load(ticker, span, &rows, request.overwrite)
            .await
            .map_err(|source| PipelineError::Persistence {
                ticker: ticker.to_string(),
                source,
            })?;
        report.rows_deleted = outcome.deleted;
        report.rows_written = outcome.inserted;

        self.transition(report, PipelineState::Done);
        info!(
            ticker,
            run_id = %request.run_id,
            rows = outcome.inserted,
            deleted = outcome.deleted,
            "Success"
        );
        Ok(())
    }

    fn transition(&mut self, report: &mut PipelineReport, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
        report.state = next;
        report.trail.push(next);
    }
}

/// Renders an error together with its source chain.
struct ErrorChain<'a>(&'a PipelineError);

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = std::error::Error::source(self.0);
        while let Some(cause) = source {
            write!(f, ": {}", cause)?;
            source = cause.source();
        }
        Ok(())
    }
}
