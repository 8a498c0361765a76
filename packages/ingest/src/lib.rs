#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Daily Open-Meteo ingestion.
//!
//! A [`Pipeline`] takes one logical date from an availability check to
//! either a published completion signal or a quarantined partition. The
//! stages are split into small modules so each can be tested alone:
//!
//! - [`planner`]: roster to fetch requests
//! - [`quality`]: post-load row count check
//! - [`branch`]: publish-or-quarantine decision
//! - [`publish`]: completion signal sinks
//! - [`pipeline`]: the run itself, plus date-range backfills

pub mod branch;
pub mod pipeline;
pub mod planner;
pub mod publish;
pub mod quality;

use weather_ingest_config::ConfigError;
use weather_ingest_database::DbError;
use weather_ingest_models::{LogicalDate, RunState};
use weather_ingest_raw_store::{QuarantineOutcome, StorageError};
use weather_ingest_source::SourceError;

pub use pipeline::Pipeline;
pub use publish::{BroadcastSink, FanoutSink, JsonlSink, SignalError, SignalSink};

/// Why a run did not publish.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The weather API never answered the readiness probe. Nothing was
    /// written.
    #[error("Weather API unavailable: {0}")]
    AvailabilityTimeout(#[source] SourceError),

    /// The roster or raw base path could not be resolved. Nothing was
    /// written.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A city's fetch failed for good. Nothing was written.
    #[error("Fetch stage failed: {0}")]
    Fetch(#[source] SourceError),

    /// A raw file could not be written. Any partition for the date was
    /// moved to quarantine first.
    #[error("Raw write failed: {0}")]
    Write(#[source] StorageError),

    /// The warehouse rejected the batch; nothing was committed.
    #[error("Warehouse upsert failed: {0}")]
    Upsert(#[source] DbError),

    /// The post-load row count could not be read.
    #[error("Quality check query failed: {0}")]
    QualityCheck(#[source] DbError),

    /// The load committed no rows for the date. The partition was moved
    /// before this error was returned.
    #[error("Quality check failed for {logical_date}: {row_count} rows loaded ({})", describe(.quarantine))]
    QualityFailure {
        logical_date: LogicalDate,
        row_count: u64,
        /// What happened to the raw partition.
        quarantine: QuarantineOutcome,
    },

    /// The quality check failed and the partition could not be moved.
    #[error("Quarantine failed: {0}")]
    Quarantine(#[source] StorageError),

    /// Data loaded but the completion signal could not be emitted.
    #[error("Publish failed: {0}")]
    Publish(#[from] SignalError),

    /// A blocking warehouse task panicked or was cancelled.
    #[error("Warehouse task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn describe(outcome: &QuarantineOutcome) -> String {
    match outcome {
        QuarantineOutcome::Moved { to, .. } => format!("partition quarantined to {}", to.display()),
        QuarantineOutcome::NothingToMove { expected } => {
            format!("no partition at {}", expected.display())
        }
    }
}

/// Result of a run that published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub logical_date: LogicalDate,
    /// Rows the upsert reported as inserted or updated.
    pub rows_loaded: u64,
    /// `"Loaded {n} city payloads"`.
    pub summary: String,
    pub state: RunState,
}

/// Per-date outcomes of a backfill, oldest first.
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub outcomes: Vec<(LogicalDate, Result<RunReport, RunError>)>,
}

impl BackfillReport {
    /// Number of dates that published.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_ok()).count()
    }

    /// Dates that failed, oldest first.
    #[must_use]
    pub fn failed(&self) -> Vec<LogicalDate> {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(date, _)| *date)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn quality_failure_message_names_the_quarantine_location() {
        let err = RunError::QualityFailure {
            logical_date: "2025-01-01".parse().unwrap(),
            row_count: 0,
            quarantine: QuarantineOutcome::Moved {
                from: PathBuf::from("/raw/load_date=2025-01-01"),
                to: PathBuf::from("/raw/quarantine/load_date=2025-01-01"),
            },
        };

        assert_eq!(
            err.to_string(),
            "Quality check failed for 2025-01-01: 0 rows loaded (partition quarantined to /raw/quarantine/load_date=2025-01-01)"
        );
    }

    #[test]
    fn backfill_report_splits_outcomes() {
        let ok = |d: &str| -> (LogicalDate, Result<RunReport, RunError>) {
            let logical_date: LogicalDate = d.parse().unwrap();
            (
                logical_date,
                Ok(RunReport {
                    logical_date,
                    rows_loaded: 1,
                    summary: "Loaded 1 city payloads".to_string(),
                    state: RunState::Published,
                }),
            )
        };
        let failed_date: LogicalDate = "2025-01-02".parse().unwrap();

        let report = BackfillReport {
            outcomes: vec![
                ok("2025-01-01"),
                (
                    failed_date,
                    Err(RunError::Fetch(SourceError::PoolClosed)),
                ),
                ok("2025-01-03"),
            ],
        };

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), vec![failed_date]);
    }
}
