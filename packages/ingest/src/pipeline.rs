//! Runs one logical date through every stage.
//!
//! Stages execute in a fixed order and hand explicit values to each
//! other: availability gate, config resolution, planning, bounded fetch,
//! raw writes, warehouse upsert, quality check, then either publish or
//! quarantine. Nothing is written before the fetch stage has produced a
//! result for every city.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use weather_ingest_config::{ConfigStore, PipelineSettings, resolve};
use weather_ingest_database::Warehouse;
use weather_ingest_models::{LogicalDate, RawRecord};
use weather_ingest_raw_store::{QuarantineOutcome, quarantine_partition, write_raw};
use weather_ingest_source::availability::wait_until_available;
use weather_ingest_source::fetch::fetch_all;
use weather_ingest_source::progress::{ProgressCallback, null_progress};
use weather_ingest_source::{FetchPool, RetryPolicy, WeatherClient};

use crate::branch::{Branch, decide};
use crate::planner::plan_requests;
use crate::publish::{SignalSink, publish};
use crate::quality::check_quality;
use crate::{BackfillReport, RunError, RunReport};

/// Everything a run needs, wired once and reused across dates.
pub struct Pipeline {
    client: Arc<dyn WeatherClient>,
    store: Arc<dyn ConfigStore>,
    warehouse: Arc<dyn Warehouse>,
    sink: Arc<dyn SignalSink>,
    pool: FetchPool,
    retry: RetryPolicy,
    poke_interval: Duration,
    availability_timeout: Duration,
    progress: Arc<dyn ProgressCallback>,
}

impl Pipeline {
    /// Creates a pipeline with the default settings.
    #[must_use]
    pub fn new(
        client: Arc<dyn WeatherClient>,
        store: Arc<dyn ConfigStore>,
        warehouse: Arc<dyn Warehouse>,
        sink: Arc<dyn SignalSink>,
    ) -> Self {
        Self {
            client,
            store,
            warehouse,
            sink,
            pool: FetchPool::new(1),
            retry: RetryPolicy::none(),
            poke_interval: Duration::ZERO,
            availability_timeout: Duration::ZERO,
            progress: null_progress(),
        }
        .with_settings(&PipelineSettings::default())
    }

    /// Applies the pool size, retry policy and availability timing from
    /// `settings`.
    #[must_use]
    pub fn with_settings(self, settings: &PipelineSettings) -> Self {
        self.with_pool(FetchPool::new(settings.fetch.pool_size))
            .with_retry(RetryPolicy::new(
                settings.retry.max_retries,
                settings.retry.initial_delay(),
                settings.retry.max_delay(),
            ))
            .with_availability(
                settings.availability.poke_interval(),
                settings.availability.timeout(),
            )
    }

    /// Uses `pool` for the fetch stage. Pipelines given clones of the
    /// same pool share its cap.
    #[must_use]
    pub fn with_pool(mut self, pool: FetchPool) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_availability(mut self, poke_interval: Duration, timeout: Duration) -> Self {
        self.poke_interval = poke_interval;
        self.availability_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &FetchPool {
        &self.pool
    }

    /// Ingests `logical_date`.
    ///
    /// On success the date's rows are committed, the completion signal is
    /// out and the report carries `RunState::Published`. A failed run
    /// never emits a signal. Failures from the raw write stage up to the
    /// quality gate leave the date's partition, if any, under
    /// `quarantine/`. A signal that cannot be emitted after a passing
    /// gate is reported as [`RunError::Publish`] and leaves the loaded
    /// partition in place.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] naming the stage that failed.
    pub async fn run(&self, logical_date: LogicalDate) -> Result<RunReport, RunError> {
        let start = Instant::now();
        log::info!("Starting ingestion for {logical_date}");

        wait_until_available(
            self.client.as_ref(),
            self.poke_interval,
            self.availability_timeout,
        )
        .await
        .map_err(RunError::AvailabilityTimeout)?;

        let config = resolve(self.store.as_ref())?;
        log::info!(
            "{logical_date}: {} cities, raw base {}",
            config.cities.len(),
            config.raw_base.display()
        );

        let requests = plan_requests(&config.cities, logical_date);
        let results = fetch_all(
            self.client.as_ref(),
            &self.pool,
            &self.retry,
            requests,
            self.progress.clone(),
        )
        .await
        .map_err(RunError::Fetch)?;

        let mut records: Vec<RawRecord> = Vec::with_capacity(results.len());
        for result in results {
            match write_raw(&config.raw_base, result).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    quarantine_after_failure(&config.raw_base, logical_date).await;
                    return Err(RunError::Write(e));
                }
            }
        }
        log::info!("{logical_date}: wrote {} raw files", records.len());

        let warehouse = self.warehouse.clone();
        let upserted = tokio::task::spawn_blocking(move || warehouse.upsert_batch(&records)).await?;
        let rows_loaded = match upserted {
            Ok(rows) => rows,
            Err(e) => {
                quarantine_after_failure(&config.raw_base, logical_date).await;
                return Err(RunError::Upsert(e));
            }
        };

        let warehouse = self.warehouse.clone();
        let checked =
            tokio::task::spawn_blocking(move || check_quality(warehouse.as_ref(), logical_date))
                .await?;
        let verdict = match checked {
            Ok(verdict) => verdict,
            Err(e) => {
                quarantine_after_failure(&config.raw_base, logical_date).await;
                return Err(RunError::QualityCheck(e));
            }
        };

        let branch = decide(&verdict);
        let state = branch.target_state();

        match branch {
            Branch::Publish => {
                let summary = publish(self.sink.as_ref(), logical_date, rows_loaded).await?;
                log::info!(
                    "{logical_date}: {summary} in {:.1}s",
                    start.elapsed().as_secs_f64()
                );
                Ok(RunReport {
                    logical_date,
                    rows_loaded,
                    summary,
                    state,
                })
            }
            Branch::Quarantine => {
                let quarantine = quarantine_partition(&config.raw_base, logical_date)
                    .await
                    .map_err(RunError::Quarantine)?;
                log::error!("{logical_date}: run ended {state} after a failed quality check");
                Err(RunError::QualityFailure {
                    logical_date,
                    row_count: verdict.row_count,
                    quarantine,
                })
            }
        }
    }

    /// Runs every date from `from` through `to`, one at a time, oldest
    /// first. A failed date is recorded and the next one still runs.
    pub async fn backfill(&self, from: LogicalDate, to: LogicalDate) -> BackfillReport {
        self.backfill_with_progress(from, to, null_progress().as_ref())
            .await
    }

    /// [`Self::backfill`], advancing `dates` by one per finished date.
    pub async fn backfill_with_progress(
        &self,
        from: LogicalDate,
        to: LogicalDate,
        dates: &dyn ProgressCallback,
    ) -> BackfillReport {
        let mut report = BackfillReport::default();
        if from > to {
            log::warn!("Backfill range {from}..={to} is empty");
            return report;
        }

        let mut current = Some(from);
        while let Some(date) = current.filter(|d| *d <= to) {
            dates.set_message(date.to_string());
            let outcome = self.run(date).await;
            if let Err(e) = &outcome {
                log::error!("{date}: {e}");
            }
            report.outcomes.push((date, outcome));
            dates.inc(1);
            current = date.next();
        }

        dates.finish(format!(
            "{} of {} dates loaded",
            report.succeeded(),
            report.outcomes.len()
        ));
        report
    }
}

/// Moves the date's partition aside after a failure in or after the
/// write stage.
/// The caller's error is what the run reports, so a failed move is only
/// logged.
async fn quarantine_after_failure(raw_base: &Path, logical_date: LogicalDate) {
    match quarantine_partition(raw_base, logical_date).await {
        Ok(QuarantineOutcome::Moved { to, .. }) => {
            log::error!(
                "{logical_date}: quarantined partial partition to {}",
                to.display()
            );
        }
        Ok(QuarantineOutcome::NothingToMove { .. }) => {}
        Err(e) => log::error!("{logical_date}: {e}"),
    }
}
