//! Availability gate: block the run until the weather API answers.
//!
//! The gate performs no writes, so timing out leaves nothing behind.

use std::time::Duration;

use tokio::time::Instant;

use crate::{SourceError, WeatherClient};

/// Probes `client` every `poke_interval` until it reports ready or
/// `timeout` elapses.
///
/// A probe that errors or does not answer before the deadline counts as
/// "not ready yet".
///
/// # Errors
///
/// Returns [`SourceError::AvailabilityTimeout`] if no probe succeeded
/// within `timeout`.
pub async fn wait_until_available(
    client: &dyn WeatherClient,
    poke_interval: Duration,
    timeout: Duration,
) -> Result<(), SourceError> {
    let deadline = Instant::now() + timeout;
    let mut probes = 0u32;

    loop {
        probes += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());

        match tokio::time::timeout(remaining, client.probe()).await {
            Ok(Ok(true)) => {
                log::info!("Weather API available (probe {probes})");
                return Ok(());
            }
            Ok(Ok(false)) => log::info!("Weather API not ready (probe {probes})"),
            Ok(Err(e)) => log::info!("Weather API probe {probes} failed: {e}"),
            Err(_) => log::info!("Weather API probe {probes} did not answer in time"),
        }

        let now = Instant::now();
        if now >= deadline {
            log::error!("Weather API still unavailable after {timeout:?} ({probes} probes)");
            return Err(SourceError::AvailabilityTimeout { timeout, probes });
        }

        tokio::time::sleep(poke_interval.min(deadline - now)).await;
    }
}
