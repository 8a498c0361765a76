//! Bounded fan-out of a run's fetch requests.
//!
//! Every request of the run is started at once, but each HTTP attempt
//! must first take a slot from a [`FetchPool`]. The pool is sized
//! independently of the roster and can be cloned into several runs, so
//! it caps the calls outstanding against the API across every run that
//! shares it. A slot is held for one attempt only and released during
//! backoff sleeps.
//!
//! Results come back in arrival order. The first city that fails for
//! good fails the whole stage; the remaining fetches are dropped and no
//! partial result set is returned.

use std::sync::Arc;

use futures::stream::{self, StreamExt as _, TryStreamExt as _};
use tokio::sync::{Semaphore, SemaphorePermit};
use weather_ingest_models::{FetchRequest, FetchResult};

use crate::progress::ProgressCallback;
use crate::{RetryPolicy, SourceError, WeatherClient};

/// Fixed-size pool of API call slots.
///
/// Clones share the same slots.
#[derive(Debug, Clone)]
pub struct FetchPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl FetchPool {
    /// Creates a pool with `size` slots (at least one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Total number of slots.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, SourceError> {
        self.slots.acquire().await.map_err(|_| SourceError::PoolClosed)
    }
}

/// Fetches every request under the pool's concurrency cap, applying
/// `retry` to each call.
///
/// # Errors
///
/// Returns [`SourceError::Fetch`] for the first city whose fetch failed
/// permanently or exhausted its retries.
pub async fn fetch_all(
    client: &dyn WeatherClient,
    pool: &FetchPool,
    retry: &RetryPolicy,
    requests: Vec<FetchRequest>,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Vec<FetchResult>, SourceError> {
    let total = requests.len();
    progress.set_total(total as u64);

    log::info!(
        "Fetching {total} cities (pool size {}, up to {} retries)",
        pool.size(),
        retry.max_retries
    );

    let results: Vec<FetchResult> = stream::iter(
        requests
            .into_iter()
            .map(|request| fetch_one(client, pool, retry, request)),
    )
    .buffer_unordered(total.max(1))
    .inspect_ok(|result| {
        progress.inc(1);
        progress.set_message(result.request.city.name.clone());
    })
    .try_collect()
    .await?;

    progress.finish(format!("Fetched {} cities", results.len()));
    Ok(results)
}

async fn fetch_one(
    client: &dyn WeatherClient,
    pool: &FetchPool,
    retry: &RetryPolicy,
    request: FetchRequest,
) -> Result<FetchResult, SourceError> {
    let label = format!("{} {}", request.city.name, request.logical_date);
    let city = &request.city;

    let payload = retry
        .run_if(
            &label,
            move || async move {
                let _slot = pool.acquire().await?;
                client.current_weather(city).await
            },
            SourceError::is_transient,
        )
        .await
        .map_err(|e| SourceError::Fetch {
            city: city.name.clone(),
            attempts: e.attempts,
            source: Box::new(e.source),
        })?;

    log::debug!("{label}: fetched");
    Ok(FetchResult { request, payload })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use weather_ingest_models::{CityConfig, LogicalDate};

    use super::*;
    use crate::progress::null_progress;

    /// Records how many calls overlap and fails configured cities.
    #[derive(Default)]
    struct CountingClient {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<BTreeMap<String, u32>>,
        failing: BTreeMap<String, u16>,
        fail_first: BTreeMap<String, u32>,
    }

    impl CountingClient {
        fn calls_for(&self, city: &str) -> u32 {
            self.calls.lock().unwrap().get(city).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl WeatherClient for CountingClient {
        async fn probe(&self) -> Result<bool, SourceError> {
            Ok(true)
        }

        async fn current_weather(
            &self,
            city: &CityConfig,
        ) -> Result<serde_json::Value, SourceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let call = {
                let mut calls = self.calls.lock().unwrap();
                let entry = calls.entry(city.name.clone()).or_insert(0);
                *entry += 1;
                *entry
            };

            tokio::time::sleep(Duration::from_millis(15)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(status) = self.failing.get(&city.name) {
                return Err(SourceError::Status {
                    url: "http://test/v1/forecast".to_string(),
                    status: *status,
                });
            }
            if self.fail_first.get(&city.name).is_some_and(|n| call <= *n) {
                return Err(SourceError::Status {
                    url: "http://test/v1/forecast".to_string(),
                    status: 503,
                });
            }

            Ok(serde_json::json!({ "city": city.name, "lat": city.lat }))
        }
    }

    fn requests(n: usize) -> Vec<FetchRequest> {
        let logical_date: LogicalDate = "2025-01-01".parse().unwrap();
        (0..n)
            .map(|i| FetchRequest {
                city: CityConfig::new(format!("City{i}"), 1.0, 1.0),
                logical_date,
            })
            .collect()
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn never_exceeds_pool_size() {
        let client = CountingClient::default();
        let pool = FetchPool::new(2);

        let results = fetch_all(&client, &pool, &fast_retry(0), requests(7), null_progress())
            .await
            .unwrap();

        assert_eq!(results.len(), 7);
        assert!(client.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn pool_is_shared_across_runs() {
        let client = CountingClient::default();
        let pool = FetchPool::new(3);
        let shared = pool.clone();
        let retry = fast_retry(0);

        let (a, b) = tokio::join!(
            fetch_all(&client, &pool, &retry, requests(5), null_progress()),
            fetch_all(&client, &shared, &retry, requests(5), null_progress()),
        );

        assert_eq!(a.unwrap().len(), 5);
        assert_eq!(b.unwrap().len(), 5);
        assert!(client.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn keeps_every_request_with_its_payload() {
        let client = CountingClient::default();
        let results = fetch_all(
            &client,
            &FetchPool::new(4),
            &fast_retry(0),
            requests(3),
            null_progress(),
        )
        .await
        .unwrap();

        let mut names: Vec<&str> = results
            .iter()
            .map(|r| r.request.city.name.as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["City0", "City1", "City2"]);
        for result in &results {
            assert_eq!(result.payload["city"], result.request.city.name.as_str());
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let client = CountingClient {
            fail_first: BTreeMap::from([("City1".to_string(), 2)]),
            ..CountingClient::default()
        };

        let results = fetch_all(
            &client,
            &FetchPool::new(2),
            &fast_retry(3),
            requests(2),
            null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(client.calls_for("City1"), 3);
        assert_eq!(client.calls_for("City0"), 1);
    }

    #[tokio::test]
    async fn exhausted_city_fails_the_stage() {
        let client = CountingClient {
            failing: BTreeMap::from([("City1".to_string(), 500)]),
            ..CountingClient::default()
        };

        let err = fetch_all(
            &client,
            &FetchPool::new(4),
            &fast_retry(2),
            requests(3),
            null_progress(),
        )
        .await
        .unwrap_err();

        match err {
            SourceError::Fetch { city, attempts, .. } => {
                assert_eq!(city, "City1");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let client = CountingClient {
            failing: BTreeMap::from([("City0".to_string(), 404)]),
            ..CountingClient::default()
        };

        let err = fetch_all(
            &client,
            &FetchPool::new(1),
            &fast_retry(5),
            requests(1),
            null_progress(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SourceError::Fetch { attempts: 1, .. }));
        assert_eq!(client.calls_for("City0"), 1);
    }

    #[tokio::test]
    async fn empty_request_list_fetches_nothing() {
        let client = CountingClient::default();
        let results = fetch_all(
            &client,
            &FetchPool::new(2),
            &fast_retry(0),
            Vec::new(),
            null_progress(),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn zero_sized_pool_gets_one_slot() {
        assert_eq!(FetchPool::new(0).size(), 1);
    }
}
