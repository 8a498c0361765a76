#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Weather API access for the ingestion pipeline.
//!
//! - [`client`]: the [`WeatherClient`] trait and its Open-Meteo
//!   implementation.
//! - [`availability`]: polls the API until it answers or a timeout
//!   elapses.
//! - [`retry`]: a generic exponential-backoff combinator.
//! - [`fetch`]: fans a run's requests out under a shared concurrency cap.

pub mod availability;
pub mod client;
pub mod fetch;
pub mod progress;
pub mod retry;

use std::time::Duration;

pub use client::{OpenMeteoClient, WeatherClient};
pub use fetch::FetchPool;
pub use retry::RetryPolicy;

/// Errors that can occur while talking to the weather API.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a status other than 200.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// The response body is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The fetch pool was closed while a request waited for a slot.
    #[error("Fetch pool is closed")]
    PoolClosed,

    /// The API never reported healthy within the polling window.
    #[error("Weather API not available after {probes} probe(s) within {timeout:?}")]
    AvailabilityTimeout {
        /// Length of the polling window.
        timeout: Duration,
        /// Number of probes sent.
        probes: u32,
    },

    /// A city's fetch failed for good.
    #[error("Fetch failed for {city} after {attempts} attempt(s): {source}")]
    Fetch {
        /// City whose fetch failed.
        city: String,
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the last attempt.
        source: Box<Self>,
    },
}

impl SourceError {
    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Connection failures, timeouts, unreadable bodies, HTTP 429 and
    /// HTTP 5xx are transient. Other 4xx responses are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
            }
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Json(_) => true,
            Self::PoolClosed | Self::AvailabilityTimeout { .. } | Self::Fetch { .. } => false,
        }
    }
}
